//! Supervises daemon launch sequencing and runtime orchestration.

use std::sync::Arc;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::bootstrap::{ConfigLoader, SystemConfigLoader, bootstrap_with};
use crate::context::{RhaiScriptEvaluator, ScriptEvaluator};
use crate::health::{HealthReporter, StructuredHealthReporter};
use crate::server::ServerHandle;

use super::PROCESS_TARGET;
use super::errors::LaunchError;
use super::shutdown::{ShutdownError, ShutdownSignal, SystemShutdownSignal};

/// How often supervision checks whether the serving thread has ended.
const SUPERVISE_INTERVAL: Duration = Duration::from_millis(50);

/// Runs the daemon in the foreground with the production collaborators.
///
/// # Errors
///
/// See [`run_daemon_with`].
pub fn run_daemon() -> Result<(), LaunchError> {
    run_daemon_with(
        &SystemConfigLoader,
        Arc::new(StructuredHealthReporter::new()),
        Arc::new(SystemShutdownSignal::new()),
        Arc::new(RhaiScriptEvaluator::new()),
    )
}

/// Runs the daemon with injected collaborators.
///
/// Bootstraps, starts the server and supervises it until `shutdown` fires
/// or the serving thread ends on its own. A fired signal stops the server,
/// which removes the socket file.
///
/// # Errors
///
/// Returns [`LaunchError`] when bootstrap fails, the socket cannot be bound,
/// the shutdown signal cannot be awaited or the serving loop ends abnormally.
pub fn run_daemon_with(
    loader: &dyn ConfigLoader,
    reporter: Arc<dyn HealthReporter>,
    shutdown: Arc<dyn ShutdownSignal>,
    evaluator: Arc<dyn ScriptEvaluator>,
) -> Result<(), LaunchError> {
    let daemon = bootstrap_with(loader, reporter)?;
    info!(
        target: PROCESS_TARGET,
        socket = %daemon.config().socket_path(),
        "starting daemon runtime"
    );
    let server = daemon.serve(evaluator)?;
    supervise(server, shutdown, SUPERVISE_INTERVAL)?;
    info!(target: PROCESS_TARGET, "shutdown sequence completed");
    Ok(())
}

/// Waits for `shutdown` on a helper thread while polling `server` every
/// `interval`.
///
/// Returns after stopping the server once the signal fires, or as soon as
/// the serving thread finishes without one.
pub(crate) fn supervise(
    server: ServerHandle,
    shutdown: Arc<dyn ShutdownSignal>,
    interval: Duration,
) -> Result<(), LaunchError> {
    let (sender, signalled) = mpsc::channel();
    thread::Builder::new()
        .name("renderd-signals".to_owned())
        .spawn(move || {
            if sender.send(shutdown.wait()).is_err() {
                debug!(target: PROCESS_TARGET, "shutdown signal arrived after supervision ended");
            }
        })
        .map_err(|source| ShutdownError::Spawn { source })?;

    loop {
        match signalled.recv_timeout(interval) {
            Ok(waited) => {
                server.stop()?;
                return waited.map_err(LaunchError::from);
            }
            Err(RecvTimeoutError::Timeout) if server.is_finished() => {
                warn!(target: PROCESS_TARGET, "server stopped before a shutdown signal");
                return server.join().map_err(LaunchError::from);
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                server.stop()?;
                return Err(ShutdownError::WaiterLost.into());
            }
        }
    }
}
