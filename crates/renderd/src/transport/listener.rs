//! Unix socket listener that accepts a single client.

use std::fs;
use std::io;
use std::os::unix::net::{UnixListener, UnixStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use tracing::{debug, info, warn};

use super::{ListenerError, TRANSPORT_TARGET};

const ACCEPT_BACKOFF: Duration = Duration::from_millis(25);

/// Listener bound to the daemon socket path.
///
/// The socket file is removed when the listener is dropped.
#[derive(Debug)]
pub(crate) struct SocketListener {
    path: Utf8PathBuf,
    listener: UnixListener,
}

impl SocketListener {
    /// Removes any stale file at `path` and binds a new listener there.
    pub(crate) fn bind(path: &Utf8Path) -> Result<Self, ListenerError> {
        remove_stale_socket(path)?;
        let listener = UnixListener::bind(path).map_err(|source| ListenerError::Bind {
            path: path.to_path_buf(),
            source,
        })?;
        let bound = Self {
            path: path.to_path_buf(),
            listener,
        };
        bound
            .listener
            .set_nonblocking(true)
            .map_err(|source| ListenerError::NonBlocking { source })?;
        info!(target: TRANSPORT_TARGET, path = %bound.path, "socket listener bound");
        Ok(bound)
    }

    /// Path the listener is bound to.
    pub(crate) fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// Waits for one client, polling `shutdown` between attempts.
    ///
    /// Returns `Ok(None)` when shutdown was requested before a client
    /// connected. The returned stream is blocking with `read_timeout` applied.
    pub(crate) fn accept_one(
        &self,
        shutdown: &AtomicBool,
        read_timeout: Duration,
    ) -> Result<Option<UnixStream>, ListenerError> {
        while !shutdown.load(Ordering::SeqCst) {
            match self.listener.accept() {
                Ok((stream, _)) => {
                    configure_stream(&stream, read_timeout)
                        .map_err(|source| ListenerError::Configure { source })?;
                    return Ok(Some(stream));
                }
                Err(error) if error.kind() == io::ErrorKind::WouldBlock => {
                    thread::sleep(ACCEPT_BACKOFF);
                }
                Err(error) if error.kind() == io::ErrorKind::Interrupted => {}
                Err(source) => return Err(ListenerError::Accept { source }),
            }
        }
        Ok(None)
    }
}

impl Drop for SocketListener {
    fn drop(&mut self) {
        if let Err(error) = fs::remove_file(self.path.as_std_path())
            && error.kind() != io::ErrorKind::NotFound
        {
            warn!(
                target: TRANSPORT_TARGET,
                error = %error,
                path = %self.path,
                "failed to remove unix socket file"
            );
        }
    }
}

fn configure_stream(stream: &UnixStream, read_timeout: Duration) -> io::Result<()> {
    stream.set_nonblocking(false)?;
    // A zero timeout would mean "block forever".
    stream.set_read_timeout(Some(read_timeout.max(Duration::from_millis(1))))
}

fn remove_stale_socket(path: &Utf8Path) -> Result<(), ListenerError> {
    match fs::remove_file(path.as_std_path()) {
        Ok(()) => {
            debug!(target: TRANSPORT_TARGET, path = %path, "removed stale socket file");
            Ok(())
        }
        Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(ListenerError::StaleCleanup {
            path: path.to_path_buf(),
            source,
        }),
    }
}
