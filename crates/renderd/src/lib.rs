//! Unix-socket template render daemon.
//!
//! `renderd` binds a Unix domain socket, accepts a single client and answers
//! each framed JSON [`Command`](renderd_types::Command) with a JSON
//! [`RenderResult`](renderd_types::RenderResult). A command carries template
//! text, an optional context script whose map result becomes the template
//! context, and optional resource search paths for `#parse`, `#include` and
//! the global macro library.
//!
//! The daemon lifecycle is:
//!
//! 1. **Bootstrap**: load configuration, install structured telemetry and
//!    prepare the socket directory ([`bootstrap_with`]).
//! 2. **Serve**: bind the socket, replacing any stale file, accept one client
//!    and cycle over its messages ([`Server`]).
//! 3. **Shutdown**: a termination signal raises the shutdown flag; the loop
//!    exits after its current cycle and the socket file is removed.
//!
//! Every failure inside a cycle is logged. Requests that do not decode get
//! no response; all other failures reach the client as
//! `{"success":false,"message":...}`.

mod bootstrap;
mod context;
pub mod dispatch;
mod health;
mod process;
mod render;
mod server;
mod telemetry;
pub mod transport;

pub use bootstrap::{
    BootstrapError, ConfigLoader, Daemon, StaticConfigLoader, SystemConfigLoader, bootstrap_with,
};
pub use context::{
    BuildError, ContextBuilder, RhaiScriptEvaluator, ScriptError, ScriptEvaluator, ValueKind,
};
pub use health::{HealthReporter, StructuredHealthReporter};
pub use process::{
    LaunchError, ShutdownError, ShutdownSignal, SystemShutdownSignal, run_daemon, run_daemon_with,
};
pub use render::{engine_options, render};
pub use server::{Server, ServerHandle, ServerOptions};
pub use telemetry::{TelemetryError, TelemetryHandle};

#[cfg(test)]
mod tests;
