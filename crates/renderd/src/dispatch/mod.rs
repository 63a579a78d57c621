//! Request dispatch for the render daemon.
//!
//! Each framed message carries one JSON [`Command`](renderd_types::Command):
//!
//! ```json
//! {"name":"greeting","template":"Hello $name","contextScriptPath":"/tmp/ctx.rhai"}
//! ```
//!
//! The handler validates it, builds the rendering context, renders the
//! template and answers with one JSON
//! [`RenderResult`](renderd_types::RenderResult):
//!
//! ```json
//! {"success":true,"renderedTemplate":"Hello World"}
//! ```
//!
//! Malformed messages are logged and receive no response; every other
//! failure is reported to the client as `{"success":false,"message":...}`.

mod errors;
mod handler;
mod request;
mod response;

pub use self::errors::{DispatchError, ValidationError};
pub use self::handler::RequestHandler;
pub use self::request::{RenderRequest, decode};
pub use self::response::{ResponseWriter, encode};

pub(crate) const DISPATCH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::dispatch");
