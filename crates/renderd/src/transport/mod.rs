//! Unix socket transport for the render daemon.
//!
//! The listener binds the configured socket path and hands out exactly one
//! client connection. Framing recovers request messages from the byte stream
//! and writes responses back in the same framing mode.

mod errors;
mod framing;
mod listener;

pub use self::errors::{FramingError, ListenerError};
pub use self::framing::{FramedReader, READ_CHUNK_SIZE, write_message};
pub(crate) use self::listener::SocketListener;

const TRANSPORT_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::transport");
