//! Error types for socket transport operations.

use std::io;

use camino::Utf8PathBuf;
use thiserror::Error;

/// Errors surfaced while binding the socket or accepting the client.
#[derive(Debug, Error)]
pub enum ListenerError {
    /// A file left at the socket path could not be removed.
    #[error("failed to remove stale socket file {path}: {source}")]
    StaleCleanup {
        /// Socket path.
        path: Utf8PathBuf,
        /// Underlying filesystem error.
        #[source]
        source: io::Error,
    },
    /// Binding the listener failed.
    #[error("failed to bind unix listener at {path}: {source}")]
    Bind {
        /// Socket path.
        path: Utf8PathBuf,
        /// Underlying socket error.
        #[source]
        source: io::Error,
    },
    /// Switching the listener to non-blocking accepts failed.
    #[error("failed to enable non-blocking listener: {source}")]
    NonBlocking {
        /// Underlying socket error.
        #[source]
        source: io::Error,
    },
    /// Accepting the client connection failed.
    #[error("failed to accept client connection: {source}")]
    Accept {
        /// Underlying socket error.
        #[source]
        source: io::Error,
    },
    /// Configuring the accepted connection failed.
    #[error("failed to configure client connection: {source}")]
    Configure {
        /// Underlying socket error.
        #[source]
        source: io::Error,
    },
    /// The server thread panicked.
    #[error("server thread panicked")]
    ThreadPanic,
}

/// Errors raised while reading or writing one framed message.
#[derive(Debug, Error)]
pub enum FramingError {
    /// The accumulated message exceeded the configured limit.
    #[error("message of {size} bytes exceeds the {limit} byte limit")]
    TooLarge {
        /// Bytes accumulated or announced.
        size: usize,
        /// Configured limit.
        limit: usize,
    },
    /// The peer closed the stream in the middle of a length-prefixed message.
    #[error("stream closed after {received} of {expected} message bytes")]
    Truncated {
        /// Bytes announced by the header (header included).
        expected: usize,
        /// Bytes received before closure.
        received: usize,
    },
    /// Reading or writing the stream failed.
    #[error("socket IO failed: {source}")]
    Io {
        /// Underlying socket error.
        #[source]
        source: io::Error,
    },
}

impl FramingError {
    pub(crate) const fn too_large(size: usize, limit: usize) -> Self {
        Self::TooLarge { size, limit }
    }
}

impl From<io::Error> for FramingError {
    fn from(source: io::Error) -> Self {
        Self::Io { source }
    }
}
