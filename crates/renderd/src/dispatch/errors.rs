//! Error types for request decoding and response delivery.

use thiserror::Error;

use crate::transport::FramingError;

/// Errors that end a request/response cycle without a response.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The message was empty, not UTF-8, or not a JSON command.
    #[error("malformed request: {message}")]
    MalformedRequest {
        /// Human readable description of the defect.
        message: String,
        /// Underlying JSON error, when decoding got that far.
        #[source]
        source: Option<serde_json::Error>,
    },
    /// The response could not be serialised.
    #[error("failed to serialize response: {0}")]
    SerializeResponse(#[source] serde_json::Error),
    /// Writing the response to the socket failed.
    #[error("failed to write response: {0}")]
    Transport(#[from] FramingError),
}

impl DispatchError {
    /// Creates a malformed request error from a serde error.
    #[must_use]
    pub fn from_json_error(source: serde_json::Error) -> Self {
        Self::MalformedRequest {
            message: source.to_string(),
            source: Some(source),
        }
    }

    /// Creates a malformed request error with a custom message.
    #[must_use]
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedRequest {
            message: message.into(),
            source: None,
        }
    }
}

/// A decoded command that cannot be rendered.
///
/// Validation failures are answered with a failed [`RenderResult`] carrying
/// the display text verbatim.
///
/// [`RenderResult`]: renderd_types::RenderResult
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// The command has no `template` field.
    #[error("Must provide template")]
    MissingTemplate,
}
