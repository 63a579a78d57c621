//! Command decoding and validation.

use std::str;

use renderd_types::Command;

use super::errors::{DispatchError, ValidationError};

/// Decodes one framed message into a [`Command`].
///
/// Unknown fields are ignored and `null` fields read as absent. Surrounding
/// whitespace is tolerated.
///
/// # Errors
///
/// Returns [`DispatchError::MalformedRequest`] when the message is empty, not
/// UTF-8, or not a JSON object.
pub fn decode(message: &[u8]) -> Result<Command, DispatchError> {
    let text = str::from_utf8(message)
        .map_err(|error| DispatchError::malformed(format!("request is not UTF-8: {error}")))?;
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(DispatchError::malformed("empty request"));
    }
    serde_json::from_str(trimmed).map_err(DispatchError::from_json_error)
}

/// A command that carries everything needed to render.
#[derive(Debug, Clone, Copy)]
pub struct RenderRequest<'a> {
    command: &'a Command,
    template: &'a str,
}

impl<'a> RenderRequest<'a> {
    /// Checks that `command` names a template.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::MissingTemplate`] when `template` is absent,
    /// regardless of the other fields.
    pub fn validate(command: &'a Command) -> Result<Self, ValidationError> {
        let template = command
            .template
            .as_deref()
            .ok_or(ValidationError::MissingTemplate)?;
        Ok(Self { command, template })
    }

    /// Template source text.
    #[must_use]
    pub const fn template(&self) -> &'a str {
        self.template
    }

    /// Template name used in diagnostics.
    #[must_use]
    pub fn name(&self) -> &'a str {
        self.command.template_name()
    }

    /// The underlying command.
    #[must_use]
    pub const fn command(&self) -> &'a Command {
        self.command
    }
}
