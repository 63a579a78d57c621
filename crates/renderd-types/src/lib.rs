//! Wire types exchanged between `renderd` and its client.
//!
//! A client sends one JSON [`Command`] per framed message and receives one
//! JSON [`RenderResult`] back:
//!
//! ```json
//! {"name":"greeting","template":"Hello $name","contextScriptPath":"/tmp/ctx.rhai"}
//! {"success":true,"renderedTemplate":"Hello World"}
//! ```

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

/// Template name reported in diagnostics when a command omits `name`.
pub const DEFAULT_TEMPLATE_NAME: &str = "foo";

/// One render request.
///
/// Unknown fields are ignored and `null` is treated as absent, so every
/// field decodes as optional. A missing `template` is reported by the daemon
/// as a failed render rather than a protocol error.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Command {
    /// Logical template name used in diagnostics.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Template source text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
    /// Script evaluated to produce the rendering context.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_script_path: Option<Utf8PathBuf>,
    /// Directories searched for `#parse` and `#include` resources, in order.
    #[serde(
        default,
        rename = "resourceLoaderPath",
        skip_serializing_if = "Option::is_none"
    )]
    pub resource_search_paths: Option<Vec<Utf8PathBuf>>,
}

impl Command {
    /// Builds a command rendering `template` with no context script.
    #[must_use]
    pub fn inline(template: impl Into<String>) -> Self {
        Self {
            template: Some(template.into()),
            ..Self::default()
        }
    }

    /// Sets the logical template name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Sets the context script path.
    #[must_use]
    pub fn with_context_script(mut self, path: impl Into<Utf8PathBuf>) -> Self {
        self.context_script_path = Some(path.into());
        self
    }

    /// Sets the resource search paths.
    #[must_use]
    pub fn with_resource_paths<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<Utf8PathBuf>,
    {
        self.resource_search_paths = Some(paths.into_iter().map(Into::into).collect());
        self
    }

    /// Name used in diagnostics, falling back to [`DEFAULT_TEMPLATE_NAME`].
    #[must_use]
    pub fn template_name(&self) -> &str {
        self.name.as_deref().unwrap_or(DEFAULT_TEMPLATE_NAME)
    }
}

/// Outcome of one render request.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(into = "WireResult", try_from = "WireResult")]
pub enum RenderResult {
    /// The template rendered successfully.
    Success {
        /// Fully rendered text.
        rendered_text: String,
    },
    /// Validation, context building, or rendering failed.
    Failure {
        /// Diagnostic describing the failure.
        message: String,
    },
}

impl RenderResult {
    /// Creates a success result.
    #[must_use]
    pub fn success(rendered_text: impl Into<String>) -> Self {
        Self::Success {
            rendered_text: rendered_text.into(),
        }
    }

    /// Creates a failure result.
    #[must_use]
    pub fn failure(message: impl Into<String>) -> Self {
        Self::Failure {
            message: message.into(),
        }
    }

    /// Returns `true` for [`RenderResult::Success`].
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// Rendered text when the render succeeded.
    #[must_use]
    pub fn rendered_text(&self) -> Option<&str> {
        match self {
            Self::Success { rendered_text } => Some(rendered_text),
            Self::Failure { .. } => None,
        }
    }

    /// Diagnostic when the render failed.
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        match self {
            Self::Success { .. } => None,
            Self::Failure { message } => Some(message),
        }
    }
}

/// Flat JSON shape of [`RenderResult`]: a discriminant plus the populated
/// variant's field.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireResult {
    success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    rendered_template: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

impl From<RenderResult> for WireResult {
    fn from(result: RenderResult) -> Self {
        match result {
            RenderResult::Success { rendered_text } => Self {
                success: true,
                rendered_template: Some(rendered_text),
                message: None,
            },
            RenderResult::Failure { message } => Self {
                success: false,
                rendered_template: None,
                message: Some(message),
            },
        }
    }
}

impl TryFrom<WireResult> for RenderResult {
    type Error = String;

    fn try_from(wire: WireResult) -> Result<Self, Self::Error> {
        if wire.success {
            wire.rendered_template
                .map(|rendered_text| Self::Success { rendered_text })
                .ok_or_else(|| String::from("successful result is missing renderedTemplate"))
        } else {
            Ok(Self::Failure {
                message: wire.message.unwrap_or_default(),
            })
        }
    }
}
