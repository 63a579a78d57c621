//! Request handler turning decoded commands into render results.

use std::sync::Arc;

use renderd_types::{Command, RenderResult};
use tracing::{debug, warn};

use crate::context::{ContextBuilder, ScriptEvaluator};
use crate::render;

use super::DISPATCH_TARGET;
use super::errors::DispatchError;
use super::request::{RenderRequest, decode};

/// Processes one request at a time: validate, build context, render.
///
/// The handler keeps no state between requests; the templating engine is
/// configured afresh for every command.
#[derive(Debug, Clone)]
pub struct RequestHandler {
    contexts: ContextBuilder,
}

impl RequestHandler {
    /// Creates a handler evaluating context scripts with `evaluator`.
    #[must_use]
    pub const fn new(evaluator: Arc<dyn ScriptEvaluator>) -> Self {
        Self {
            contexts: ContextBuilder::new(evaluator),
        }
    }

    /// Decodes `message` and processes the command it carries.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::MalformedRequest`] when the message does not
    /// decode; no response should be sent in that case.
    pub fn handle_message(&self, message: &[u8]) -> Result<RenderResult, DispatchError> {
        let command = decode(message)?;
        Ok(self.process(&command))
    }

    /// Renders `command`, reporting every failure as [`RenderResult::Failure`].
    #[must_use]
    pub fn process(&self, command: &Command) -> RenderResult {
        let request = match RenderRequest::validate(command) {
            Ok(request) => request,
            Err(error) => {
                warn!(target: DISPATCH_TARGET, %error, "invalid command");
                return RenderResult::failure(error.to_string());
            }
        };

        debug!(
            target: DISPATCH_TARGET,
            name = request.name(),
            script = ?command.context_script_path,
            search_paths = ?command.resource_search_paths,
            "rendering template"
        );

        let context = match self.contexts.build(command) {
            Ok(context) => context,
            Err(error) => {
                warn!(target: DISPATCH_TARGET, %error, "context build failed");
                return RenderResult::failure(error.to_string());
            }
        };

        match render::render(&request, &context) {
            Ok(text) => {
                debug!(
                    target: DISPATCH_TARGET,
                    name = request.name(),
                    bytes = text.len(),
                    "template rendered"
                );
                RenderResult::success(text)
            }
            Err(error) => {
                warn!(target: DISPATCH_TARGET, %error, "template render failed");
                RenderResult::failure(error.diagnostic())
            }
        }
    }
}
