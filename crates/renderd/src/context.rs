//! Rendering context construction from context scripts.
//!
//! A command may name a script whose result becomes the template context.
//! Scripts run through the [`ScriptEvaluator`] trait; the daemon uses
//! [`RhaiScriptEvaluator`]. The result must be a map; each entry becomes one
//! binding under the same key.

use std::fmt;
use std::fs;
use std::io;
use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use renderd_types::Command;
use rhai::Dynamic;
use serde_json::Value;
use strum::Display;
use thiserror::Error;
use tracing::debug;
use vtl::Context;

const CONTEXT_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::context");

/// Evaluates a context script into a dynamic value.
pub trait ScriptEvaluator: Send + Sync {
    /// Runs the script at `path` and returns its final value.
    ///
    /// # Errors
    ///
    /// Returns a [`ScriptError`] when the script cannot be read, fails to
    /// evaluate, or yields a value with no JSON representation.
    fn evaluate(&self, path: &Utf8Path) -> Result<Value, ScriptError>;
}

/// Errors reported by [`ScriptEvaluator`] implementations.
#[derive(Debug, Error)]
pub enum ScriptError {
    /// The script file could not be read.
    #[error("failed to read context script {path}: {source}")]
    Read {
        /// Script path.
        path: Utf8PathBuf,
        /// Underlying filesystem error.
        #[source]
        source: io::Error,
    },
    /// The script failed to parse or run.
    #[error("context script {path} failed: {message}")]
    Evaluation {
        /// Script path.
        path: Utf8PathBuf,
        /// Evaluator diagnostic.
        message: String,
    },
    /// The script produced a value that cannot become a context entry.
    #[error("context script {path} returned an unsupported value: {message}")]
    Conversion {
        /// Script path.
        path: Utf8PathBuf,
        /// Conversion diagnostic.
        message: String,
    },
}

impl ScriptError {
    /// Creates an evaluation error for `path`.
    #[must_use]
    pub fn evaluation(path: &Utf8Path, message: impl Into<String>) -> Self {
        Self::Evaluation {
            path: path.to_path_buf(),
            message: message.into(),
        }
    }
}

/// Runtime kind of a script result, as named in diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum ValueKind {
    /// Key/value mapping.
    Map,
    /// Ordered sequence.
    List,
    /// Text.
    String,
    /// Whole number.
    Integer,
    /// Floating-point number.
    Decimal,
    /// `true` or `false`.
    Boolean,
    /// Absence of a value.
    Null,
}

impl ValueKind {
    /// Classifies `value`.
    #[must_use]
    pub fn of(value: &Value) -> Self {
        match value {
            Value::Object(_) => Self::Map,
            Value::Array(_) => Self::List,
            Value::String(_) => Self::String,
            Value::Number(number) if number.is_f64() => Self::Decimal,
            Value::Number(_) => Self::Integer,
            Value::Bool(_) => Self::Boolean,
            Value::Null => Self::Null,
        }
    }
}

/// Errors raised while building a rendering context.
#[derive(Debug, Error)]
pub enum BuildError {
    /// The script returned something other than a map.
    #[error("Result is a {kind}, expected Map.")]
    NotAMap {
        /// Kind of the value returned.
        kind: ValueKind,
    },
    /// The evaluator failed.
    #[error(transparent)]
    Evaluation(#[from] ScriptError),
}

/// Builds template contexts for commands.
#[derive(Clone)]
pub struct ContextBuilder {
    evaluator: Arc<dyn ScriptEvaluator>,
}

impl fmt::Debug for ContextBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextBuilder").finish_non_exhaustive()
    }
}

impl ContextBuilder {
    /// Creates a builder over `evaluator`.
    #[must_use]
    pub const fn new(evaluator: Arc<dyn ScriptEvaluator>) -> Self {
        Self { evaluator }
    }

    /// Produces the context for `command`.
    ///
    /// Commands without a context script render against an empty context.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::NotAMap`] when the script result is not a map and
    /// [`BuildError::Evaluation`] when the script fails.
    pub fn build(&self, command: &Command) -> Result<Context, BuildError> {
        let Some(path) = command.context_script_path.as_deref() else {
            return Ok(Context::new());
        };
        match self.evaluator.evaluate(path)? {
            Value::Object(entries) => {
                debug!(
                    target: CONTEXT_TARGET,
                    script = %path,
                    bindings = entries.len(),
                    "context built"
                );
                Ok(Context::from(entries))
            }
            other => Err(BuildError::NotAMap {
                kind: ValueKind::of(&other),
            }),
        }
    }
}

/// Evaluates context scripts written in Rhai.
///
/// A script's final expression is its result, so a context script usually
/// ends with an object map literal:
///
/// ```text
/// let who = "World";
/// #{ name: who, items: [1, 2, 3] }
/// ```
#[derive(Debug, Default, Clone, Copy)]
pub struct RhaiScriptEvaluator;

impl RhaiScriptEvaluator {
    /// Creates an evaluator.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl ScriptEvaluator for RhaiScriptEvaluator {
    fn evaluate(&self, path: &Utf8Path) -> Result<Value, ScriptError> {
        let script = fs::read_to_string(path).map_err(|source| ScriptError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let engine = rhai::Engine::new();
        let result = engine
            .eval::<Dynamic>(&script)
            .map_err(|error| ScriptError::evaluation(path, error.to_string()))?;
        rhai::serde::from_dynamic::<Value>(&result).map_err(|error| ScriptError::Conversion {
            path: path.to_path_buf(),
            message: error.to_string(),
        })
    }
}
