//! Error types for template parsing and evaluation.
//!
//! Every failure carries the [`Location`] it was raised at. Errors that
//! unwind through macro invocations or `#parse` directives collect one
//! [`Frame`] per level so [`RenderError::diagnostic`] can print a trace.

use std::error::Error as _;
use std::fmt;
use std::io;

use thiserror::Error;

/// One-based line and column inside a named template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    /// Template name as passed to the engine or resolved by the loader.
    pub template: String,
    /// One-based line number.
    pub line: u32,
    /// One-based column number, counted in characters.
    pub column: u32,
}

impl Location {
    /// Creates a location.
    #[must_use]
    pub fn new(template: impl Into<String>, line: u32, column: u32) -> Self {
        Self {
            template: template.into(),
            line,
            column,
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            formatter,
            "{}[line {}, column {}]",
            self.template, self.line, self.column
        )
    }
}

/// Scope entered while rendering, reported in traces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Invocation of a velocimacro.
    Macro {
        /// Macro name without the leading `#`.
        name: String,
        /// Where the macro was called from.
        called_at: Location,
    },
    /// Template pulled in by `#parse`.
    Parse {
        /// Resource name of the parsed template.
        resource: String,
        /// Where the directive appeared.
        called_at: Location,
    },
}

impl fmt::Display for Frame {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Macro { name, called_at } => {
                write!(formatter, "in macro #{name} called at {called_at}")
            }
            Self::Parse {
                resource,
                called_at,
            } => write!(formatter, "in #parse('{resource}') at {called_at}"),
        }
    }
}

/// Template syntax error.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message} at {location}")]
pub struct ParseError {
    /// Description of the problem.
    pub message: String,
    /// Where the problem was detected.
    pub location: Location,
}

/// What went wrong while rendering.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RenderErrorKind {
    /// Template source failed to parse.
    #[error("syntax error: {message}")]
    Syntax {
        /// Parser diagnostic.
        message: String,
    },
    /// A reference names a variable that was never set.
    #[error("Variable {reference} has not been set")]
    UndefinedReference {
        /// Reference as written in the template, e.g. `$name`.
        reference: String,
    },
    /// A reference resolved to null where a value is required.
    #[error("Reference {reference} evaluated to null")]
    NullReference {
        /// Reference as written in the template.
        reference: String,
    },
    /// A property or key does not exist on the resolved value.
    #[error("Attempted to access '{property}' on {target} which has no such property")]
    UnknownProperty {
        /// Reference prefix the property was read from.
        target: String,
        /// Property or key name.
        property: String,
    },
    /// A method call could not be performed.
    #[error("Cannot invoke {method}() on {target}: {reason}")]
    MethodInvocation {
        /// Reference prefix the method was called on.
        target: String,
        /// Method name.
        method: String,
        /// Why the invocation failed.
        reason: String,
    },
    /// An operator or directive received operands of the wrong type.
    #[error("{message}")]
    InvalidOperation {
        /// Description of the failure.
        message: String,
    },
    /// A macro call names no known macro.
    #[error("Macro '#{name}' is not defined")]
    UndefinedMacro {
        /// Macro name.
        name: String,
    },
    /// A macro was called with the wrong number of arguments.
    #[error("Macro '#{name}' takes {expected} argument(s) but {actual} were given")]
    MacroArity {
        /// Macro name.
        name: String,
        /// Declared parameter count.
        expected: usize,
        /// Argument count at the call site.
        actual: usize,
    },
    /// A `#parse` or `#include` resource could not be found.
    #[error("Unable to find resource '{name}'")]
    ResourceNotFound {
        /// Resource name.
        name: String,
    },
    /// A resource exists but could not be read.
    #[error("Unable to read resource '{name}': {source}")]
    ResourceIo {
        /// Resource name.
        name: String,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Macro or `#parse` nesting exceeded its limit.
    #[error("Maximum {what} depth of {limit} exceeded")]
    RecursionLimit {
        /// What nested too deeply (`macro` or `#parse`).
        what: &'static str,
        /// Configured limit.
        limit: usize,
    },
}

/// Failure raised while configuring the engine or rendering a template.
#[derive(Debug)]
pub struct RenderError(Box<RenderErrorInner>);

#[derive(Debug)]
struct RenderErrorInner {
    kind: RenderErrorKind,
    location: Location,
    trace: Vec<Frame>,
}

impl RenderError {
    /// Creates an error raised at `location`.
    #[must_use]
    pub fn new(kind: RenderErrorKind, location: Location) -> Self {
        Self(Box::new(RenderErrorInner {
            kind,
            location,
            trace: Vec::new(),
        }))
    }

    /// Records the frame the error unwound through.
    #[must_use]
    pub fn with_frame(mut self, frame: Frame) -> Self {
        self.0.trace.push(frame);
        self
    }

    /// What went wrong.
    #[must_use]
    pub fn kind(&self) -> &RenderErrorKind {
        &self.0.kind
    }

    /// Where the failure was raised.
    #[must_use]
    pub fn location(&self) -> &Location {
        &self.0.location
    }

    /// Frames from the innermost scope outwards.
    #[must_use]
    pub fn trace(&self) -> &[Frame] {
        &self.0.trace
    }

    /// Full multi-line report: the error, its causes, and the scope trace.
    #[must_use]
    pub fn diagnostic(&self) -> String {
        let mut report = self.to_string();
        let mut cause = self.0.kind.source();
        while let Some(error) = cause {
            report.push_str("\ncaused by: ");
            report.push_str(&error.to_string());
            cause = error.source();
        }
        for frame in &self.0.trace {
            report.push_str("\n\t");
            report.push_str(&frame.to_string());
        }
        report
    }
}

impl fmt::Display for RenderError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{} at {}", self.0.kind, self.0.location)
    }
}

impl std::error::Error for RenderError {}

impl From<ParseError> for RenderError {
    fn from(error: ParseError) -> Self {
        Self::new(
            RenderErrorKind::Syntax {
                message: error.message,
            },
            error.location,
        )
    }
}
