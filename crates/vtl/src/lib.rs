//! A Velocity Template Language engine for `renderd`.
//!
//! The crate renders text templates against a [`Context`] of JSON values.
//! It covers the commonly used subset of the language:
//!
//! - references: `$name`, `${name}`, quiet `$!name`, properties
//!   (`$user.name`), methods (`$list.size()`) and indexes (`$map['k']`)
//! - directives: `#set`, `#if`/`#elseif`/`#else`, `#foreach` (with
//!   `$foreach.count`, `$foreach.index` and `$foreach.hasNext`), `#break`,
//!   `#stop`, `#macro` and macro calls, `#parse` and `#include`
//! - comments (`##`, `#* *#`), unparsed blocks (`#[[ ]]#`) and `\$`/`\#`
//!   escapes
//! - expressions with arithmetic, comparison and logical operators, list,
//!   range and map literals, and interpolated double-quoted strings
//!
//! In strict mode ([`EngineOptions::strict`]) an undefined reference, an
//! unknown property or a missing macro aborts rendering with a
//! [`RenderError`] that names the template, line and column.
//!
//! # Example
//!
//! ```
//! use vtl::{Context, Engine, EngineOptions};
//!
//! let engine = Engine::new(EngineOptions::default().strict(true))?;
//! let mut context = Context::new();
//! context.insert("name", "World");
//! let text = engine.render(&context, "greeting", "Hello $name!")?;
//! assert_eq!(text, "Hello World!");
//! # Ok::<(), vtl::RenderError>(())
//! ```

mod ast;
mod context;
mod engine;
mod error;
mod eval;
mod loader;
mod parser;
mod value;

pub use context::Context;
pub use engine::{
    DEFAULT_MACRO_LIBRARY, DEFAULT_MAX_MACRO_DEPTH, DEFAULT_MAX_NESTING_DEPTH,
    DEFAULT_MAX_PARSE_DEPTH, Engine, EngineOptions,
};
pub use error::{Frame, Location, ParseError, RenderError, RenderErrorKind};
pub use loader::FileResourceLoader;

#[cfg(test)]
mod tests;
