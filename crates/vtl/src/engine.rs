//! Engine configuration and the public render entry point.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::debug;

use crate::ast::MacroDef;
use crate::context::Context;
use crate::error::{Location, RenderError, RenderErrorKind};
use crate::eval::Renderer;
use crate::loader::FileResourceLoader;
use crate::parser;

const ENGINE_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::engine");

/// Resource name conventionally holding shared macros.
pub const DEFAULT_MACRO_LIBRARY: &str = "VM_global_library.vm";

/// Default nesting limit for `#parse`.
pub const DEFAULT_MAX_PARSE_DEPTH: usize = 10;

/// Default nesting limit for macro invocations.
pub const DEFAULT_MAX_MACRO_DEPTH: usize = 20;

/// Default limit on how deeply blocks, expressions and interpolated strings
/// may nest within one template.
pub const DEFAULT_MAX_NESTING_DEPTH: usize = 128;

/// How an [`Engine`] resolves references and resources.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineOptions {
    /// Fail on undefined references, unknown properties and missing macros
    /// instead of rendering the reference text.
    pub strict: bool,
    /// Directories searched for `#parse`, `#include` and macro libraries.
    pub resource_paths: Vec<PathBuf>,
    /// Reuse parsed resources for the lifetime of the engine.
    pub cache_resources: bool,
    /// Resources whose macro definitions are visible to every template.
    pub macro_libraries: Vec<String>,
    /// Maximum `#parse` nesting.
    pub max_parse_depth: usize,
    /// Maximum macro call nesting.
    pub max_macro_depth: usize,
    /// Maximum syntactic nesting within one template. Deeper templates fail
    /// to parse.
    pub max_nesting_depth: usize,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            strict: false,
            resource_paths: Vec::new(),
            cache_resources: true,
            macro_libraries: Vec::new(),
            max_parse_depth: DEFAULT_MAX_PARSE_DEPTH,
            max_macro_depth: DEFAULT_MAX_MACRO_DEPTH,
            max_nesting_depth: DEFAULT_MAX_NESTING_DEPTH,
        }
    }
}

impl EngineOptions {
    /// Enables or disables strict reference checking.
    #[must_use]
    pub const fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Sets the resource search path.
    #[must_use]
    pub fn with_resource_paths<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.resource_paths = paths.into_iter().map(Into::into).collect();
        self
    }

    /// Adds a macro library resource.
    #[must_use]
    pub fn with_macro_library(mut self, name: impl Into<String>) -> Self {
        self.macro_libraries.push(name.into());
        self
    }

    /// Enables or disables resource caching.
    #[must_use]
    pub const fn with_cache(mut self, cache: bool) -> Self {
        self.cache_resources = cache;
        self
    }

    /// Sets the syntactic nesting limit.
    #[must_use]
    pub const fn with_max_nesting_depth(mut self, depth: usize) -> Self {
        self.max_nesting_depth = depth;
        self
    }
}

/// Template engine bound to one set of [`EngineOptions`].
#[derive(Debug)]
pub struct Engine {
    options: EngineOptions,
    loader: Option<FileResourceLoader>,
    library_macros: HashMap<String, Arc<MacroDef>>,
}

impl Engine {
    /// Creates an engine, loading its macro libraries.
    ///
    /// # Errors
    ///
    /// Returns a [`RenderError`] when a macro library cannot be found, read
    /// or parsed.
    pub fn new(options: EngineOptions) -> Result<Self, RenderError> {
        let loader = (!options.resource_paths.is_empty()).then(|| {
            FileResourceLoader::new(options.resource_paths.clone(), options.cache_resources)
                .with_max_nesting_depth(options.max_nesting_depth)
        });

        let mut library_macros = HashMap::new();
        for library in &options.macro_libraries {
            let at = Location::new(library.clone(), 1, 1);
            let Some(resources) = loader.as_ref() else {
                return Err(RenderError::new(
                    RenderErrorKind::ResourceNotFound {
                        name: library.clone(),
                    },
                    at,
                ));
            };
            let template = resources.load_template(library, &at)?;
            for definition in &template.macros {
                library_macros.insert(definition.name.clone(), Arc::clone(definition));
            }
            debug!(
                target: ENGINE_TARGET,
                library = %library,
                macros = template.macros.len(),
                "loaded macro library"
            );
        }

        Ok(Self {
            options,
            loader,
            library_macros,
        })
    }

    /// Options the engine was built with.
    #[must_use]
    pub const fn options(&self) -> &EngineOptions {
        &self.options
    }

    /// Resource loader, present when resource paths were configured.
    #[must_use]
    pub const fn loader(&self) -> Option<&FileResourceLoader> {
        self.loader.as_ref()
    }

    pub(crate) fn library_macros(&self) -> &HashMap<String, Arc<MacroDef>> {
        &self.library_macros
    }

    /// Renders `source` as template `name` against a copy of `context`.
    ///
    /// # Errors
    ///
    /// Returns a [`RenderError`] when the template fails to parse or, in
    /// strict mode, references something that does not exist.
    pub fn render(
        &self,
        context: &Context,
        name: &str,
        source: &str,
    ) -> Result<String, RenderError> {
        let template = parser::parse(name, source, self.options.max_nesting_depth)?;
        Renderer::new(self, context.clone()).render(&template)
    }
}
