//! File-system resource loading for `#parse`, `#include` and macro
//! libraries.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use crate::ast::Template;
use crate::engine::DEFAULT_MAX_NESTING_DEPTH;
use crate::error::{Location, RenderError, RenderErrorKind};
use crate::parser;

const LOADER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::loader");

/// Resolves resource names against an ordered list of directories.
///
/// The first directory containing the resource wins. Parsed templates are
/// cached by name when caching is enabled.
#[derive(Debug)]
pub struct FileResourceLoader {
    search_paths: Vec<PathBuf>,
    cache: Option<RefCell<HashMap<String, Arc<Template>>>>,
    max_nesting_depth: usize,
}

impl FileResourceLoader {
    /// Creates a loader over `search_paths`.
    #[must_use]
    pub fn new(search_paths: Vec<PathBuf>, cache: bool) -> Self {
        Self {
            search_paths,
            cache: cache.then(|| RefCell::new(HashMap::new())),
            max_nesting_depth: DEFAULT_MAX_NESTING_DEPTH,
        }
    }

    /// Sets the nesting limit applied when parsing loaded templates.
    #[must_use]
    pub const fn with_max_nesting_depth(mut self, depth: usize) -> Self {
        self.max_nesting_depth = depth;
        self
    }

    /// Directories searched, in order.
    #[must_use]
    pub fn search_paths(&self) -> &[PathBuf] {
        &self.search_paths
    }

    /// Path of the first file named `name` under the search paths.
    ///
    /// Absolute names and names containing `..` never resolve.
    #[must_use]
    pub fn find(&self, name: &str) -> Option<PathBuf> {
        let relative = Path::new(name.trim_start_matches('/'));
        let confined = relative
            .components()
            .all(|component| matches!(component, Component::Normal(_) | Component::CurDir));
        if !confined || relative.as_os_str().is_empty() {
            return None;
        }
        self.search_paths
            .iter()
            .map(|directory| directory.join(relative))
            .find(|candidate| candidate.is_file())
    }

    /// Reads the raw text of resource `name`.
    pub(crate) fn load_source(&self, name: &str, at: &Location) -> Result<String, RenderError> {
        let path = self.find(name).ok_or_else(|| {
            RenderError::new(
                RenderErrorKind::ResourceNotFound {
                    name: name.to_owned(),
                },
                at.clone(),
            )
        })?;
        debug!(target: LOADER_TARGET, resource = name, path = %path.display(), "loading resource");
        fs::read_to_string(&path).map_err(|source: io::Error| {
            RenderError::new(
                RenderErrorKind::ResourceIo {
                    name: name.to_owned(),
                    source,
                },
                at.clone(),
            )
        })
    }

    /// Loads and parses template `name`, consulting the cache first.
    pub(crate) fn load_template(
        &self,
        name: &str,
        at: &Location,
    ) -> Result<Arc<Template>, RenderError> {
        if let Some(cached) = self
            .cache
            .as_ref()
            .and_then(|cache| cache.borrow().get(name).cloned())
        {
            return Ok(cached);
        }
        let source = self.load_source(name, at)?;
        let template = Arc::new(parser::parse(name, &source, self.max_nesting_depth)?);
        if let Some(cache) = &self.cache {
            cache
                .borrow_mut()
                .insert(name.to_owned(), Arc::clone(&template));
        }
        Ok(template)
    }
}
