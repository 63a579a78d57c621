//! Adapter configuring the template engine for one command.

use camino::Utf8PathBuf;
use tracing::debug;
use vtl::{Context, DEFAULT_MACRO_LIBRARY, Engine, EngineOptions, RenderError};

use crate::dispatch::RenderRequest;

const RENDER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::render");

/// Engine options for a command's resource search paths.
///
/// Strict reference checking is always on. With search paths, resources are
/// cached for the life of the engine and the first directory holding
/// `VM_global_library.vm` supplies macros to every template.
#[must_use]
pub fn engine_options(search_paths: Option<&[Utf8PathBuf]>) -> EngineOptions {
    let strict = EngineOptions::default().strict(true);
    let Some(paths) = search_paths else {
        return strict;
    };
    let searching = strict
        .with_resource_paths(paths.iter().map(|path| path.as_std_path()))
        .with_cache(true);
    let library = paths
        .iter()
        .map(|directory| directory.join(DEFAULT_MACRO_LIBRARY))
        .find(|candidate| candidate.is_file());
    let Some(found) = library else {
        return searching;
    };
    debug!(
        target: RENDER_TARGET,
        library = %found,
        "using global macro library"
    );
    searching.with_macro_library(DEFAULT_MACRO_LIBRARY)
}

/// Renders `request` against `context` with a freshly configured engine.
///
/// # Errors
///
/// Returns the engine's [`RenderError`]; its
/// [`diagnostic`](RenderError::diagnostic) carries the error chain and the
/// template and macro frames.
pub fn render(request: &RenderRequest<'_>, context: &Context) -> Result<String, RenderError> {
    let options = engine_options(request.command().resource_search_paths.as_deref());
    let engine = Engine::new(options)?;
    engine.render(context, request.name(), request.template())
}

#[cfg(test)]
mod tests {
    use std::fs;

    use renderd_types::Command;
    use rstest::rstest;
    use serde_json::json;
    use tempfile::TempDir;

    use super::*;

    struct Resources {
        first: TempDir,
        second: TempDir,
    }

    impl Resources {
        fn new() -> Self {
            Self {
                first: TempDir::new().expect("first dir"),
                second: TempDir::new().expect("second dir"),
            }
        }

        fn paths(&self) -> Vec<Utf8PathBuf> {
            [&self.first, &self.second]
                .iter()
                .map(|dir| Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf8"))
                .collect()
        }
    }

    fn rendered(command: &Command, context: &Context) -> Result<String, RenderError> {
        let request = RenderRequest::validate(command).expect("valid command");
        render(&request, context)
    }

    #[rstest]
    fn options_are_strict_without_paths() {
        let options = engine_options(None);
        assert!(options.strict);
        assert!(options.resource_paths.is_empty());
        assert!(options.macro_libraries.is_empty());
    }

    #[rstest]
    fn library_is_registered_only_when_present() {
        let resources = Resources::new();
        assert!(engine_options(Some(&resources.paths())).macro_libraries.is_empty());

        fs::write(resources.second.path().join(DEFAULT_MACRO_LIBRARY), "").expect("library");
        let options = engine_options(Some(&resources.paths()));
        assert_eq!(options.macro_libraries, [DEFAULT_MACRO_LIBRARY]);
        assert!(options.cache_resources);
    }

    #[rstest]
    fn first_library_on_the_path_wins() {
        let resources = Resources::new();
        fs::write(
            resources.first.path().join(DEFAULT_MACRO_LIBRARY),
            "#macro(who)first#end",
        )
        .expect("first library");
        fs::write(
            resources.second.path().join(DEFAULT_MACRO_LIBRARY),
            "#macro(who)second#end",
        )
        .expect("second library");

        let command = Command::inline("#who()").with_resource_paths(resources.paths());
        assert_eq!(
            rendered(&command, &Context::new()).expect("render"),
            "first"
        );
    }

    #[rstest]
    fn parse_resolves_through_search_paths() {
        let resources = Resources::new();
        fs::write(resources.second.path().join("row.vm"), "<$item>").expect("resource");
        let command = Command::inline("#foreach($item in $items)#parse('row.vm')#end")
            .with_resource_paths(resources.paths());
        let context: Context = [("items".to_owned(), json!(["a", "b"]))].into_iter().collect();
        assert_eq!(rendered(&command, &context).expect("render"), "<a><b>");
    }

    #[rstest]
    fn failures_never_return_partial_output() {
        let command = Command::inline("before $missing after").with_name("page");
        let error = rendered(&command, &Context::new()).expect_err("undefined reference");
        assert!(error.diagnostic().contains("page[line 1, column 8]"));
    }
}
