//! Behavioural tests for template rendering.

use std::cell::RefCell;
use std::fs;

use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};
use serde_json::Value;
use tempfile::TempDir;

use crate::{Context, DEFAULT_MACRO_LIBRARY, Engine, EngineOptions};

type StepResult = Result<(), String>;

struct RenderWorld {
    options: EngineOptions,
    context: Context,
    library_dir: Option<TempDir>,
    outcome: Option<Result<String, String>>,
}

impl RenderWorld {
    fn new() -> Self {
        Self {
            options: EngineOptions::default(),
            context: Context::new(),
            library_dir: None,
            outcome: None,
        }
    }

    fn outcome(&self) -> Result<&Result<String, String>, String> {
        self.outcome
            .as_ref()
            .ok_or_else(|| "no template has been rendered".to_owned())
    }
}

#[fixture]
fn world() -> RefCell<RenderWorld> {
    RefCell::new(RenderWorld::new())
}

#[given("a strict engine")]
fn given_strict_engine(world: &RefCell<RenderWorld>) {
    world.borrow_mut().options.strict = true;
}

#[given("a lenient engine")]
fn given_lenient_engine(world: &RefCell<RenderWorld>) {
    world.borrow_mut().options.strict = false;
}

#[given("the context variable \"{name}\" is \"{value}\"")]
fn given_context_variable(world: &RefCell<RenderWorld>, name: String, value: String) {
    world.borrow_mut().context.insert(name, Value::String(value));
}

#[given("a macro library containing \"{source}\"")]
fn given_macro_library(world: &RefCell<RenderWorld>, source: String) -> StepResult {
    let dir = TempDir::new().map_err(|error| error.to_string())?;
    fs::write(dir.path().join(DEFAULT_MACRO_LIBRARY), source).map_err(|error| error.to_string())?;
    let mut world = world.borrow_mut();
    world.options = world
        .options
        .clone()
        .strict(true)
        .with_resource_paths([dir.path()])
        .with_macro_library(DEFAULT_MACRO_LIBRARY);
    world.library_dir = Some(dir);
    Ok(())
}

#[when("the template \"{source}\" is rendered")]
fn when_template_rendered(world: &RefCell<RenderWorld>, source: String) {
    let mut world = world.borrow_mut();
    let outcome = Engine::new(world.options.clone())
        .and_then(|engine| engine.render(&world.context, "scenario", &source))
        .map_err(|error| error.diagnostic());
    world.outcome = Some(outcome);
}

#[then("the output is \"{expected}\"")]
fn then_output_is(world: &RefCell<RenderWorld>, expected: String) -> StepResult {
    match world.borrow().outcome()? {
        Ok(output) if *output == expected => Ok(()),
        Ok(output) => Err(format!("expected {expected:?}, rendered {output:?}")),
        Err(error) => Err(format!("render failed: {error}")),
    }
}

#[then("rendering fails mentioning \"{fragment}\"")]
fn then_rendering_fails(world: &RefCell<RenderWorld>, fragment: String) -> StepResult {
    match world.borrow().outcome()? {
        Err(message) if message.contains(&fragment) => Ok(()),
        Err(message) => Err(format!("diagnostic {message:?} lacks {fragment:?}")),
        Ok(output) => Err(format!("render succeeded with {output:?}")),
    }
}

#[scenario(path = "tests/features/rendering.feature")]
fn template_rendering(world: RefCell<RenderWorld>) {
    drop(world);
}
