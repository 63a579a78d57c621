//! Behavioural tests for the daemon bootstrap sequence.

use std::cell::RefCell;
use std::sync::Arc;

use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};

use crate::bootstrap::{BootstrapError, ConfigLoader, Daemon, bootstrap_with};
use crate::context::RhaiScriptEvaluator;
use crate::server::ServerHandle;

use super::support::{FailingConfigLoader, HealthEvent, RecordingHealthReporter, TestConfigLoader};

type StepResult = Result<(), String>;

/// Scenario world shared across bootstrap steps.
pub struct BootstrapWorld {
    loader: TestConfigLoader,
    failing: bool,
    reporter: Arc<RecordingHealthReporter>,
    daemon: Option<Daemon>,
    error: Option<BootstrapError>,
    server: Option<ServerHandle>,
}

impl BootstrapWorld {
    fn new() -> Self {
        Self {
            loader: TestConfigLoader::new(),
            failing: false,
            reporter: Arc::new(RecordingHealthReporter::default()),
            daemon: None,
            error: None,
            server: None,
        }
    }

    fn bootstrap(&mut self) {
        let loader: &dyn ConfigLoader = if self.failing {
            &FailingConfigLoader
        } else {
            &self.loader
        };
        match bootstrap_with(loader, self.reporter.clone()) {
            Ok(daemon) => self.daemon = Some(daemon),
            Err(error) => self.error = Some(error),
        }
    }

    fn recorded(&self, event: &HealthEvent) -> StepResult {
        let events = self.reporter.events();
        if events.contains(event) {
            Ok(())
        } else {
            Err(format!("missing {event:?} in {events:?}"))
        }
    }
}

#[fixture]
fn world() -> RefCell<BootstrapWorld> {
    RefCell::new(BootstrapWorld::new())
}

#[given("a healthy configuration loader")]
fn given_healthy_loader(world: &RefCell<BootstrapWorld>) {
    world.borrow_mut().failing = false;
}

#[given("a failing configuration loader")]
fn given_failing_loader(world: &RefCell<BootstrapWorld>) {
    world.borrow_mut().failing = true;
}

#[when("the daemon bootstrap runs")]
fn when_bootstrap_runs(world: &RefCell<BootstrapWorld>) {
    world.borrow_mut().bootstrap();
}

#[when("the daemon starts serving")]
fn when_daemon_serves(world: &RefCell<BootstrapWorld>) -> StepResult {
    let mut world = world.borrow_mut();
    let daemon = world.daemon.as_ref().ok_or("daemon was not bootstrapped")?;
    let server = daemon
        .serve(Arc::new(RhaiScriptEvaluator::new()))
        .map_err(|error| format!("serve failed: {error}"))?;
    world.server = Some(server);
    Ok(())
}

#[when("the daemon is stopped")]
fn when_daemon_stopped(world: &RefCell<BootstrapWorld>) -> StepResult {
    let server = world
        .borrow_mut()
        .server
        .take()
        .ok_or("daemon is not serving")?;
    server.stop().map_err(|error| format!("stop failed: {error}"))
}

#[then("bootstrap succeeds")]
fn then_bootstrap_succeeds(world: &RefCell<BootstrapWorld>) -> StepResult {
    let world = world.borrow();
    match (&world.daemon, &world.error) {
        (Some(_), None) => Ok(()),
        (_, error) => Err(format!("bootstrap error: {error:?}")),
    }
}

#[then("bootstrap fails")]
fn then_bootstrap_fails(world: &RefCell<BootstrapWorld>) -> StepResult {
    let world = world.borrow();
    match &world.error {
        Some(BootstrapError::Configuration { .. }) => Ok(()),
        other => Err(format!("expected a configuration error, got {other:?}")),
    }
}

#[then("the socket directory exists")]
fn then_socket_directory_exists(world: &RefCell<BootstrapWorld>) -> StepResult {
    let socket = world.borrow().loader.socket_path();
    let parent = socket.parent().ok_or("socket path has no parent")?;
    if parent.is_dir() {
        Ok(())
    } else {
        Err(format!("{parent} was not created"))
    }
}

#[then("the socket file exists")]
fn then_socket_exists(world: &RefCell<BootstrapWorld>) -> StepResult {
    let socket = world.borrow().loader.socket_path();
    if socket.exists() {
        Ok(())
    } else {
        Err(format!("{socket} is missing"))
    }
}

#[then("the socket file is removed")]
fn then_socket_removed(world: &RefCell<BootstrapWorld>) -> StepResult {
    let socket = world.borrow().loader.socket_path();
    if socket.exists() {
        Err(format!("{socket} still exists"))
    } else {
        Ok(())
    }
}

#[then("the reporter recorded bootstrap start")]
fn then_reporter_start(world: &RefCell<BootstrapWorld>) -> StepResult {
    world.borrow().recorded(&HealthEvent::BootstrapStarting)
}

#[then("the reporter recorded bootstrap success")]
fn then_reporter_success(world: &RefCell<BootstrapWorld>) -> StepResult {
    world.borrow().recorded(&HealthEvent::BootstrapSucceeded)
}

#[then("the reporter recorded bootstrap failure")]
fn then_reporter_failure(world: &RefCell<BootstrapWorld>) -> StepResult {
    let events = world.borrow().reporter.events();
    if events
        .iter()
        .any(|event| matches!(event, HealthEvent::BootstrapFailed(_)))
    {
        Ok(())
    } else {
        Err(format!("bootstrap failure event missing: {events:?}"))
    }
}

#[then("the reporter recorded the server stopping")]
fn then_reporter_stopped(world: &RefCell<BootstrapWorld>) -> StepResult {
    world.borrow().recorded(&HealthEvent::ServerStopped)
}

#[scenario(path = "tests/features/daemon_bootstrap.feature")]
fn daemon_bootstrap(world: RefCell<BootstrapWorld>) {
    drop(world);
}
