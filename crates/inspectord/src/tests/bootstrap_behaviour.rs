//! Behavioural tests for the daemon bootstrap sequence.

use std::cell::RefCell;
use std::sync::Arc;

use inspector_state::Path;
use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};
use serde_json::Value;

use crate::bootstrap::{BootstrapError, ConfigLoader, Daemon, SeedError, bootstrap_with};
use crate::health::HealthReporter;

use super::support::{FailingConfigLoader, HealthEvent, RecordingHealthReporter, TestConfigLoader};

type StepResult = Result<(), String>;

struct BootstrapWorld {
    loader: Option<Box<dyn ConfigLoader>>,
    socket_dir: Option<camino::Utf8PathBuf>,
    reporter: Arc<RecordingHealthReporter>,
    outcome: Option<Result<Daemon, BootstrapError>>,
}

impl BootstrapWorld {
    fn new() -> Self {
        Self {
            loader: None,
            socket_dir: None,
            reporter: Arc::new(RecordingHealthReporter::default()),
            outcome: None,
        }
    }

    fn use_loader(&mut self, loader: TestConfigLoader) {
        self.socket_dir = loader.socket_path().parent().map(ToOwned::to_owned);
        self.loader = Some(Box::new(loader));
    }

    fn daemon(&self) -> Result<&Daemon, String> {
        match &self.outcome {
            Some(Ok(daemon)) => Ok(daemon),
            Some(Err(error)) => Err(format!("bootstrap failed: {error}")),
            None => Err("bootstrap has not run".to_owned()),
        }
    }

    fn error(&self) -> Result<&BootstrapError, String> {
        match &self.outcome {
            Some(Err(error)) => Ok(error),
            Some(Ok(_)) => Err("bootstrap unexpectedly succeeded".to_owned()),
            None => Err("bootstrap has not run".to_owned()),
        }
    }
}

#[fixture]
fn world() -> RefCell<BootstrapWorld> {
    RefCell::new(BootstrapWorld::new())
}

#[given("a healthy configuration loader")]
fn given_healthy_loader(world: &RefCell<BootstrapWorld>) {
    world.borrow_mut().use_loader(TestConfigLoader::new());
}

#[given("a failing configuration loader")]
fn given_failing_loader(world: &RefCell<BootstrapWorld>) {
    world.borrow_mut().loader = Some(Box::new(FailingConfigLoader));
}

#[given("a configuration loader with state {document}")]
fn given_loader_with_state(world: &RefCell<BootstrapWorld>, document: String) {
    world
        .borrow_mut()
        .use_loader(TestConfigLoader::new().with_state(&document));
}

#[when("the daemon bootstrap runs")]
fn when_bootstrap_runs(world: &RefCell<BootstrapWorld>) -> StepResult {
    let mut guard = world.borrow_mut();
    let world = &mut *guard;
    let loader = world
        .loader
        .as_deref()
        .ok_or_else(|| "no configuration loader chosen".to_owned())?;
    let reporter = Arc::clone(&world.reporter) as Arc<dyn HealthReporter>;
    world.outcome = Some(bootstrap_with(loader, reporter));
    Ok(())
}

#[then("bootstrap succeeds")]
fn then_bootstrap_succeeds(world: &RefCell<BootstrapWorld>) -> StepResult {
    world.borrow().daemon().map(|_| ())
}

#[then("bootstrap fails with a configuration error")]
fn then_configuration_error(world: &RefCell<BootstrapWorld>) -> StepResult {
    match world.borrow().error()? {
        BootstrapError::Configuration { .. } => Ok(()),
        other => Err(format!("unexpected error: {other}")),
    }
}

#[then("bootstrap fails with a seed error")]
fn then_seed_error(world: &RefCell<BootstrapWorld>) -> StepResult {
    match world.borrow().error()? {
        BootstrapError::Seed {
            source: SeedError::NotAnObject { .. },
        } => Ok(()),
        other => Err(format!("unexpected error: {other}")),
    }
}

#[then("the health reporter saw bootstrap succeed")]
fn then_reporter_success(world: &RefCell<BootstrapWorld>) {
    assert_eq!(
        world.borrow().reporter.events(),
        vec![HealthEvent::BootstrapStarting, HealthEvent::BootstrapSucceeded]
    );
}

#[then("the health reporter saw bootstrap fail")]
fn then_reporter_failure(world: &RefCell<BootstrapWorld>) {
    let events = world.borrow().reporter.events();
    assert_eq!(events.first(), Some(&HealthEvent::BootstrapStarting));
    assert!(
        matches!(events.get(1), Some(HealthEvent::BootstrapFailed(_))),
        "events: {events:?}"
    );
    assert_eq!(events.len(), 2, "events: {events:?}");
}

#[then("the socket directory exists")]
fn then_socket_directory_exists(world: &RefCell<BootstrapWorld>) {
    let world = world.borrow();
    let dir = world.socket_dir.as_ref().expect("socket directory recorded");
    assert!(dir.is_dir(), "{dir} should have been created");
}

#[then("the stored value at \"{target}\" is {value}")]
fn then_value_is(world: &RefCell<BootstrapWorld>, target: String, value: String) -> StepResult {
    let world = world.borrow();
    let daemon = world.daemon()?;
    let path = Path::parse(&target).map_err(|error| error.to_string())?;
    let expected: Value = serde_json::from_str(&value).map_err(|error| error.to_string())?;
    let stored = daemon.store().get(&path).map(|node| node.to_json());
    if stored.as_ref() == Some(&expected) {
        Ok(())
    } else {
        Err(format!("expected {expected} at {target}, found {stored:?}"))
    }
}

#[scenario(
    path = "tests/features/daemon_bootstrap.feature",
    name = "Bootstrap with a healthy configuration"
)]
fn healthy_bootstrap(world: RefCell<BootstrapWorld>) {
    drop(world);
}

#[scenario(
    path = "tests/features/daemon_bootstrap.feature",
    name = "Bootstrap with an invalid configuration"
)]
fn failing_bootstrap(world: RefCell<BootstrapWorld>) {
    drop(world);
}

#[scenario(
    path = "tests/features/daemon_bootstrap.feature",
    name = "A state file seeds the store"
)]
fn seeded_bootstrap(world: RefCell<BootstrapWorld>) {
    drop(world);
}

#[scenario(
    path = "tests/features/daemon_bootstrap.feature",
    name = "A state file that is not an object stops bootstrap"
)]
fn invalid_seed_bootstrap(world: RefCell<BootstrapWorld>) {
    drop(world);
}
