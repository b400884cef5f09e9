//! Test doubles shared by the daemon unit and behaviour suites.

mod config_loader;
mod frames;
mod reporter;
mod store;
mod world;

pub use config_loader::{FailingConfigLoader, TestConfigLoader};
pub use frames::{RecordingSink, ScriptedFrames};
pub use reporter::{HealthEvent, RecordingHealthReporter};
pub use store::ScriptedStore;
pub use world::{ConnectionWorld, world};
