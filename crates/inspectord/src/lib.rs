//! Inspector daemon.
//!
//! The daemon exposes a live state tree to remote inspector clients. Each
//! client connection can subscribe to nodes of the tree and receives a
//! one-level summary of the node whenever it changes. Nodes may carry
//! commands; clients invoke them by name and receive a response correlated
//! with the request id once the command completes.
//!
//! Start-up follows a fixed sequence: load configuration, install structured
//! telemetry, prepare the socket filesystem, and seed the state store.
//! Health reporting hooks emit structured events at each stage and as
//! connections open and close. The listener then serves every accepted
//! stream as JSON lines until the process receives a shutdown signal.
//!
//! The protocol engine in [`protocol`] is transport agnostic and can be
//! driven by any [`protocol::FrameSource`] and [`protocol::FrameSink`] pair.

mod bootstrap;
mod health;
mod process;
pub mod protocol;
mod telemetry;
pub mod transport;

pub use bootstrap::{
    BootstrapError, ConfigLoader, Daemon, SeedError, StaticConfigLoader, SystemConfigLoader,
    bootstrap_with, seed_store,
};
pub use health::{HealthReporter, StructuredHealthReporter};
pub use process::{
    LaunchError, ShutdownError, ShutdownSignal, SystemShutdownSignal, run_daemon, run_daemon_with,
};
pub use telemetry::{TelemetryError, TelemetryHandle};

#[cfg(test)]
mod tests;
