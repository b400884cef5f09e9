//! Test suites for the inspector daemon.

mod bootstrap_behaviour;
mod connection_behaviour;
pub(crate) mod support;
