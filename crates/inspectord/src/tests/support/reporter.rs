//! [`HealthReporter`] double that records events for assertions.

use std::sync::Mutex;

use inspector_config::{Config, SocketEndpoint};

use crate::bootstrap::BootstrapError;
use crate::health::HealthReporter;

/// Health events observed during a test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthEvent {
    BootstrapStarting,
    BootstrapSucceeded,
    BootstrapFailed(String),
    ListenerReady(SocketEndpoint),
    ConnectionOpened { active: usize },
    ConnectionClosed { active: usize },
}

#[derive(Debug, Default)]
pub struct RecordingHealthReporter {
    events: Mutex<Vec<HealthEvent>>,
}

impl RecordingHealthReporter {
    /// Copy of the events recorded so far.
    pub fn events(&self) -> Vec<HealthEvent> {
        self.events
            .lock()
            .expect("health reporter mutex poisoned")
            .clone()
    }

    fn record(&self, event: HealthEvent) {
        self.events
            .lock()
            .expect("health reporter mutex poisoned")
            .push(event);
    }
}

impl HealthReporter for RecordingHealthReporter {
    fn bootstrap_starting(&self) {
        self.record(HealthEvent::BootstrapStarting);
    }

    fn bootstrap_succeeded(&self, _config: &Config) {
        self.record(HealthEvent::BootstrapSucceeded);
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        self.record(HealthEvent::BootstrapFailed(error.to_string()));
    }

    fn listener_ready(&self, endpoint: &SocketEndpoint) {
        self.record(HealthEvent::ListenerReady(endpoint.clone()));
    }

    fn connection_opened(&self, active: usize) {
        self.record(HealthEvent::ConnectionOpened { active });
    }

    fn connection_closed(&self, active: usize) {
        self.record(HealthEvent::ConnectionClosed { active });
    }
}
