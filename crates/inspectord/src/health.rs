//! Structured health reporting for daemon lifecycle events.

use std::sync::Arc;

use inspector_config::{Config, SocketEndpoint};

use crate::bootstrap::BootstrapError;

const HEALTH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::health");

/// Observer for lifecycle events, surfaced to telemetry sinks.
pub trait HealthReporter: Send + Sync {
    /// Invoked before configuration loading begins.
    fn bootstrap_starting(&self);

    /// Invoked after bootstrap completes successfully.
    fn bootstrap_succeeded(&self, config: &Config);

    /// Invoked when bootstrap fails.
    fn bootstrap_failed(&self, error: &BootstrapError);

    /// Invoked once the listener accepts connections.
    fn listener_ready(&self, endpoint: &SocketEndpoint);

    /// Invoked when a client connects; `active` includes the new client.
    fn connection_opened(&self, active: usize);

    /// Invoked when a client is gone; `active` excludes it.
    fn connection_closed(&self, active: usize);
}

impl<T> HealthReporter for Arc<T>
where
    T: HealthReporter + ?Sized,
{
    fn bootstrap_starting(&self) {
        (**self).bootstrap_starting();
    }

    fn bootstrap_succeeded(&self, config: &Config) {
        (**self).bootstrap_succeeded(config);
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        (**self).bootstrap_failed(error);
    }

    fn listener_ready(&self, endpoint: &SocketEndpoint) {
        (**self).listener_ready(endpoint);
    }

    fn connection_opened(&self, active: usize) {
        (**self).connection_opened(active);
    }

    fn connection_closed(&self, active: usize) {
        (**self).connection_closed(active);
    }
}

/// Reporter that records lifecycle events with `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StructuredHealthReporter;

impl StructuredHealthReporter {
    /// Builds a new reporter.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl HealthReporter for StructuredHealthReporter {
    fn bootstrap_starting(&self) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "bootstrap_starting",
            "starting inspector bootstrap"
        );
    }

    fn bootstrap_succeeded(&self, config: &Config) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "bootstrap_succeeded",
            listen = %config.listen(),
            log_filter = %config.log_filter(),
            log_format = %config.log_format(),
            max_frame_bytes = config.max_frame_bytes(),
            "inspector bootstrap completed"
        );
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        tracing::error!(
            target: HEALTH_TARGET,
            event = "bootstrap_failed",
            error = %error,
            "inspector bootstrap failed"
        );
    }

    fn listener_ready(&self, endpoint: &SocketEndpoint) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "listener_ready",
            endpoint = %endpoint,
            "listening for inspector clients"
        );
    }

    fn connection_opened(&self, active: usize) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "connection_opened",
            active,
            "client connected"
        );
    }

    fn connection_closed(&self, active: usize) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "connection_closed",
            active,
            "client disconnected"
        );
    }
}
