//! Process-wide tracing subscriber set-up.

use std::io::{self, IsTerminal};

use inspector_config::{Config, LogFormat};
use once_cell::sync::OnceCell;
use tracing::Subscriber;
use tracing::subscriber::SetGlobalDefaultError;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::{self, time::UtcTime};

static TELEMETRY_GUARD: OnceCell<()> = OnceCell::new();

/// Proof that the global subscriber is installed.
#[derive(Debug, Default, Clone, Copy)]
pub struct TelemetryHandle;

/// Errors encountered while configuring telemetry.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    /// The configured filter expression did not parse.
    #[error("invalid log filter: {0}")]
    Filter(String),
    /// Another subscriber was already installed globally.
    #[error("failed to install telemetry subscriber: {0}")]
    Subscriber(SetGlobalDefaultError),
}

/// Installs the global subscriber on first use.
///
/// Later calls return a handle without touching global state, even when
/// they pass a different configuration.
///
/// # Errors
///
/// Returns [`TelemetryError`] when the filter is invalid or a foreign
/// subscriber is already installed.
pub fn initialise(config: &Config) -> Result<TelemetryHandle, TelemetryError> {
    TELEMETRY_GUARD
        .get_or_try_init(|| install_subscriber(config))
        .map(|()| TelemetryHandle)
}

fn install_subscriber(config: &Config) -> Result<(), TelemetryError> {
    let filter = EnvFilter::try_new(config.log_filter())
        .map_err(|error| TelemetryError::Filter(error.to_string()))?;

    let builder = fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(true)
        .with_writer(io::stderr)
        .with_ansi(io::stderr().is_terminal())
        .with_timer(UtcTime::rfc_3339());

    let subscriber: Box<dyn Subscriber + Send + Sync> = match config.log_format() {
        LogFormat::Json => Box::new(builder.json().flatten_event(true).finish()),
        LogFormat::Compact => Box::new(builder.compact().finish()),
    };

    tracing::subscriber::set_global_default(subscriber).map_err(TelemetryError::Subscriber)
}
