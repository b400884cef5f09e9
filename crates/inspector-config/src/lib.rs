//! Shared configuration for the state inspector daemon.
//!
//! Values are layered by `ortho_config`: built-in defaults, then an optional
//! configuration file (`--config-path` or `INSPECTOR_CONFIG_PATH`), then
//! `INSPECTOR_*` environment variables, then command-line flags.

mod defaults;
mod logging;
mod socket;

use camino::Utf8PathBuf;
use ortho_config::OrthoConfig;
use serde::{Deserialize, Serialize};

pub use defaults::{
    DEFAULT_HOST, DEFAULT_LOG_FILTER, DEFAULT_MAX_FRAME_BYTES, DEFAULT_TCP_PORT,
    default_listen_endpoint, default_log_filter, default_log_filter_string, default_log_format,
    default_max_frame_bytes,
};
pub use logging::{LogFormat, LogFormatParseError};
pub use socket::{SocketEndpoint, SocketParseError, SocketPreparationError};

/// Runtime configuration for `inspectord`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(prefix = "INSPECTOR")]
pub struct Config {
    /// Endpoint the daemon accepts inspector connections on.
    #[serde(default = "default_listen_endpoint")]
    #[ortho_config(default = default_listen_endpoint())]
    pub listen: SocketEndpoint,
    /// `tracing` filter directive.
    #[serde(default = "default_log_filter_string")]
    #[ortho_config(default = default_log_filter_string())]
    pub log_filter: String,
    /// Log output format.
    #[serde(default = "default_log_format")]
    #[ortho_config(default = default_log_format())]
    pub log_format: LogFormat,
    /// Largest inbound frame, in bytes, before the connection is dropped.
    #[serde(default = "default_max_frame_bytes")]
    #[ortho_config(default = default_max_frame_bytes())]
    pub max_frame_bytes: usize,
    /// Send `{"unsubscribed": ...}` when a subscription ends because its node
    /// became a scalar.
    #[serde(default)]
    #[ortho_config(default = false)]
    pub announce_auto_unsubscribe: bool,
    /// JSON document used as the initial state tree.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_file: Option<Utf8PathBuf>,
}

impl Config {
    /// Endpoint the daemon listens on.
    #[must_use]
    pub fn listen(&self) -> &SocketEndpoint {
        &self.listen
    }

    /// Log filter directive.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        &self.log_filter
    }

    /// Log output format.
    #[must_use]
    pub fn log_format(&self) -> LogFormat {
        self.log_format
    }

    /// Inbound frame limit in bytes.
    #[must_use]
    pub fn max_frame_bytes(&self) -> usize {
        self.max_frame_bytes
    }

    /// Whether auto-unsubscribes are announced to the client.
    #[must_use]
    pub fn announce_auto_unsubscribe(&self) -> bool {
        self.announce_auto_unsubscribe
    }

    /// Optional seed document for the state tree.
    #[must_use]
    pub fn state_file(&self) -> Option<&camino::Utf8Path> {
        self.state_file.as_deref()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen: default_listen_endpoint(),
            log_filter: default_log_filter_string(),
            log_format: default_log_format(),
            max_frame_bytes: default_max_frame_bytes(),
            announce_auto_unsubscribe: false,
            state_file: None,
        }
    }
}
