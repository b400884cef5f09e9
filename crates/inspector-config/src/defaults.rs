use crate::logging::LogFormat;
use crate::socket::SocketEndpoint;

/// Host the daemon binds when nothing else is configured.
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Port the daemon binds when nothing else is configured.
pub const DEFAULT_TCP_PORT: u16 = 8000;

/// Default log filter expression.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Largest inbound frame accepted by default (1 MiB).
pub const DEFAULT_MAX_FRAME_BYTES: usize = 1024 * 1024;

/// Default log filter expression.
#[must_use]
pub fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

/// Owned default log filter for serde and `ortho_config` defaults.
#[must_use]
pub fn default_log_filter_string() -> String {
    DEFAULT_LOG_FILTER.to_owned()
}

/// Default log format.
#[must_use]
pub fn default_log_format() -> LogFormat {
    LogFormat::Json
}

/// Default listen endpoint, `tcp://127.0.0.1:8000`.
#[must_use]
pub fn default_listen_endpoint() -> SocketEndpoint {
    SocketEndpoint::tcp(DEFAULT_HOST, DEFAULT_TCP_PORT)
}

/// Default inbound frame limit.
#[must_use]
pub const fn default_max_frame_bytes() -> usize {
    DEFAULT_MAX_FRAME_BYTES
}
