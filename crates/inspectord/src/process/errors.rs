//! Error surface for daemon launch and supervision.

use thiserror::Error;

use crate::bootstrap::BootstrapError;
use crate::transport::ListenerError;

use super::shutdown::ShutdownError;

/// Errors surfaced while launching or running the daemon.
#[derive(Debug, Error)]
pub enum LaunchError {
    /// Bootstrapping the daemon failed.
    #[error("inspector bootstrap failed: {source}")]
    Bootstrap {
        /// Underlying bootstrap error.
        #[source]
        source: BootstrapError,
    },
    /// The listener could not be bound or started.
    #[error("inspector listener failed: {source}")]
    Listener {
        /// Underlying listener error.
        #[source]
        source: ListenerError,
    },
    /// Waiting for a shutdown signal failed.
    #[error("failed to await shutdown signal: {source}")]
    Shutdown {
        /// Underlying shutdown error.
        #[source]
        source: ShutdownError,
    },
}

impl From<BootstrapError> for LaunchError {
    fn from(source: BootstrapError) -> Self {
        Self::Bootstrap { source }
    }
}

impl From<ListenerError> for LaunchError {
    fn from(source: ListenerError) -> Self {
        Self::Listener { source }
    }
}

impl From<ShutdownError> for LaunchError {
    fn from(source: ShutdownError) -> Self {
        Self::Shutdown { source }
    }
}
