//! Launch sequencing: bootstrap, listen, wait, and shut down.

use std::sync::Arc;

use tracing::info;

use crate::bootstrap::{ConfigLoader, SystemConfigLoader, bootstrap_with};
use crate::health::{HealthReporter, StructuredHealthReporter};
use crate::protocol::InspectorConnectionHandler;
use crate::transport::SocketListener;

use super::PROCESS_TARGET;
use super::errors::LaunchError;
use super::shutdown::{ShutdownSignal, SystemShutdownSignal};

/// Runs the daemon with the production collaborators.
///
/// # Errors
///
/// Returns [`LaunchError`] when bootstrap, listening, or signal handling
/// fails.
pub fn run_daemon() -> Result<(), LaunchError> {
    run_daemon_with(
        &SystemConfigLoader,
        Arc::new(StructuredHealthReporter::new()),
        &SystemShutdownSignal,
    )
}

/// Runs the daemon with injected collaborators.
///
/// Blocks until `shutdown` returns, then stops accepting connections.
/// Connections that are still open finish on their own threads.
///
/// # Errors
///
/// Returns [`LaunchError`] when bootstrap, listening, or signal handling
/// fails.
pub fn run_daemon_with(
    loader: &dyn ConfigLoader,
    reporter: Arc<dyn HealthReporter>,
    shutdown: &dyn ShutdownSignal,
) -> Result<(), LaunchError> {
    let daemon = bootstrap_with(loader, Arc::clone(&reporter))?;
    let config = daemon.config();

    let listener = SocketListener::bind(config.listen())?;
    if let Some(addr) = listener.local_addr() {
        info!(target: PROCESS_TARGET, %addr, "listener bound");
    }
    let handler = Arc::new(InspectorConnectionHandler::new(
        daemon.context(),
        config.max_frame_bytes(),
        Arc::clone(&reporter),
    ));
    let handle = listener.start(handler)?;
    reporter.listener_ready(config.listen());

    let waited = shutdown.wait();
    handle.shutdown();
    handle.join()?;
    waited?;
    info!(target: PROCESS_TARGET, "shutdown sequence completed");
    Ok(())
}
