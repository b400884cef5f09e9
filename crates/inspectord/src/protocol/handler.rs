//! Connection handler that runs the inspector protocol over JSON lines.

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::{debug, warn};

use crate::health::HealthReporter;
use crate::transport::{ConnectionHandler, ConnectionStream, JsonlFrames, JsonlSink};

use super::PROTOCOL_TARGET;
use super::connection::Connection;
use super::context::InspectorContext;
use super::errors::ConnectionError;

/// Serves each accepted stream as one inspector connection.
pub struct InspectorConnectionHandler {
    context: InspectorContext,
    max_frame_bytes: usize,
    reporter: Arc<dyn HealthReporter>,
    active: AtomicUsize,
}

impl InspectorConnectionHandler {
    /// Creates a handler for connections sharing `context`.
    pub fn new(
        context: InspectorContext,
        max_frame_bytes: usize,
        reporter: Arc<dyn HealthReporter>,
    ) -> Self {
        Self {
            context,
            max_frame_bytes,
            reporter,
            active: AtomicUsize::new(0),
        }
    }

    /// Number of connections currently being served.
    #[must_use]
    pub fn active_connections(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    fn serve(&self, stream: ConnectionStream) -> Result<(), ConnectionError> {
        let writer = stream.try_clone()?;
        let sink = JsonlSink::new(writer).with_close(|stream: &mut ConnectionStream| {
            if let Err(error) = stream.shutdown()
                && error.kind() != io::ErrorKind::NotConnected
            {
                debug!(
                    target: PROTOCOL_TARGET,
                    error = %error,
                    "failed to shut down connection"
                );
            }
        });
        let connection = Connection::open(&self.context, sink)?;
        let mut frames = JsonlFrames::new(stream, self.max_frame_bytes);
        connection.run(&mut frames)
    }
}

impl ConnectionHandler for InspectorConnectionHandler {
    fn handle(&self, stream: ConnectionStream) {
        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.context.hooks().connection_opened();
        self.reporter.connection_opened(active);

        if let Err(error) = self.serve(stream) {
            warn!(
                target: PROTOCOL_TARGET,
                error = %error,
                "inspector connection ended with an error"
            );
        }

        let active = self.active.fetch_sub(1, Ordering::SeqCst).saturating_sub(1);
        self.context.hooks().connection_closed();
        self.reporter.connection_closed(active);
    }
}
