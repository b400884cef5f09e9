//! Per-connection coordinator.
//!
//! A [`Connection`] owns the outbound channel, the subscription registry and
//! the command dispatcher of one client. It routes decoded frames and tears
//! everything down exactly once when the client goes away or misbehaves.

use std::sync::Arc;

use strum::Display;
use tracing::{debug, info};

use super::PROTOCOL_TARGET;
use super::commands::CommandDispatcher;
use super::context::InspectorContext;
use super::errors::ConnectionError;
use super::frames::{FrameSink, FrameSource};
use super::messages::InboundMessage;
use super::outbound::OutboundChannel;
use super::subscriptions::SubscriptionRegistry;

/// Lifecycle of a connection. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum ConnectionState {
    /// Frames are being processed.
    Open,
    /// Resources are being released.
    Closing,
    /// Nothing is left running for this connection.
    Closed,
}

/// Protocol engine for one client.
pub struct Connection {
    state: ConnectionState,
    outbound: OutboundChannel,
    subscriptions: SubscriptionRegistry,
    commands: CommandDispatcher,
}

impl Connection {
    /// Opens a connection whose responses are written to `sink`.
    ///
    /// Nothing is sent until the client asks for something.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError::Transport`] when the sender thread cannot
    /// be started.
    pub fn open<S: FrameSink>(context: &InspectorContext, sink: S) -> Result<Self, ConnectionError> {
        let outbound = OutboundChannel::start(sink)?;
        let subscriptions = SubscriptionRegistry::new(
            Arc::clone(context.store()),
            outbound.queue(),
            context.announce_auto_unsubscribe(),
        );
        let commands = CommandDispatcher::new(Arc::clone(context.store()), outbound.queue());
        Ok(Self {
            state: ConnectionState::Open,
            outbound,
            subscriptions,
            commands,
        })
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Handles one inbound frame.
    ///
    /// `subscribe`, `unsubscribe`, and `command` keys present in the same
    /// frame are handled in that order. Frames arriving after the connection
    /// left [`ConnectionState::Open`] are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError::Protocol`] for a malformed frame. The
    /// caller is expected to close the connection.
    pub fn handle_frame(&mut self, frame: &[u8]) -> Result<(), ConnectionError> {
        if self.state != ConnectionState::Open {
            return Ok(());
        }
        let message = InboundMessage::parse(frame)?;
        if let Some(path) = message.subscribe.as_deref() {
            self.subscriptions.subscribe(path);
        }
        if let Some(path) = message.unsubscribe.as_deref() {
            self.subscriptions.unsubscribe(path);
        }
        if let Some(request) = message.command {
            self.commands.dispatch(request);
        }
        Ok(())
    }

    /// Reads frames from `source` until the client disconnects or an error
    /// occurs, then closes the connection.
    ///
    /// # Errors
    ///
    /// Returns the [`ConnectionError`] that ended the connection; a clean
    /// disconnect returns `Ok(())`.
    pub fn run(mut self, source: &mut dyn FrameSource) -> Result<(), ConnectionError> {
        let outcome = self.pump(source);
        if let Err(error) = &outcome {
            info!(
                target: PROTOCOL_TARGET,
                error = %error,
                "closing connection after error"
            );
        }
        self.close();
        outcome
    }

    fn pump(&mut self, source: &mut dyn FrameSource) -> Result<(), ConnectionError> {
        while let Some(frame) = source.next_frame()? {
            self.handle_frame(&frame)?;
        }
        Ok(())
    }

    /// Releases every resource held by the connection.
    ///
    /// Subscriptions are released, queued frames are flushed, and running
    /// commands are detached; their results are discarded. Calling `close`
    /// again has no effect.
    pub fn close(&mut self) {
        if self.state != ConnectionState::Open {
            return;
        }
        self.state = ConnectionState::Closing;
        let released = self.subscriptions.unsubscribe_all();
        self.outbound.close();
        let abandoned = self.commands.tasks().abandon();
        self.state = ConnectionState::Closed;
        debug!(
            target: PROTOCOL_TARGET,
            released,
            abandoned,
            "connection closed"
        );
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.close();
    }
}
