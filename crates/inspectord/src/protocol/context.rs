//! Shared state handed to every connection.

use std::sync::Arc;

use inspector_state::{MemoryStore, Path, StateNode, StateStore};
use serde_json::Value;
use tracing::warn;

use super::PROTOCOL_TARGET;

/// Key under the root that holds the number of open connections.
pub const CONNECTION_COUNT_KEY: &str = "connectionCount";

/// Lifecycle notifications emitted as connections open and close.
pub trait ConnectionHooks: Send + Sync {
    /// A connection finished its handshake.
    fn connection_opened(&self);

    /// A connection released its resources.
    fn connection_closed(&self);
}

/// Hooks that do nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHooks;

impl ConnectionHooks for NoopHooks {
    fn connection_opened(&self) {}

    fn connection_closed(&self) {}
}

/// Publishes the open connection count at `/connectionCount`.
#[derive(Debug, Clone)]
pub struct ConnectionCountPublisher {
    store: MemoryStore,
}

impl ConnectionCountPublisher {
    /// Publishes into `store`, starting the count at zero.
    #[must_use]
    pub fn new(store: MemoryStore) -> Self {
        let publisher = Self { store };
        publisher.adjust(|_| 0);
        publisher
    }

    fn adjust(&self, step: impl FnOnce(u64) -> u64) {
        let path = Path::root().child(CONNECTION_COUNT_KEY);
        let result = self.store.modify(&path, |current| {
            let count = match current {
                StateNode::Scalar(Value::Number(number)) => number.as_u64().unwrap_or(0),
                _ => 0,
            };
            StateNode::Scalar(Value::from(step(count)))
        });
        if let Err(error) = result {
            warn!(
                target: PROTOCOL_TARGET,
                error = %error,
                "failed to publish connection count"
            );
        }
    }
}

impl ConnectionHooks for ConnectionCountPublisher {
    fn connection_opened(&self) {
        self.adjust(|count| count.saturating_add(1));
    }

    fn connection_closed(&self) {
        self.adjust(|count| count.saturating_sub(1));
    }
}

/// Everything a connection needs from the process around it.
#[derive(Clone)]
pub struct InspectorContext {
    store: Arc<dyn StateStore>,
    hooks: Arc<dyn ConnectionHooks>,
    announce_auto_unsubscribe: bool,
}

impl InspectorContext {
    /// Creates a context observing `store`, with no hooks.
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self {
            store,
            hooks: Arc::new(NoopHooks),
            announce_auto_unsubscribe: false,
        }
    }

    /// Replaces the lifecycle hooks.
    #[must_use]
    pub fn with_hooks(mut self, hooks: Arc<dyn ConnectionHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    /// Chooses whether automatic unsubscribes are announced to the client.
    #[must_use]
    pub fn with_announce_auto_unsubscribe(mut self, announce: bool) -> Self {
        self.announce_auto_unsubscribe = announce;
        self
    }

    /// The observed state store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn StateStore> {
        &self.store
    }

    /// The lifecycle hooks.
    #[must_use]
    pub fn hooks(&self) -> &Arc<dyn ConnectionHooks> {
        &self.hooks
    }

    /// Whether automatic unsubscribes are announced.
    #[must_use]
    pub fn announce_auto_unsubscribe(&self) -> bool {
        self.announce_auto_unsubscribe
    }
}
