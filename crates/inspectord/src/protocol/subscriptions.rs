//! Per-connection subscription bookkeeping.
//!
//! Entries are keyed by the path string exactly as the client sent it. Each
//! entry remembers the last summary sent so identical updates are
//! suppressed. A generation number ties store callbacks to the entry that
//! registered them, so callbacks from an earlier subscription of the same
//! path string are ignored after a resubscribe.
//!
//! The registry never holds its own lock while calling into the store; the
//! store may deliver the initial value synchronously from `subscribe`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use inspector_state::{
    CommandSet, Path, StateNode, StateStore, SubscriptionHandle, UpdateCallback, command_scope,
};
use tracing::{debug, trace, warn};

use super::PROTOCOL_TARGET;
use super::messages::ServerMessage;
use super::outbound::OutboundQueue;
use super::summary::{Summary, summarize};

const SCALAR_REASON: &str = "value is no longer a container";

struct Subscription {
    generation: u64,
    handle: Option<SubscriptionHandle>,
    last_sent: Option<Summary>,
}

struct RegistryInner {
    store: Arc<dyn StateStore>,
    outbound: OutboundQueue,
    announce_auto_unsubscribe: bool,
    entries: Mutex<HashMap<String, Subscription>>,
    generations: AtomicU64,
}

impl RegistryInner {
    fn lock(&self) -> MutexGuard<'_, HashMap<String, Subscription>> {
        self.entries
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
    }

    fn update(&self, path: &str, generation: u64, node: &StateNode, commands: &CommandSet) {
        if !node.is_container() {
            self.auto_unsubscribe(path, generation);
            return;
        }

        let summary = match summarize(path, node, commands) {
            Ok(summary) => summary,
            Err(error) => {
                warn!(
                    target: PROTOCOL_TARGET,
                    path,
                    error = %error,
                    "failed to summarise state update"
                );
                return;
            }
        };

        let mut entries = self.lock();
        let Some(entry) = entries
            .get_mut(path)
            .filter(|entry| entry.generation == generation)
        else {
            return;
        };
        if entry.last_sent.as_ref() == Some(&summary) {
            trace!(target: PROTOCOL_TARGET, path, "suppressed unchanged summary");
            return;
        }
        match ServerMessage::subscription(path, &summary).to_frame() {
            Ok(frame) => {
                self.outbound.enqueue(frame);
                entry.last_sent = Some(summary);
            }
            Err(error) => warn!(
                target: PROTOCOL_TARGET,
                path,
                error = %error,
                "failed to encode subscription update"
            ),
        }
    }

    fn auto_unsubscribe(&self, path: &str, generation: u64) {
        let removed = {
            let mut entries = self.lock();
            match entries.get(path) {
                Some(entry) if entry.generation == generation => entries.remove(path),
                _ => None,
            }
        };
        let Some(entry) = removed else {
            return;
        };
        debug!(
            target: PROTOCOL_TARGET,
            path,
            "node became a scalar; unsubscribing"
        );
        if self.announce_auto_unsubscribe {
            match ServerMessage::unsubscribed(path, SCALAR_REASON).to_frame() {
                Ok(frame) => {
                    self.outbound.enqueue(frame);
                }
                Err(error) => warn!(
                    target: PROTOCOL_TARGET,
                    path,
                    error = %error,
                    "failed to encode unsubscribe notice"
                ),
            }
        }
        release(entry);
    }
}

fn release(entry: Subscription) {
    if let Some(handle) = entry.handle {
        handle.unsubscribe();
    }
}

/// Subscriptions held by one connection.
pub(crate) struct SubscriptionRegistry {
    inner: Arc<RegistryInner>,
}

impl SubscriptionRegistry {
    pub(crate) fn new(
        store: Arc<dyn StateStore>,
        outbound: OutboundQueue,
        announce_auto_unsubscribe: bool,
    ) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                store,
                outbound,
                announce_auto_unsubscribe,
                entries: Mutex::new(HashMap::new()),
                generations: AtomicU64::new(0),
            }),
        }
    }

    /// Subscribes to `path_text` unless already subscribed.
    ///
    /// Unparsable paths are logged and ignored.
    pub(crate) fn subscribe(&self, path_text: &str) {
        let path = match Path::parse(path_text) {
            Ok(path) => path,
            Err(error) => {
                warn!(
                    target: PROTOCOL_TARGET,
                    path = path_text,
                    error = %error,
                    "ignoring subscription to invalid path"
                );
                return;
            }
        };

        let generation = self.inner.generations.fetch_add(1, Ordering::SeqCst);
        {
            let mut entries = self.inner.lock();
            if entries.contains_key(path_text) {
                return;
            }
            entries.insert(
                path_text.to_owned(),
                Subscription {
                    generation,
                    handle: None,
                    last_sent: None,
                },
            );
        }
        debug!(target: PROTOCOL_TARGET, path = path_text, "subscribing");

        let registry: Weak<RegistryInner> = Arc::downgrade(&self.inner);
        let key = path_text.to_owned();
        let callback: UpdateCallback = Arc::new(move |node, commands| {
            if let Some(registry) = registry.upgrade() {
                registry.update(&key, generation, node, commands);
            }
        });
        let handle = self
            .inner
            .store
            .subscribe(&path, &command_scope(&path), callback);

        let orphaned = {
            let mut entries = self.inner.lock();
            match entries
                .get_mut(path_text)
                .filter(|entry| entry.generation == generation)
            {
                Some(entry) => {
                    entry.handle = Some(handle);
                    None
                }
                None => Some(handle),
            }
        };
        // The entry went away during registration, e.g. an immediate
        // auto-unsubscribe.
        if let Some(handle) = orphaned {
            handle.unsubscribe();
        }
    }

    /// Drops the subscription for `path_text`, if any.
    ///
    /// Returns `true` when a subscription was removed.
    pub(crate) fn unsubscribe(&self, path_text: &str) -> bool {
        let removed = self.inner.lock().remove(path_text);
        match removed {
            Some(entry) => {
                debug!(target: PROTOCOL_TARGET, path = path_text, "unsubscribing");
                release(entry);
                true
            }
            None => false,
        }
    }

    /// Releases every subscription; returns how many there were.
    pub(crate) fn unsubscribe_all(&self) -> usize {
        let drained: Vec<Subscription> = self.inner.lock().drain().map(|(_, entry)| entry).collect();
        let count = drained.len();
        drained.into_iter().for_each(release);
        count
    }

    pub(crate) fn is_subscribed(&self, path_text: &str) -> bool {
        self.inner.lock().contains_key(path_text)
    }

    pub(crate) fn len(&self) -> usize {
        self.inner.lock().len()
    }
}

impl Drop for SubscriptionRegistry {
    fn drop(&mut self) {
        self.unsubscribe_all();
    }
}
