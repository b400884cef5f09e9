//! In-process state store backed by an immutable tree.
//!
//! Every mutation swaps in a new root and then notifies the subscribers
//! whose node or command scope actually changed. Notifications are delivered
//! outside the state lock but under a delivery lock, so callbacks see updates
//! in commit order and may release subscriptions (their own included) while
//! running.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::trace;

use crate::command::{Command, CommandSet};
use crate::node::{StateNode, UpdateError};
use crate::path::Path;
use crate::store::{StateStore, SubscriptionHandle, UpdateCallback, command_scope};

const STORE_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::memory");

struct Subscriber {
    path: Path,
    scope: Path,
    callback: UpdateCallback,
}

struct Inner {
    root: StateNode,
    commands: BTreeMap<Path, BTreeMap<String, Arc<Command>>>,
    subscribers: BTreeMap<u64, Subscriber>,
    next_id: u64,
}

type Notification = (UpdateCallback, StateNode, CommandSet);

impl Inner {
    fn node_at(&self, path: &Path) -> StateNode {
        self.root.get(path).cloned().unwrap_or_else(StateNode::null)
    }

    fn commands_in(&self, scope: &Path) -> CommandSet {
        self.commands
            .get(scope)
            .map(|commands| {
                commands
                    .iter()
                    .map(|(name, command)| (name.clone(), command.descriptor()))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn notifications(&self, previous_root: &StateNode, touched_scope: Option<&Path>) -> Vec<Notification> {
        self.subscribers
            .values()
            .filter_map(|subscriber| {
                let before = previous_root.get(&subscriber.path);
                let after = self.root.get(&subscriber.path);
                let scope_changed = touched_scope == Some(&subscriber.scope);
                (before != after || scope_changed).then(|| {
                    (
                        Arc::clone(&subscriber.callback),
                        after.cloned().unwrap_or_else(StateNode::null),
                        self.commands_in(&subscriber.scope),
                    )
                })
            })
            .collect()
    }
}

struct Shared {
    state: Mutex<Inner>,
    delivery: Mutex<()>,
}

impl Shared {
    fn lock_state(&self) -> MutexGuard<'_, Inner> {
        self.state
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
    }

    fn lock_delivery(&self) -> MutexGuard<'_, ()> {
        self.delivery
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
    }
}

/// Thread-safe in-memory [`StateStore`].
///
/// Cloning yields another handle to the same store.
#[derive(Clone)]
pub struct MemoryStore {
    shared: Arc<Shared>,
}

impl fmt::Debug for MemoryStore {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.debug_struct("MemoryStore").finish_non_exhaustive()
    }
}

impl MemoryStore {
    /// Creates a store whose root is an empty mapping.
    #[must_use]
    pub fn new() -> Self {
        Self::with_root(StateNode::mapping(Vec::new()))
    }

    /// Creates a store with the given root.
    #[must_use]
    pub fn with_root(root: StateNode) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(Inner {
                    root,
                    commands: BTreeMap::new(),
                    subscribers: BTreeMap::new(),
                    next_id: 0,
                }),
                delivery: Mutex::new(()),
            }),
        }
    }

    /// Current root.
    #[must_use]
    pub fn snapshot(&self) -> StateNode {
        self.shared.lock_state().root.clone()
    }

    /// Node at `path`, if it exists.
    #[must_use]
    pub fn get(&self, path: &Path) -> Option<StateNode> {
        self.shared.lock_state().root.get(path).cloned()
    }

    /// Stores `node` at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`UpdateError`] when `path` crosses a sequence at an invalid
    /// position.
    pub fn set(&self, path: &Path, node: StateNode) -> Result<(), UpdateError> {
        self.modify(path, move |_| node).map(drop)
    }

    /// Removes the node at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`UpdateError`] when `path` crosses a sequence at an invalid
    /// position.
    pub fn remove(&self, path: &Path) -> Result<(), UpdateError> {
        self.commit(None, |root| root.without(path))
    }

    /// Atomically replaces the node at `path` with `update(current)`.
    ///
    /// A missing node is passed to `update` as `null`. Returns the stored
    /// node.
    ///
    /// # Errors
    ///
    /// Returns [`UpdateError`] when `path` crosses a sequence at an invalid
    /// position.
    pub fn modify<F>(&self, path: &Path, update: F) -> Result<StateNode, UpdateError>
    where
        F: FnOnce(&StateNode) -> StateNode,
    {
        let mut stored = StateNode::null();
        self.commit(None, |root| {
            let current = root.get(path).cloned().unwrap_or_else(StateNode::null);
            stored = update(&current);
            root.with_value_at(path, stored.clone())
        })?;
        Ok(stored)
    }

    /// Attaches `command` to the node at `path`, replacing any command of
    /// the same name.
    pub fn register_command(&self, path: &Path, command: Command) {
        let scope = command_scope(path);
        let command = Arc::new(command);
        self.commit_commands(&scope, |commands| {
            commands
                .entry(scope.clone())
                .or_default()
                .insert(command.name().to_owned(), command);
        });
    }

    /// Detaches the command `name` from the node at `path`.
    ///
    /// Returns `true` when a command was removed.
    pub fn unregister_command(&self, path: &Path, name: &str) -> bool {
        let scope = command_scope(path);
        let mut removed = false;
        self.commit_commands(&scope, |commands| {
            if let Some(entries) = commands.get_mut(&scope) {
                removed = entries.remove(name).is_some();
                if entries.is_empty() {
                    commands.remove(&scope);
                }
            }
        });
        removed
    }

    /// Number of live subscriptions.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.shared.lock_state().subscribers.len()
    }

    fn commit<F>(&self, touched_scope: Option<&Path>, mutate: F) -> Result<(), UpdateError>
    where
        F: FnOnce(&StateNode) -> Result<StateNode, UpdateError>,
    {
        let _delivery = self.shared.lock_delivery();
        let pending = {
            let mut inner = self.shared.lock_state();
            let previous = inner.root.clone();
            inner.root = mutate(&previous)?;
            inner.notifications(&previous, touched_scope)
        };
        deliver(pending);
        Ok(())
    }

    fn commit_commands<F>(&self, scope: &Path, mutate: F)
    where
        F: FnOnce(&mut BTreeMap<Path, BTreeMap<String, Arc<Command>>>),
    {
        let _delivery = self.shared.lock_delivery();
        let pending = {
            let mut inner = self.shared.lock_state();
            mutate(&mut inner.commands);
            let root = inner.root.clone();
            inner.notifications(&root, Some(scope))
        };
        deliver(pending);
    }
}

fn deliver(pending: Vec<Notification>) {
    if !pending.is_empty() {
        trace!(target: STORE_TARGET, count = pending.len(), "delivering state notifications");
    }
    for (callback, node, commands) in pending {
        callback(&node, &commands);
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl StateStore for MemoryStore {
    fn subscribe(
        &self,
        path: &Path,
        command_scope: &Path,
        callback: UpdateCallback,
    ) -> SubscriptionHandle {
        let _delivery = self.shared.lock_delivery();
        let (id, node, commands) = {
            let mut inner = self.shared.lock_state();
            let id = inner.next_id;
            inner.next_id += 1;
            inner.subscribers.insert(
                id,
                Subscriber {
                    path: path.clone(),
                    scope: command_scope.clone(),
                    callback: Arc::clone(&callback),
                },
            );
            (id, inner.node_at(path), inner.commands_in(command_scope))
        };
        callback(&node, &commands);

        let shared = Arc::downgrade(&self.shared);
        SubscriptionHandle::new(move || {
            if let Some(shared) = shared.upgrade() {
                shared.lock_state().subscribers.remove(&id);
            }
        })
    }

    fn command(&self, path: &Path, name: &str) -> Option<Arc<Command>> {
        self.shared
            .lock_state()
            .commands
            .get(&command_scope(path))
            .and_then(|commands| commands.get(name))
            .cloned()
    }
}
