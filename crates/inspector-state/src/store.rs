//! Contract between the protocol engine and the state store it observes.

use std::fmt;
use std::sync::Arc;

use crate::command::{Command, CommandSet};
use crate::node::StateNode;
use crate::path::{Path, PathElement};

/// Path prefix under which a node's command descriptors are published.
pub const COMMAND_NAMESPACE: [&str; 2] = ["core", "commands"];

/// Command scope for the node addressed by `path`.
///
/// The scope is the command namespace followed by one element holding the
/// canonical text form of `path`.
#[must_use]
pub fn command_scope(path: &Path) -> Path {
    COMMAND_NAMESPACE
        .iter()
        .map(|segment| PathElement::key(*segment))
        .chain(std::iter::once(PathElement::Key(path.to_string())))
        .collect()
}

/// Callback invoked with the node at a subscribed path and the commands in
/// the subscription's scope.
///
/// Callbacks run on the thread that changed the store. They must return
/// quickly and must not mutate the store.
pub type UpdateCallback = Arc<dyn Fn(&StateNode, &CommandSet) + Send + Sync>;

/// Releases a store subscription.
///
/// Releasing happens at most once: either explicitly through
/// [`SubscriptionHandle::unsubscribe`] or when the handle is dropped.
pub struct SubscriptionHandle {
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl SubscriptionHandle {
    /// Wraps the store-specific release action.
    pub fn new(release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            release: Some(Box::new(release)),
        }
    }

    /// A handle with nothing to release.
    #[must_use]
    pub fn detached() -> Self {
        Self { release: None }
    }

    /// Stops further callbacks for this subscription.
    pub fn unsubscribe(mut self) {
        self.release_now();
    }

    fn release_now(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        self.release_now();
    }
}

impl fmt::Debug for SubscriptionHandle {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("SubscriptionHandle")
            .field("active", &self.release.is_some())
            .finish()
    }
}

/// Read and subscribe access to a hierarchical state store.
pub trait StateStore: Send + Sync {
    /// Registers `callback` for changes to the node at `path` and to the
    /// commands published under `command_scope`.
    ///
    /// Implementations may invoke the callback before returning to deliver
    /// the current value. Calls to one subscription's callback must not
    /// overlap and must follow the order in which changes were committed;
    /// subscribers compare each delivery with the previous one.
    fn subscribe(
        &self,
        path: &Path,
        command_scope: &Path,
        callback: UpdateCallback,
    ) -> SubscriptionHandle;

    /// Looks up the callable command `name` attached to the node at `path`.
    fn command(&self, path: &Path, name: &str) -> Option<Arc<Command>>;
}

impl<T> StateStore for Arc<T>
where
    T: StateStore + ?Sized,
{
    fn subscribe(
        &self,
        path: &Path,
        command_scope: &Path,
        callback: UpdateCallback,
    ) -> SubscriptionHandle {
        (**self).subscribe(path, command_scope, callback)
    }

    fn command(&self, path: &Path, name: &str) -> Option<Arc<Command>> {
        (**self).command(path, name)
    }
}
