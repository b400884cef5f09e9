//! A store that only does what the test tells it to.

use std::sync::{Arc, Mutex, MutexGuard};

use inspector_state::{
    Command, CommandSet, Path, StateNode, StateStore, SubscriptionHandle, UpdateCallback,
};

struct Registration {
    path: Path,
    callback: UpdateCallback,
    active: bool,
}

#[derive(Default)]
struct Inner {
    registrations: Vec<Registration>,
    releases: Vec<Path>,
    commands: Vec<(Path, Arc<Command>)>,
}

/// [`StateStore`] driven by explicit pushes.
///
/// Subscribing records the callback without delivering anything; `push`
/// invokes every live callback registered for a path, in registration
/// order, with an empty command set.
#[derive(Default)]
pub struct ScriptedStore {
    inner: Arc<Mutex<Inner>>,
}

fn lock(inner: &Mutex<Inner>) -> MutexGuard<'_, Inner> {
    inner.lock().expect("scripted store mutex poisoned")
}

fn parse(path: &str) -> Path {
    Path::parse(path).expect("test paths must parse")
}

impl ScriptedStore {
    /// Makes `command` available at `path`.
    pub fn add_command(&self, path: &str, command: Command) {
        lock(&self.inner)
            .commands
            .push((parse(path), Arc::new(command)));
    }

    /// Delivers `node` to the live subscribers of `path`.
    pub fn push(&self, path: &str, node: &StateNode) {
        let path = parse(path);
        let callbacks: Vec<UpdateCallback> = lock(&self.inner)
            .registrations
            .iter()
            .filter(|registration| registration.active && registration.path == path)
            .map(|registration| Arc::clone(&registration.callback))
            .collect();
        let commands = CommandSet::new();
        for callback in callbacks {
            callback(node, &commands);
        }
    }

    /// How often `path` was subscribed.
    pub fn subscribe_calls(&self, path: &str) -> usize {
        let path = parse(path);
        lock(&self.inner)
            .registrations
            .iter()
            .filter(|registration| registration.path == path)
            .count()
    }

    /// How often a subscription of `path` was released.
    pub fn release_calls(&self, path: &str) -> usize {
        let path = parse(path);
        lock(&self.inner)
            .releases
            .iter()
            .filter(|released| **released == path)
            .count()
    }

    /// The most recent callback registered for `path`.
    pub fn callback_for(&self, path: &str) -> Option<UpdateCallback> {
        let path = parse(path);
        lock(&self.inner)
            .registrations
            .iter()
            .rev()
            .find(|registration| registration.path == path)
            .map(|registration| Arc::clone(&registration.callback))
    }
}

impl StateStore for ScriptedStore {
    fn subscribe(
        &self,
        path: &Path,
        _command_scope: &Path,
        callback: UpdateCallback,
    ) -> SubscriptionHandle {
        let index = {
            let mut inner = lock(&self.inner);
            inner.registrations.push(Registration {
                path: path.clone(),
                callback,
                active: true,
            });
            inner.registrations.len() - 1
        };
        let inner = Arc::clone(&self.inner);
        SubscriptionHandle::new(move || {
            let mut inner = lock(&inner);
            let released = {
                let registration = &mut inner.registrations[index];
                registration.active = false;
                registration.path.clone()
            };
            inner.releases.push(released);
        })
    }

    fn command(&self, path: &Path, name: &str) -> Option<Arc<Command>> {
        lock(&self.inner)
            .commands
            .iter()
            .rev()
            .find(|(candidate, command)| candidate == path && command.name() == name)
            .map(|(_, command)| Arc::clone(command))
    }
}
