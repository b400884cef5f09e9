//! Daemon bootstrap orchestration.

use std::fs;
use std::io;
use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use inspector_config::{Config, SocketPreparationError};
use inspector_state::{MemoryStore, StateNode, StateStore};
use ortho_config::{OrthoConfig, OrthoError};
use thiserror::Error;

use crate::health::HealthReporter;
use crate::protocol::{ConnectionCountPublisher, InspectorContext};
use crate::telemetry::{self, TelemetryError, TelemetryHandle};

/// Source of the daemon configuration.
pub trait ConfigLoader: Send + Sync {
    /// Loads the configuration.
    ///
    /// # Errors
    ///
    /// Returns the loader error when no valid configuration can be built.
    fn load(&self) -> Result<Config, Arc<OrthoError>>;
}

/// Loader that reads defaults, files, environment, and CLI flags.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemConfigLoader;

impl ConfigLoader for SystemConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        Config::load()
    }
}

/// Loader that hands out a fixed configuration.
#[derive(Debug, Clone)]
pub struct StaticConfigLoader {
    config: Config,
}

impl StaticConfigLoader {
    /// Wraps an already resolved configuration.
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self { config }
    }
}

impl ConfigLoader for StaticConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        Ok(self.config.clone())
    }
}

/// Failures while seeding the store from a state file.
#[derive(Debug, Error)]
pub enum SeedError {
    /// The file could not be read.
    #[error("failed to read state file '{path}': {source}")]
    Read {
        /// Configured path.
        path: Utf8PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The file is not valid JSON.
    #[error("state file '{path}' is not valid JSON: {source}")]
    Parse {
        /// Configured path.
        path: Utf8PathBuf,
        /// Decoder error.
        #[source]
        source: serde_json::Error,
    },
    /// The document root is not an object.
    #[error("state file '{path}' must contain a JSON object")]
    NotAnObject {
        /// Configured path.
        path: Utf8PathBuf,
    },
}

/// Errors surfaced during bootstrap.
#[derive(Debug, Error)]
pub enum BootstrapError {
    /// Configuration failed to load.
    #[error("failed to load configuration: {source}")]
    Configuration {
        /// Underlying loader error.
        #[source]
        source: Arc<OrthoError>,
    },
    /// Telemetry initialisation failed.
    #[error("failed to initialise telemetry: {source}")]
    Telemetry {
        /// Underlying telemetry error.
        #[source]
        source: TelemetryError,
    },
    /// The socket directory could not be prepared.
    #[error("failed to prepare listen socket: {source}")]
    Socket {
        /// Filesystem error.
        #[source]
        source: SocketPreparationError,
    },
    /// The initial state could not be loaded.
    #[error("failed to seed inspector state: {source}")]
    Seed {
        /// Underlying seeding error.
        #[source]
        source: SeedError,
    },
}

/// A bootstrapped daemon, ready to accept connections.
pub struct Daemon {
    config: Config,
    store: MemoryStore,
    telemetry: TelemetryHandle,
    reporter: Arc<dyn HealthReporter>,
}

impl Daemon {
    /// Resolved configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The state store served to clients.
    #[must_use]
    pub fn store(&self) -> &MemoryStore {
        &self.store
    }

    /// Telemetry handle, mainly useful in tests.
    #[must_use]
    pub fn telemetry(&self) -> TelemetryHandle {
        self.telemetry
    }

    /// The health reporter used during bootstrap.
    #[must_use]
    pub fn reporter(&self) -> &Arc<dyn HealthReporter> {
        &self.reporter
    }

    /// Builds the context shared by every connection.
    ///
    /// The open connection count is published at the root of the store.
    #[must_use]
    pub fn context(&self) -> InspectorContext {
        let store: Arc<dyn StateStore> = Arc::new(self.store.clone());
        InspectorContext::new(store)
            .with_hooks(Arc::new(ConnectionCountPublisher::new(self.store.clone())))
            .with_announce_auto_unsubscribe(self.config.announce_auto_unsubscribe())
    }
}

/// Bootstraps the daemon with the supplied collaborators.
///
/// # Errors
///
/// Returns [`BootstrapError`] for the first step that fails; the reporter
/// sees the same error.
pub fn bootstrap_with(
    loader: &dyn ConfigLoader,
    reporter: Arc<dyn HealthReporter>,
) -> Result<Daemon, BootstrapError> {
    reporter.bootstrap_starting();
    match prepare(loader) {
        Ok((config, store, telemetry)) => {
            reporter.bootstrap_succeeded(&config);
            Ok(Daemon {
                config,
                store,
                telemetry,
                reporter,
            })
        }
        Err(error) => {
            reporter.bootstrap_failed(&error);
            Err(error)
        }
    }
}

fn prepare(
    loader: &dyn ConfigLoader,
) -> Result<(Config, MemoryStore, TelemetryHandle), BootstrapError> {
    let config = loader
        .load()
        .map_err(|source| BootstrapError::Configuration { source })?;
    let telemetry =
        telemetry::initialise(&config).map_err(|source| BootstrapError::Telemetry { source })?;
    config
        .listen()
        .prepare_filesystem()
        .map_err(|source| BootstrapError::Socket { source })?;
    let store = match config.state_file() {
        Some(path) => seed_store(path).map_err(|source| BootstrapError::Seed { source })?,
        None => MemoryStore::new(),
    };
    Ok((config, store, telemetry))
}

/// Builds a store whose root is the JSON object stored at `path`.
///
/// # Errors
///
/// Returns [`SeedError`] when the file is unreadable, not JSON, or not an
/// object.
pub fn seed_store(path: &Utf8Path) -> Result<MemoryStore, SeedError> {
    let text = fs::read_to_string(path).map_err(|source| SeedError::Read {
        path: path.to_owned(),
        source,
    })?;
    let document: serde_json::Value =
        serde_json::from_str(&text).map_err(|source| SeedError::Parse {
            path: path.to_owned(),
            source,
        })?;
    if !document.is_object() {
        return Err(SeedError::NotAnObject {
            path: path.to_owned(),
        });
    }
    Ok(MemoryStore::with_root(StateNode::from_json(document)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use inspector_state::Path;
    use rstest::rstest;
    use serde_json::json;
    use std::io::Write;

    fn write_state(contents: &str) -> (tempfile::TempDir, Utf8PathBuf) {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = Utf8PathBuf::from_path_buf(dir.path().join("state.json")).expect("utf8 path");
        let mut file = fs::File::create(&path).expect("create state file");
        file.write_all(contents.as_bytes()).expect("write state file");
        (dir, path)
    }

    #[test]
    fn seeding_loads_the_document_as_root() {
        let (_dir, path) = write_state(r#"{"a": {"b": [1, 2]}}"#);
        let store = seed_store(&path).expect("seed");
        let node = store
            .get(&Path::parse("/a/b").expect("path"))
            .expect("node");
        assert_eq!(node.to_json(), json!([1, 2]));
    }

    #[rstest]
    #[case::invalid_json("{not json", "not valid JSON")]
    #[case::array_root("[1, 2]", "must contain a JSON object")]
    fn seeding_rejects_bad_documents(#[case] contents: &str, #[case] message: &str) {
        let (_dir, path) = write_state(contents);
        let error = seed_store(&path).err().expect("seed should fail");
        assert!(error.to_string().contains(message), "{error}");
    }

    #[test]
    fn missing_state_files_are_read_errors() {
        let error = seed_store(Utf8Path::new("/nonexistent/inspector/state.json"))
            .err()
            .expect("seed should fail");
        assert!(matches!(error, SeedError::Read { .. }));
    }
}
