//! Configuration loaders for success and failure paths.

use std::ffi::OsString;
use std::sync::Arc;

use camino::Utf8PathBuf;
use inspector_config::{Config, SocketEndpoint};
use ortho_config::{OrthoConfig, OrthoError};
use tempfile::TempDir;

use crate::bootstrap::ConfigLoader;

/// Loader placing the listen socket and state file in a temporary directory.
pub struct TestConfigLoader {
    dir: TempDir,
    state: Option<String>,
}

impl TestConfigLoader {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("temporary directory"),
            state: None,
        }
    }

    /// Seeds the store with `document` through a state file.
    pub fn with_state(mut self, document: &str) -> Self {
        self.state = Some(document.to_owned());
        self
    }

    fn path(&self, name: &str) -> Utf8PathBuf {
        Utf8PathBuf::from_path_buf(self.dir.path().join(name)).expect("utf8 temporary path")
    }

    /// The Unix socket the daemon will listen on.
    pub fn socket_path(&self) -> Utf8PathBuf {
        self.path("run/inspectord.sock")
    }
}

impl ConfigLoader for TestConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        let state_file = self.state.as_ref().map(|document| {
            let path = self.path("state.json");
            std::fs::write(&path, document).expect("write state file");
            path
        });
        Ok(Config {
            listen: SocketEndpoint::unix(self.socket_path()),
            state_file,
            ..Config::default()
        })
    }
}

/// Loader that fails by passing an invalid listen endpoint on the CLI.
pub struct FailingConfigLoader;

impl ConfigLoader for FailingConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        Config::load_from_iter([
            OsString::from("inspectord"),
            OsString::from("--listen"),
            OsString::from("carrier-pigeon://coop"),
        ])
    }
}
