use std::fmt;
use std::fs::DirBuilder;
use std::io;
use std::str::FromStr;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

/// Address the daemon listens on.
///
/// Endpoints are written as URLs in every configuration layer:
/// `tcp://host:port` or `unix:///absolute/path`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(try_from = "String", into = "String")]
pub enum SocketEndpoint {
    /// Unix domain socket endpoint.
    Unix {
        /// Filesystem location of the socket.
        path: Utf8PathBuf,
    },
    /// TCP socket endpoint.
    Tcp {
        /// Host name or address.
        host: String,
        /// Port number.
        port: u16,
    },
}

impl SocketEndpoint {
    /// Builds a Unix domain socket endpoint.
    #[must_use]
    pub fn unix(path: impl Into<Utf8PathBuf>) -> Self {
        Self::Unix { path: path.into() }
    }

    /// Builds a TCP socket endpoint.
    #[must_use]
    pub fn tcp(host: impl Into<String>, port: u16) -> Self {
        Self::Tcp {
            host: host.into(),
            port,
        }
    }

    /// Socket path for Unix endpoints.
    #[must_use]
    pub fn unix_path(&self) -> Option<&Utf8Path> {
        match self {
            Self::Unix { path } => Some(path.as_ref()),
            Self::Tcp { .. } => None,
        }
    }

    /// Creates the parent directory of a Unix socket, owner-only.
    ///
    /// TCP endpoints need no preparation.
    ///
    /// # Errors
    ///
    /// Returns [`SocketPreparationError`] when the socket path has no parent
    /// or the directory cannot be created.
    pub fn prepare_filesystem(&self) -> Result<(), SocketPreparationError> {
        let Some(path) = self.unix_path() else {
            return Ok(());
        };
        let parent = path
            .parent()
            .filter(|parent| !parent.as_str().is_empty())
            .ok_or_else(|| SocketPreparationError::MissingParent {
                path: path.to_path_buf(),
            })?;

        let mut builder = DirBuilder::new();
        builder.recursive(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::DirBuilderExt;
            builder.mode(0o700);
        }

        if let Err(source) = builder.create(parent.as_std_path())
            && source.kind() != io::ErrorKind::AlreadyExists
        {
            return Err(SocketPreparationError::CreateDirectory {
                path: parent.to_path_buf(),
                source,
            });
        }
        Ok(())
    }
}

impl fmt::Display for SocketEndpoint {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unix { path } => write!(formatter, "unix://{path}"),
            Self::Tcp { host, port } => write!(formatter, "tcp://{host}:{port}"),
        }
    }
}

impl FromStr for SocketEndpoint {
    type Err = SocketParseError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let url = Url::parse(input)?;
        match url.scheme() {
            "unix" => {
                let path = url.path();
                if path.is_empty() || path == "/" {
                    return Err(SocketParseError::MissingUnixPath(input.to_owned()));
                }
                Ok(Self::unix(path))
            }
            "tcp" => {
                let host = url
                    .host_str()
                    .ok_or_else(|| SocketParseError::MissingHost(input.to_owned()))?;
                let port = url
                    .port()
                    .ok_or_else(|| SocketParseError::MissingPort(input.to_owned()))?;
                Ok(Self::tcp(host, port))
            }
            other => Err(SocketParseError::UnsupportedScheme(other.to_owned())),
        }
    }
}

impl TryFrom<String> for SocketEndpoint {
    type Error = SocketParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<SocketEndpoint> for String {
    fn from(endpoint: SocketEndpoint) -> Self {
        endpoint.to_string()
    }
}

/// Errors raised while parsing a [`SocketEndpoint`].
#[derive(Debug, Error)]
pub enum SocketParseError {
    /// Scheme was neither `tcp` nor `unix`.
    #[error("unsupported socket scheme '{0}'")]
    UnsupportedScheme(String),
    /// TCP endpoint without a host.
    #[error("missing TCP host in '{0}'")]
    MissingHost(String),
    /// TCP endpoint without a port.
    #[error("missing TCP port in '{0}'")]
    MissingPort(String),
    /// Unix endpoint without a path.
    #[error("missing Unix socket path in '{0}'")]
    MissingUnixPath(String),
    /// Text was not a URL.
    #[error(transparent)]
    Url(#[from] url::ParseError),
}

/// Errors raised while preparing a Unix socket directory.
#[derive(Debug, Error)]
pub enum SocketPreparationError {
    /// Socket path has no parent directory.
    #[error("socket path '{path}' has no parent directory")]
    MissingParent {
        /// Configured socket path.
        path: Utf8PathBuf,
    },
    /// Directory creation failed.
    #[error("failed to create socket directory '{path}': {source}")]
    CreateDirectory {
        /// Directory being created.
        path: Utf8PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use tempfile::TempDir;

    #[rstest]
    #[case("tcp://127.0.0.1:8000", SocketEndpoint::tcp("127.0.0.1", 8000))]
    #[case("tcp://localhost:9", SocketEndpoint::tcp("localhost", 9))]
    #[case("unix:///run/inspector/inspectord.sock", SocketEndpoint::unix("/run/inspector/inspectord.sock"))]
    fn parses_and_displays_endpoints(#[case] text: &str, #[case] expected: SocketEndpoint) {
        let endpoint: SocketEndpoint = text.parse().expect("endpoint should parse");
        assert_eq!(endpoint, expected);
        assert_eq!(endpoint.to_string(), text);
    }

    #[rstest]
    #[case("http://127.0.0.1:80")]
    #[case("tcp://127.0.0.1")]
    #[case("unix://")]
    #[case("not a url")]
    fn rejects_unusable_endpoints(#[case] text: &str) {
        assert!(text.parse::<SocketEndpoint>().is_err());
    }

    #[test]
    fn creates_missing_socket_directory() {
        let temp = TempDir::new().expect("temp dir");
        let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).expect("utf8 temp dir");
        let endpoint = SocketEndpoint::unix(root.join("nested/inspectord.sock"));
        endpoint.prepare_filesystem().expect("prepare");
        assert!(root.join("nested").is_dir());
        endpoint.prepare_filesystem().expect("prepare twice");
    }

    #[test]
    fn tcp_endpoints_need_no_preparation() {
        SocketEndpoint::tcp("127.0.0.1", 1)
            .prepare_filesystem()
            .expect("tcp endpoints always prepare");
    }
}
