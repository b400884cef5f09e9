//! Errors raised while binding or running the socket listener.

use std::io;
use std::net::SocketAddr;

use thiserror::Error;

/// Listener failures.
#[derive(Debug, Error)]
pub enum ListenerError {
    /// Host name resolution failed.
    #[error("failed to resolve {host}:{port}: {source}")]
    Resolve {
        /// Requested host.
        host: String,
        /// Requested port.
        port: u16,
        /// Resolver error.
        #[source]
        source: io::Error,
    },
    /// Resolution succeeded without yielding an address.
    #[error("{host}:{port} did not resolve to any address")]
    ResolveEmpty {
        /// Requested host.
        host: String,
        /// Requested port.
        port: u16,
    },
    /// Binding the TCP socket failed.
    #[error("failed to bind tcp listener on {addr}: {source}")]
    BindTcp {
        /// Resolved address.
        addr: SocketAddr,
        /// Bind error.
        #[source]
        source: io::Error,
    },
    /// The listener could not be switched to non-blocking mode.
    #[error("failed to make listener non-blocking: {source}")]
    NonBlocking {
        /// Underlying error.
        #[source]
        source: io::Error,
    },
    /// The accept thread could not be started.
    #[error("failed to start accept thread: {source}")]
    Spawn {
        /// Underlying error.
        #[source]
        source: io::Error,
    },
    /// Unix sockets are not available on this platform.
    #[cfg(not(unix))]
    #[error("unix socket endpoint {endpoint} is unsupported on this platform")]
    UnsupportedUnix {
        /// Configured endpoint.
        endpoint: String,
    },
    /// Binding the Unix socket failed.
    #[cfg(unix)]
    #[error("failed to bind unix listener on {path}: {source}")]
    BindUnix {
        /// Socket path.
        path: String,
        /// Bind error.
        #[source]
        source: io::Error,
    },
    /// Another process is serving the socket.
    #[cfg(unix)]
    #[error("unix socket {path} is already served by another process")]
    UnixInUse {
        /// Socket path.
        path: String,
    },
    /// Something other than a socket occupies the path.
    #[cfg(unix)]
    #[error("{path} exists and is not a unix socket")]
    UnixNotSocket {
        /// Offending path.
        path: String,
    },
    /// The existing path could not be inspected.
    #[cfg(unix)]
    #[error("failed to inspect {path}: {source}")]
    UnixMetadata {
        /// Socket path.
        path: String,
        /// Metadata error.
        #[source]
        source: io::Error,
    },
    /// Probing the existing socket failed unexpectedly.
    #[cfg(unix)]
    #[error("failed to probe existing unix socket {path}: {source}")]
    UnixConnect {
        /// Socket path.
        path: String,
        /// Connect error.
        #[source]
        source: io::Error,
    },
    /// A stale socket file could not be removed.
    #[cfg(unix)]
    #[error("failed to remove stale unix socket {path}: {source}")]
    UnixCleanup {
        /// Socket path.
        path: String,
        /// Removal error.
        #[source]
        source: io::Error,
    },
    /// The accept thread panicked.
    #[error("listener thread panicked")]
    ThreadPanic,
}
