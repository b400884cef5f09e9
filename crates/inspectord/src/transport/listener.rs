//! Socket listener and accept loop.

use std::io;
use std::net::{SocketAddr, TcpListener, ToSocketAddrs};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use inspector_config::SocketEndpoint;
use tracing::{debug, info, warn};

use super::{ConnectionHandler, ConnectionStream, LISTENER_TARGET, ListenerError};

#[cfg(unix)]
use std::fs;
#[cfg(unix)]
use std::os::unix::fs::FileTypeExt;
#[cfg(unix)]
use std::os::unix::net::{UnixListener, UnixStream};
#[cfg(unix)]
use std::path::Path;

const ACCEPT_BACKOFF: Duration = Duration::from_millis(25);
const ERROR_BACKOFF: Duration = Duration::from_millis(150);

/// A bound, not yet accepting, listener.
#[derive(Debug)]
pub struct SocketListener {
    endpoint: SocketEndpoint,
    listener: ListenerKind,
}

#[derive(Debug)]
enum ListenerKind {
    Tcp(TcpListener),
    #[cfg(unix)]
    Unix(UnixListener),
}

impl SocketListener {
    /// Binds `endpoint`.
    ///
    /// A Unix socket file left behind by a dead process is removed first; a
    /// socket another process still serves is refused.
    ///
    /// # Errors
    ///
    /// Returns [`ListenerError`] when the endpoint cannot be resolved or
    /// bound.
    pub fn bind(endpoint: &SocketEndpoint) -> Result<Self, ListenerError> {
        let listener = match endpoint {
            SocketEndpoint::Tcp { host, port } => ListenerKind::Tcp(bind_tcp(host, *port)?),
            #[cfg(unix)]
            SocketEndpoint::Unix { path } => ListenerKind::Unix(bind_unix(path.as_std_path())?),
            #[cfg(not(unix))]
            SocketEndpoint::Unix { .. } => {
                return Err(ListenerError::UnsupportedUnix {
                    endpoint: endpoint.to_string(),
                });
            }
        };
        Ok(Self {
            endpoint: endpoint.clone(),
            listener,
        })
    }

    /// The endpoint as configured.
    #[must_use]
    pub fn endpoint(&self) -> &SocketEndpoint {
        &self.endpoint
    }

    /// Bound TCP address; `None` for Unix sockets.
    #[must_use]
    pub fn local_addr(&self) -> Option<SocketAddr> {
        match &self.listener {
            ListenerKind::Tcp(listener) => listener.local_addr().ok(),
            #[cfg(unix)]
            ListenerKind::Unix(_) => None,
        }
    }

    /// Starts accepting connections on a background thread.
    ///
    /// # Errors
    ///
    /// Returns [`ListenerError`] when the socket cannot be made
    /// non-blocking or the thread cannot be spawned.
    pub fn start(self, handler: Arc<dyn ConnectionHandler>) -> Result<ListenerHandle, ListenerError> {
        let nonblocking = match &self.listener {
            ListenerKind::Tcp(listener) => listener.set_nonblocking(true),
            #[cfg(unix)]
            ListenerKind::Unix(listener) => listener.set_nonblocking(true),
        };
        if let Err(source) = nonblocking {
            #[cfg(unix)]
            cleanup_unix_socket(&self.endpoint);
            return Err(ListenerError::NonBlocking { source });
        }

        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_flag = Arc::clone(&shutdown);
        let handle = thread::Builder::new()
            .name("inspector-accept".to_owned())
            .spawn(move || run_accept_loop(&self, &shutdown_flag, &handler))
            .map_err(|source| ListenerError::Spawn { source })?;
        Ok(ListenerHandle {
            shutdown,
            handle: Some(handle),
        })
    }
}

/// Controls the background accept thread.
#[derive(Debug)]
pub struct ListenerHandle {
    shutdown: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl ListenerHandle {
    /// Asks the accept loop to stop. Open connections are not interrupted.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    /// Waits for the accept loop to exit.
    ///
    /// # Errors
    ///
    /// Returns [`ListenerError::ThreadPanic`] when the accept thread
    /// panicked.
    pub fn join(mut self) -> Result<(), ListenerError> {
        match self.handle.take() {
            Some(handle) => handle.join().map_err(|_| ListenerError::ThreadPanic),
            None => Ok(()),
        }
    }
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }
}

fn run_accept_loop(
    listener: &SocketListener,
    shutdown: &AtomicBool,
    handler: &Arc<dyn ConnectionHandler>,
) {
    info!(
        target: LISTENER_TARGET,
        endpoint = %listener.endpoint,
        "accepting inspector connections"
    );
    let mut last_error = None::<io::ErrorKind>;
    while !shutdown.load(Ordering::SeqCst) {
        match accept_connection(listener) {
            Ok(Some(stream)) => {
                last_error = None;
                spawn_connection(stream, handler);
            }
            Ok(None) => thread::sleep(ACCEPT_BACKOFF),
            Err(error) => {
                let kind = error.kind();
                if last_error != Some(kind) {
                    warn!(
                        target: LISTENER_TARGET,
                        error = %error,
                        "failed to accept connection"
                    );
                }
                last_error = Some(kind);
                thread::sleep(ERROR_BACKOFF);
            }
        }
    }
    debug!(target: LISTENER_TARGET, "accept loop stopped");

    #[cfg(unix)]
    cleanup_unix_socket(&listener.endpoint);
}

fn spawn_connection(stream: ConnectionStream, handler: &Arc<dyn ConnectionHandler>) {
    let handler = Arc::clone(handler);
    let spawned = thread::Builder::new()
        .name("inspector-connection".to_owned())
        .spawn(move || handler.handle(stream));
    if let Err(error) = spawned {
        warn!(
            target: LISTENER_TARGET,
            error = %error,
            "failed to start connection thread"
        );
    }
}

fn accept_connection(listener: &SocketListener) -> io::Result<Option<ConnectionStream>> {
    let accepted = match &listener.listener {
        ListenerKind::Tcp(tcp) => tcp.accept().and_then(|(stream, _)| {
            stream.set_nonblocking(false)?;
            Ok(ConnectionStream::Tcp(stream))
        }),
        #[cfg(unix)]
        ListenerKind::Unix(unix) => unix.accept().and_then(|(stream, _)| {
            stream.set_nonblocking(false)?;
            Ok(ConnectionStream::Unix(stream))
        }),
    };
    match accepted {
        Ok(stream) => Ok(Some(stream)),
        Err(error) if error.kind() == io::ErrorKind::WouldBlock => Ok(None),
        Err(error) => Err(error),
    }
}

fn bind_tcp(host: &str, port: u16) -> Result<TcpListener, ListenerError> {
    let addr = (host, port)
        .to_socket_addrs()
        .map_err(|source| ListenerError::Resolve {
            host: host.to_owned(),
            port,
            source,
        })?
        .next()
        .ok_or_else(|| ListenerError::ResolveEmpty {
            host: host.to_owned(),
            port,
        })?;
    TcpListener::bind(addr).map_err(|source| ListenerError::BindTcp { addr, source })
}

#[cfg(unix)]
fn bind_unix(path: &Path) -> Result<UnixListener, ListenerError> {
    let display = || path.display().to_string();
    if path.exists() {
        let metadata = fs::symlink_metadata(path).map_err(|source| ListenerError::UnixMetadata {
            path: display(),
            source,
        })?;
        if !metadata.file_type().is_socket() {
            return Err(ListenerError::UnixNotSocket { path: display() });
        }
        match UnixStream::connect(path) {
            Ok(_) => return Err(ListenerError::UnixInUse { path: display() }),
            Err(error)
                if matches!(
                    error.kind(),
                    io::ErrorKind::ConnectionRefused | io::ErrorKind::NotFound
                ) =>
            {
                debug!(
                    target: LISTENER_TARGET,
                    path = %path.display(),
                    "removing stale unix socket"
                );
                fs::remove_file(path).map_err(|source| ListenerError::UnixCleanup {
                    path: display(),
                    source,
                })?;
            }
            Err(source) => {
                return Err(ListenerError::UnixConnect {
                    path: display(),
                    source,
                });
            }
        }
    }

    UnixListener::bind(path).map_err(|source| ListenerError::BindUnix {
        path: display(),
        source,
    })
}

#[cfg(unix)]
fn cleanup_unix_socket(endpoint: &SocketEndpoint) {
    let Some(path) = endpoint.unix_path() else {
        return;
    };
    if let Err(error) = fs::remove_file(path.as_std_path())
        && error.kind() != io::ErrorKind::NotFound
    {
        warn!(
            target: LISTENER_TARGET,
            error = %error,
            path = %path,
            "failed to remove unix socket file"
        );
    }
}
