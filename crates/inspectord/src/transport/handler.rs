//! Accepted streams and the handler seam.

use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream};

#[cfg(unix)]
use std::os::unix::net::UnixStream;

/// A stream accepted by the listener.
#[derive(Debug)]
pub enum ConnectionStream {
    /// TCP connection.
    Tcp(TcpStream),
    /// Unix domain socket connection.
    #[cfg(unix)]
    Unix(UnixStream),
}

impl ConnectionStream {
    /// Clones the underlying socket so reads and writes can happen on
    /// different threads.
    ///
    /// # Errors
    ///
    /// Returns the operating system error when the descriptor cannot be
    /// duplicated.
    pub fn try_clone(&self) -> io::Result<Self> {
        match self {
            Self::Tcp(stream) => stream.try_clone().map(Self::Tcp),
            #[cfg(unix)]
            Self::Unix(stream) => stream.try_clone().map(Self::Unix),
        }
    }

    /// Shuts down both halves of the connection.
    ///
    /// # Errors
    ///
    /// Returns the operating system error; `NotConnected` means the peer
    /// already went away.
    pub fn shutdown(&self) -> io::Result<()> {
        match self {
            Self::Tcp(stream) => stream.shutdown(Shutdown::Both),
            #[cfg(unix)]
            Self::Unix(stream) => stream.shutdown(Shutdown::Both),
        }
    }
}

impl Read for ConnectionStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Self::Tcp(stream) => stream.read(buf),
            #[cfg(unix)]
            Self::Unix(stream) => stream.read(buf),
        }
    }
}

impl Write for ConnectionStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Self::Tcp(stream) => stream.write(buf),
            #[cfg(unix)]
            Self::Unix(stream) => stream.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Self::Tcp(stream) => stream.flush(),
            #[cfg(unix)]
            Self::Unix(stream) => stream.flush(),
        }
    }
}

/// Serves accepted connections.
///
/// `handle` runs on a dedicated thread per connection and owns the stream
/// until it returns. Implementations should not panic.
pub trait ConnectionHandler: Send + Sync + 'static {
    /// Serves one connection to completion.
    fn handle(&self, stream: ConnectionStream);
}
