//! Seams between the protocol engine and a concrete transport.

use std::io;

use super::errors::ConnectionError;

/// Source of inbound frames for one connection.
pub trait FrameSource {
    /// Blocks for the next frame.
    ///
    /// Returns `Ok(None)` once the peer has closed the connection.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError`] when the transport fails or produces a
    /// frame the transport itself rejects.
    fn next_frame(&mut self) -> Result<Option<Vec<u8>>, ConnectionError>;
}

/// Destination for outbound frames of one connection.
///
/// The sink is moved onto the connection's sender thread.
pub trait FrameSink: Send + 'static {
    /// Writes one complete frame.
    ///
    /// # Errors
    ///
    /// Returns the transport's I/O error; the connection stops sending after
    /// the first failure.
    fn send_frame(&mut self, frame: &str) -> io::Result<()>;

    /// Called once after the last frame has been written.
    fn close(&mut self) {}
}
