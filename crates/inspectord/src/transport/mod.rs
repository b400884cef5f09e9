//! Socket transport for the inspector daemon.
//!
//! The listener binds the configured endpoint, accepts connections on a
//! background thread, and hands each accepted stream to a
//! [`ConnectionHandler`] on its own thread. Frames travel as JSON lines.

mod errors;
mod handler;
mod jsonl;
mod listener;
#[cfg(test)]
mod test_utils;

pub use self::errors::ListenerError;
pub use self::handler::{ConnectionHandler, ConnectionStream};
pub use self::jsonl::{JsonlFrames, JsonlSink};
pub use self::listener::{ListenerHandle, SocketListener};
#[cfg(test)]
pub(crate) use self::test_utils::CountingHandler;

const LISTENER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::transport");
