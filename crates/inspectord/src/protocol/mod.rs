//! Inspector wire protocol.
//!
//! Clients subscribe to nodes of the state tree and receive one-level
//! summaries whenever a node changes, and they call commands attached to
//! nodes with correlated responses. The engine is transport agnostic: it
//! consumes frames from a [`FrameSource`] and writes frames to a
//! [`FrameSink`].

mod commands;
mod connection;
mod context;
mod errors;
mod frames;
mod handler;
mod messages;
mod outbound;
mod subscriptions;
mod summary;

pub(crate) const PROTOCOL_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::protocol");

pub use connection::{Connection, ConnectionState};
pub use context::{
    CONNECTION_COUNT_KEY, ConnectionCountPublisher, ConnectionHooks, InspectorContext, NoopHooks,
};
pub use errors::{ConnectionError, DispatchError};
pub use frames::{FrameSink, FrameSource};
pub use handler::InspectorConnectionHandler;
pub use summary::{Summary, summarize};
