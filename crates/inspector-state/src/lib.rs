//! State tree model shared by the inspector daemon and its embedders.
//!
//! The crate defines how nodes are addressed ([`Path`]), what a node looks
//! like ([`StateNode`]), how commands attached to nodes are declared and
//! invoked ([`Command`]), and the [`StateStore`] contract the protocol engine
//! observes. [`MemoryStore`] is the in-process implementation used by the
//! daemon binary and by tests.

mod command;
mod memory;
mod node;
mod path;
mod store;

pub use command::{
    BindError, BoundArguments, Command, CommandFailure, CommandInfo, CommandOutcome, CommandSet,
    Completion, Parameter, ParameterSchema, Responder, ResultPayload, SIGNATURE_KEY, ValueKind,
};
pub use memory::MemoryStore;
pub use node::{ContainerKind, StateNode, UpdateError};
pub use path::{Path, PathElement, PathError};
pub use store::{COMMAND_NAMESPACE, StateStore, SubscriptionHandle, UpdateCallback, command_scope};
