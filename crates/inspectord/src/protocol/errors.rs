//! Error types for the inspector protocol.
//!
//! [`DispatchError`] covers everything that can go wrong with a single
//! command and is always answered with a correlated error response.
//! [`ConnectionError`] covers the failures that end a connection.

use std::io;

use inspector_state::{BindError, CommandFailure, PathError};
use thiserror::Error;

/// Failures reported back to the client for one command invocation.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The command's target path could not be parsed.
    #[error("invalid path '{path}': {reason}")]
    InvalidPath {
        /// Path text as received.
        path: String,
        /// Why the path was rejected.
        reason: String,
    },

    /// No command with the requested name is attached to the path.
    #[error("unknown command '{name}' at '{path}'")]
    UnknownCommand {
        /// Canonical target path.
        path: String,
        /// Requested command name.
        name: String,
    },

    /// The supplied arguments do not fit the command's parameters.
    #[error("invalid arguments for command '{name}': {reason}")]
    ArgumentBinding {
        /// Command name.
        name: String,
        /// Binding failure description.
        reason: String,
    },

    /// The command ran and failed.
    #[error("{message}")]
    Invocation {
        /// Failure description.
        message: String,
        /// Diagnostic trace, when one is available.
        trace: Option<String>,
    },

    /// The command succeeded but its result has no JSON form.
    #[error("failed to serialise command result: {source}")]
    Serialization {
        /// Underlying serialiser error.
        #[source]
        source: serde_json::Error,
    },
}

impl DispatchError {
    /// Creates an invalid path error from a parse failure.
    pub fn invalid_path(path: impl Into<String>, source: &PathError) -> Self {
        Self::InvalidPath {
            path: path.into(),
            reason: source.to_string(),
        }
    }

    /// Creates an invalid path error for a command without a path.
    #[must_use]
    pub fn missing_path() -> Self {
        Self::InvalidPath {
            path: String::new(),
            reason: "command has no 'path' field".to_owned(),
        }
    }

    /// Creates an unknown command error.
    pub fn unknown_command(path: impl Into<String>, name: impl Into<String>) -> Self {
        Self::UnknownCommand {
            path: path.into(),
            name: name.into(),
        }
    }

    /// Creates an argument binding error with a free-form reason.
    pub fn argument_binding(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ArgumentBinding {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Creates an argument binding error from a schema mismatch.
    pub fn from_bind_error(name: impl Into<String>, source: &BindError) -> Self {
        Self::argument_binding(name, source.to_string())
    }

    /// Creates an invocation error.
    pub fn invocation(message: impl Into<String>, trace: Option<String>) -> Self {
        Self::Invocation {
            message: message.into(),
            trace,
        }
    }

    /// Diagnostic trace sent as `tb` alongside the error.
    #[must_use]
    pub fn trace(&self) -> Option<&str> {
        match self {
            Self::Invocation { trace, .. } => trace.as_deref(),
            _ => None,
        }
    }
}

impl From<CommandFailure> for DispatchError {
    fn from(failure: CommandFailure) -> Self {
        Self::Invocation {
            message: failure.message().to_owned(),
            trace: failure.trace().map(str::to_owned),
        }
    }
}

/// Failures that terminate a connection.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// The peer sent a frame that is not a valid protocol message.
    #[error("protocol error: {message}")]
    Protocol {
        /// Description of the offending frame.
        message: String,
        /// Decoder error, when the frame failed to parse.
        #[source]
        source: Option<serde_json::Error>,
    },

    /// Reading from or writing to the transport failed.
    #[error("transport error: {source}")]
    Transport {
        /// Underlying I/O error.
        #[from]
        source: io::Error,
    },
}

impl ConnectionError {
    /// Creates a protocol error with a custom message.
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a protocol error from a decoder failure.
    #[must_use]
    pub fn from_json_error(source: serde_json::Error) -> Self {
        Self::Protocol {
            message: source.to_string(),
            source: Some(source),
        }
    }

    /// Returns `true` for errors caused by the peer's messages.
    #[must_use]
    pub fn is_protocol(&self) -> bool {
        matches!(self, Self::Protocol { .. })
    }
}
