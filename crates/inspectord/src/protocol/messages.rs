//! Wire format of inspector messages.
//!
//! Every frame carries one JSON object. A client frame may combine
//! `subscribe`, `unsubscribe`, and `command` keys; unknown keys are ignored.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use serde_json::value::RawValue;
use tracing::debug;

use super::PROTOCOL_TARGET;
use super::errors::{ConnectionError, DispatchError};
use super::summary::Summary;

#[derive(Debug, Deserialize)]
struct RawInbound {
    #[serde(default)]
    subscribe: Option<String>,
    #[serde(default)]
    unsubscribe: Option<String>,
    #[serde(default)]
    command: Option<String>,
    #[serde(default)]
    id: Option<i64>,
    #[serde(default)]
    path: Option<String>,
    #[serde(default)]
    args: Option<Value>,
    #[serde(default)]
    kwargs: Option<Value>,
}

/// A decoded client frame.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct InboundMessage {
    pub(crate) subscribe: Option<String>,
    pub(crate) unsubscribe: Option<String>,
    pub(crate) command: Option<CommandRequest>,
}

/// The `command` part of a client frame.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct CommandRequest {
    pub(crate) id: i64,
    pub(crate) name: String,
    pub(crate) path: Option<String>,
    pub(crate) args: Option<Value>,
    pub(crate) kwargs: Option<Value>,
}

impl InboundMessage {
    /// Decodes one frame.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError::Protocol`] for frames that are not UTF-8,
    /// not a JSON object, have mistyped fields, or name a command without an
    /// integer `id`. A frame with none of the recognised keys decodes to an
    /// empty message.
    pub(crate) fn parse(frame: &[u8]) -> Result<Self, ConnectionError> {
        let text = std::str::from_utf8(frame)
            .map_err(|error| ConnectionError::protocol(format!("frame is not UTF-8: {error}")))?;
        let raw: RawInbound = serde_json::from_str(text.trim_end())
            .map_err(ConnectionError::from_json_error)?;

        let command = match raw.command {
            Some(name) => {
                let id = raw.id.ok_or_else(|| {
                    ConnectionError::protocol(format!("command '{name}' has no integer 'id'"))
                })?;
                Some(CommandRequest {
                    id,
                    name,
                    path: raw.path,
                    args: raw.args,
                    kwargs: raw.kwargs,
                })
            }
            None => None,
        };

        if raw.subscribe.is_none() && raw.unsubscribe.is_none() && command.is_none() {
            debug!(
                target: PROTOCOL_TARGET,
                "ignoring frame without 'subscribe', 'unsubscribe', or 'command'"
            );
        }

        Ok(Self {
            subscribe: raw.subscribe,
            unsubscribe: raw.unsubscribe,
            command,
        })
    }
}

/// Messages sent to the client.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub(crate) enum ServerMessage<'a> {
    /// Fresh summary for a subscribed path.
    Subscription {
        subscription: &'a str,
        state: &'a RawValue,
    },
    /// A subscription ended without the client asking.
    Unsubscribed {
        unsubscribed: &'a str,
        reason: &'a str,
    },
    /// Successful command result.
    Result { id: i64, result: Value },
    /// Failed command.
    Error {
        id: i64,
        error: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        tb: Option<String>,
    },
}

impl<'a> ServerMessage<'a> {
    pub(crate) fn subscription(path: &'a str, summary: &'a Summary) -> Self {
        Self::Subscription {
            subscription: path,
            state: summary.as_raw(),
        }
    }

    pub(crate) fn unsubscribed(path: &'a str, reason: &'a str) -> Self {
        Self::Unsubscribed {
            unsubscribed: path,
            reason,
        }
    }

    pub(crate) fn error(id: i64, error: &DispatchError) -> Self {
        Self::Error {
            id,
            error: error.to_string(),
            tb: error.trace().map(str::to_owned),
        }
    }

    pub(crate) fn outcome(id: i64, outcome: Result<Value, DispatchError>) -> Self {
        match outcome {
            Ok(result) => Self::Result { id, result },
            Err(error) => Self::error(id, &error),
        }
    }

    /// Serialises the message into a single frame.
    pub(crate) fn to_frame(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
