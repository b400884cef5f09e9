//! Commands attached to state tree nodes.
//!
//! A [`Command`] couples a name and a descriptive info record with a
//! statically declared [`ParameterSchema`] and a handler. Incoming positional
//! and keyword arguments are bound against the schema before the handler ever
//! runs, so an invocation with the wrong shape is rejected without side
//! effects.
//!
//! Handlers either finish immediately ([`Completion::Ready`]) or hand back a
//! receiver that a [`Responder`] resolves later ([`Completion::Deferred`]).

use std::collections::BTreeMap;
use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, Sender};

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use strum::{Display, IntoStaticStr};
use thiserror::Error;

/// Static metadata describing a command, e.g. display hints for a client.
pub type CommandInfo = Map<String, Value>;

/// Command descriptors available at a node, keyed by command name.
pub type CommandSet = BTreeMap<String, CommandInfo>;

/// Descriptor field holding the rendered call signature.
pub const SIGNATURE_KEY: &str = "signature";

/// JSON shape accepted by a parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum ValueKind {
    /// Any JSON value.
    Any,
    /// `true` or `false`.
    Bool,
    /// A number without a fractional part.
    Integer,
    /// Any number.
    Number,
    /// A string.
    String,
    /// An array.
    Array,
    /// An object.
    Object,
}

impl ValueKind {
    /// Returns `true` when `value` has this shape.
    #[must_use]
    pub fn accepts(self, value: &Value) -> bool {
        match self {
            Self::Any => true,
            Self::Bool => value.is_boolean(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Number => value.is_number(),
            Self::String => value.is_string(),
            Self::Array => value.is_array(),
            Self::Object => value.is_object(),
        }
    }
}

fn describe(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(number) if number.is_f64() => "number",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// One declared parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    name: String,
    kind: ValueKind,
    default: Option<Value>,
}

impl Parameter {
    /// Parameter name, used for keyword binding.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Accepted shape.
    #[must_use]
    pub fn kind(&self) -> ValueKind {
        self.kind
    }

    /// Returns `true` when no default is declared.
    #[must_use]
    pub fn is_required(&self) -> bool {
        self.default.is_none()
    }
}

/// Declared signature of a command.
///
/// Parameters bind positionally in declaration order and by name. Extra
/// positional or keyword arguments are rejected unless the schema opts in
/// with [`ParameterSchema::with_rest_args`] or
/// [`ParameterSchema::with_rest_kwargs`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterSchema {
    parameters: Vec<Parameter>,
    rest_args: bool,
    rest_kwargs: bool,
}

impl ParameterSchema {
    /// A schema accepting no arguments.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a required parameter.
    #[must_use]
    pub fn required(mut self, name: impl Into<String>, kind: ValueKind) -> Self {
        self.parameters.push(Parameter {
            name: name.into(),
            kind,
            default: None,
        });
        self
    }

    /// Appends an optional parameter with a default value.
    #[must_use]
    pub fn optional(mut self, name: impl Into<String>, kind: ValueKind, default: Value) -> Self {
        self.parameters.push(Parameter {
            name: name.into(),
            kind,
            default: Some(default),
        });
        self
    }

    /// Collects surplus positional arguments instead of rejecting them.
    #[must_use]
    pub const fn with_rest_args(mut self) -> Self {
        self.rest_args = true;
        self
    }

    /// Collects unknown keyword arguments instead of rejecting them.
    #[must_use]
    pub const fn with_rest_kwargs(mut self) -> Self {
        self.rest_kwargs = true;
        self
    }

    /// Declared parameters in order.
    #[must_use]
    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    /// Renders the call signature shown to clients, e.g. `(amount, step=1)`.
    ///
    /// Defaults render as JSON; collected surplus arguments appear as
    /// `*args` and `**kwargs`.
    #[must_use]
    pub fn signature(&self) -> String {
        let mut parts: Vec<String> = self
            .parameters
            .iter()
            .map(|parameter| match &parameter.default {
                Some(default) => format!("{}={default}", parameter.name),
                None => parameter.name.clone(),
            })
            .collect();
        if self.rest_args {
            parts.push("*args".to_owned());
        }
        if self.rest_kwargs {
            parts.push("**kwargs".to_owned());
        }
        format!("({})", parts.join(", "))
    }

    /// Binds call arguments to the declared parameters.
    ///
    /// # Errors
    ///
    /// Returns [`BindError`] for surplus positionals, unknown or duplicate
    /// keywords, missing required parameters, and shape mismatches.
    pub fn bind(
        &self,
        args: Vec<Value>,
        mut kwargs: Map<String, Value>,
    ) -> Result<BoundArguments, BindError> {
        let mut positional = args.into_iter();
        let mut values = Vec::with_capacity(self.parameters.len());
        let mut positional_names = Vec::new();

        for parameter in &self.parameters {
            match positional.next() {
                Some(value) => {
                    positional_names.push(parameter.name.as_str());
                    values.push((parameter, Some(value)));
                }
                None => values.push((parameter, None)),
            }
        }

        let rest: Vec<Value> = positional.collect();
        if !rest.is_empty() && !self.rest_args {
            return Err(BindError::TooManyPositional {
                expected: self.parameters.len(),
                given: self.parameters.len() + rest.len(),
            });
        }

        for name in positional_names {
            if kwargs.contains_key(name) {
                return Err(BindError::MultipleValues {
                    name: name.to_owned(),
                });
            }
        }

        let mut bound = Vec::with_capacity(values.len());
        for (parameter, value) in values {
            let value = value
                .or_else(|| kwargs.remove(&parameter.name))
                .or_else(|| parameter.default.clone())
                .ok_or_else(|| BindError::MissingArgument {
                    name: parameter.name.clone(),
                })?;
            if !parameter.kind.accepts(&value) {
                return Err(BindError::TypeMismatch {
                    name: parameter.name.clone(),
                    expected: parameter.kind,
                    found: describe(&value),
                });
            }
            bound.push((parameter.name.clone(), value));
        }

        if !self.rest_kwargs
            && let Some(name) = kwargs.keys().next()
        {
            return Err(BindError::UnexpectedKeyword { name: name.clone() });
        }

        Ok(BoundArguments {
            values: bound,
            rest,
            rest_kwargs: kwargs,
        })
    }
}

/// Reasons an argument list does not fit a [`ParameterSchema`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BindError {
    /// More positional arguments than declared parameters.
    #[error("takes {expected} positional arguments but {given} were given")]
    TooManyPositional {
        /// Declared parameter count.
        expected: usize,
        /// Supplied positional count.
        given: usize,
    },
    /// A keyword did not name a declared parameter.
    #[error("got an unexpected keyword argument '{name}'")]
    UnexpectedKeyword {
        /// Offending keyword.
        name: String,
    },
    /// A parameter was supplied both positionally and by keyword.
    #[error("got multiple values for argument '{name}'")]
    MultipleValues {
        /// Parameter name.
        name: String,
    },
    /// A required parameter was not supplied.
    #[error("missing required argument '{name}'")]
    MissingArgument {
        /// Parameter name.
        name: String,
    },
    /// A value had the wrong JSON shape.
    #[error("argument '{name}' must be {expected}, got {found}")]
    TypeMismatch {
        /// Parameter name.
        name: String,
        /// Declared shape.
        expected: ValueKind,
        /// Shape of the supplied value.
        found: &'static str,
    },
}

/// Arguments after a successful bind.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BoundArguments {
    values: Vec<(String, Value)>,
    rest: Vec<Value>,
    rest_kwargs: Map<String, Value>,
}

impl BoundArguments {
    /// Value bound to a declared parameter.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values
            .iter()
            .find(|(candidate, _)| candidate == name)
            .map(|(_, value)| value)
    }

    /// Deserialises a declared parameter into a concrete type.
    ///
    /// # Errors
    ///
    /// Returns a [`CommandFailure`] when the parameter is unknown or does not
    /// deserialise into `T`.
    pub fn value<T: DeserializeOwned>(&self, name: &str) -> Result<T, CommandFailure> {
        let value = self
            .get(name)
            .ok_or_else(|| CommandFailure::new(format!("no argument named '{name}'")))?;
        serde_json::from_value(value.clone()).map_err(|error| CommandFailure::from_error(&error))
    }

    /// Surplus positional arguments.
    #[must_use]
    pub fn rest(&self) -> &[Value] {
        &self.rest
    }

    /// Surplus keyword arguments.
    #[must_use]
    pub fn rest_kwargs(&self) -> &Map<String, Value> {
        &self.rest_kwargs
    }
}

/// Failure reported by a command handler.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct CommandFailure {
    message: String,
    trace: Option<String>,
}

impl CommandFailure {
    /// Builds a failure with a description and no trace.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            trace: None,
        }
    }

    /// Attaches a diagnostic trace.
    #[must_use]
    pub fn with_trace(mut self, trace: impl Into<String>) -> Self {
        self.trace = Some(trace.into());
        self
    }

    /// Describes an error, recording its source chain as the trace.
    #[must_use]
    pub fn from_error(error: &(dyn StdError + 'static)) -> Self {
        let mut trace = String::new();
        let mut source = error.source();
        while let Some(cause) = source {
            if !trace.is_empty() {
                trace.push('\n');
            }
            trace.push_str("caused by: ");
            trace.push_str(&cause.to_string());
            source = cause.source();
        }
        Self {
            message: error.to_string(),
            trace: (!trace.is_empty()).then_some(trace),
        }
    }

    /// Human-readable description.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Diagnostic trace, when one was captured.
    #[must_use]
    pub fn trace(&self) -> Option<&str> {
        self.trace.as_deref()
    }
}

/// A command result that can be rendered as JSON.
///
/// Rendering is deferred to the caller so a result that cannot be
/// serialised is reported separately from a failing command.
pub trait ResultPayload: Send {
    /// Serialises the result.
    ///
    /// # Errors
    ///
    /// Returns the serialiser error when the value has no JSON form.
    fn to_json(&self) -> Result<Value, serde_json::Error>;
}

impl<T> ResultPayload for T
where
    T: Serialize + Send,
{
    fn to_json(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }
}

/// Final outcome of one invocation.
pub type CommandOutcome = Result<Box<dyn ResultPayload>, CommandFailure>;

/// What a handler returns.
pub enum Completion {
    /// The command finished while being called.
    Ready(CommandOutcome),
    /// The command finishes later; the outcome arrives on the receiver.
    Deferred(Receiver<CommandOutcome>),
}

impl Completion {
    /// Blocks until the outcome is available.
    ///
    /// A deferred command whose [`Responder`] is dropped without answering
    /// yields a failure.
    #[must_use]
    pub fn wait(self) -> CommandOutcome {
        match self {
            Self::Ready(outcome) => outcome,
            Self::Deferred(receiver) => receiver.recv().unwrap_or_else(|_| {
                Err(CommandFailure::new(
                    "command finished without producing a result",
                ))
            }),
        }
    }
}

impl fmt::Debug for Completion {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ready(Ok(_)) => formatter.write_str("Ready(Ok(..))"),
            Self::Ready(Err(failure)) => write!(formatter, "Ready(Err({failure:?}))"),
            Self::Deferred(_) => formatter.write_str("Deferred(..)"),
        }
    }
}

/// Completes a deferred command.
#[derive(Debug)]
pub struct Responder {
    sender: Sender<CommandOutcome>,
}

impl Responder {
    /// Builds a responder and the matching deferred completion.
    #[must_use]
    pub fn channel() -> (Self, Completion) {
        let (sender, receiver) = mpsc::channel();
        (Self { sender }, Completion::Deferred(receiver))
    }

    /// Delivers a successful result.
    pub fn resolve<T>(self, value: T)
    where
        T: Serialize + Send + 'static,
    {
        // The receiver is gone when the connection closed; the result is moot.
        let _ = self.sender.send(Ok(Box::new(value)));
    }

    /// Delivers a failure.
    pub fn reject(self, failure: CommandFailure) {
        let _ = self.sender.send(Err(failure));
    }
}

type Handler = dyn Fn(BoundArguments) -> Completion + Send + Sync;

/// A callable command.
#[derive(Clone)]
pub struct Command {
    name: String,
    info: CommandInfo,
    schema: ParameterSchema,
    handler: Arc<Handler>,
}

impl Command {
    /// Builds a command whose handler returns its result directly.
    pub fn new<F, T>(name: impl Into<String>, schema: ParameterSchema, handler: F) -> Self
    where
        F: Fn(&BoundArguments) -> Result<T, CommandFailure> + Send + Sync + 'static,
        T: Serialize + Send + 'static,
    {
        Self::from_handler(name, schema, move |arguments: BoundArguments| {
            Completion::Ready(
                handler(&arguments).map(|value| Box::new(value) as Box<dyn ResultPayload>),
            )
        })
    }

    /// Builds a command whose handler answers through a [`Responder`].
    ///
    /// The handler may pass the responder to another thread and return at
    /// once.
    pub fn deferred<F>(name: impl Into<String>, schema: ParameterSchema, handler: F) -> Self
    where
        F: Fn(BoundArguments, Responder) + Send + Sync + 'static,
    {
        Self::from_handler(name, schema, move |arguments: BoundArguments| {
            let (responder, completion) = Responder::channel();
            handler(arguments, responder);
            completion
        })
    }

    /// Builds a command from a raw handler.
    pub fn from_handler<F>(name: impl Into<String>, schema: ParameterSchema, handler: F) -> Self
    where
        F: Fn(BoundArguments) -> Completion + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            info: CommandInfo::new(),
            schema,
            handler: Arc::new(handler),
        }
    }

    /// Attaches descriptive metadata.
    #[must_use]
    pub fn with_info(mut self, info: CommandInfo) -> Self {
        self.info = info;
        self
    }

    /// Command name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Descriptive metadata.
    #[must_use]
    pub fn info(&self) -> &CommandInfo {
        &self.info
    }

    /// Declared signature.
    #[must_use]
    pub fn schema(&self) -> &ParameterSchema {
        &self.schema
    }

    /// Metadata published to subscribers.
    ///
    /// Adds a `signature` entry rendered from the schema unless the info
    /// record already carries one.
    #[must_use]
    pub fn descriptor(&self) -> CommandInfo {
        let mut descriptor = self.info.clone();
        if !descriptor.contains_key(SIGNATURE_KEY) {
            descriptor.insert(
                SIGNATURE_KEY.to_owned(),
                Value::String(self.schema.signature()),
            );
        }
        descriptor
    }

    /// Binds raw arguments against the declared signature.
    ///
    /// # Errors
    ///
    /// See [`ParameterSchema::bind`].
    pub fn bind(&self, args: Vec<Value>, kwargs: Map<String, Value>) -> Result<BoundArguments, BindError> {
        self.schema.bind(args, kwargs)
    }

    /// Runs the handler with already bound arguments.
    #[must_use]
    pub fn invoke(&self, arguments: BoundArguments) -> Completion {
        (self.handler)(arguments)
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Command")
            .field("name", &self.name)
            .field("info", &self.info)
            .field("schema", &self.schema)
            .finish_non_exhaustive()
    }
}
