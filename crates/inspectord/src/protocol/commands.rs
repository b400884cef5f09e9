//! Command validation and execution.
//!
//! Validation (path, lookup, argument binding) runs on the connection thread
//! and answers failures immediately. Only a fully bound invocation is handed
//! to a worker thread, which runs the command, waits for deferred results,
//! and enqueues the correlated response. Responses leave in completion
//! order.

use std::any::Any;
use std::backtrace::Backtrace;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use inspector_state::{BoundArguments, Command, Path, StateStore};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use super::PROTOCOL_TARGET;
use super::errors::DispatchError;
use super::messages::{CommandRequest, ServerMessage};
use super::outbound::OutboundQueue;

/// A validated command call waiting for a worker.
struct PendingInvocation {
    id: i64,
    path: Path,
    command: Arc<Command>,
    arguments: BoundArguments,
}

/// Worker threads owned by one connection.
#[derive(Default)]
pub(crate) struct TaskSet {
    workers: Vec<(i64, JoinHandle<()>)>,
}

impl TaskSet {
    fn submit(&mut self, id: i64, worker: JoinHandle<()>) {
        self.reap();
        self.workers.push((id, worker));
    }

    /// Forgets workers that have finished.
    pub(crate) fn reap(&mut self) {
        self.workers.retain(|(_, worker)| !worker.is_finished());
    }

    /// Number of workers still running.
    #[cfg(test)]
    pub(crate) fn in_flight(&mut self) -> usize {
        self.reap();
        self.workers.len()
    }

    /// Detaches every running worker and returns how many there were.
    ///
    /// Detached workers run to completion; their responses are dropped by
    /// the closed outbound queue.
    pub(crate) fn abandon(&mut self) -> usize {
        self.reap();
        let abandoned = self.workers.len();
        for (id, _) in self.workers.drain(..) {
            debug!(target: PROTOCOL_TARGET, id, "abandoning in-flight command");
        }
        abandoned
    }
}

/// Validates command requests and runs them on worker threads.
pub(crate) struct CommandDispatcher {
    store: Arc<dyn StateStore>,
    outbound: OutboundQueue,
    tasks: TaskSet,
}

impl CommandDispatcher {
    pub(crate) fn new(store: Arc<dyn StateStore>, outbound: OutboundQueue) -> Self {
        Self {
            store,
            outbound,
            tasks: TaskSet::default(),
        }
    }

    /// Handles one command request.
    ///
    /// Validation failures are answered at once and never start a worker.
    pub(crate) fn dispatch(&mut self, request: CommandRequest) {
        let id = request.id;
        match self.prepare(request) {
            Ok(invocation) => self.spawn(invocation),
            Err(error) => {
                debug!(
                    target: PROTOCOL_TARGET,
                    id,
                    error = %error,
                    "rejecting command"
                );
                self.respond(id, Err(error));
            }
        }
    }

    pub(crate) fn tasks(&mut self) -> &mut TaskSet {
        &mut self.tasks
    }

    fn prepare(&self, request: CommandRequest) -> Result<PendingInvocation, DispatchError> {
        let CommandRequest {
            id,
            name,
            path,
            args,
            kwargs,
        } = request;

        let path_text = path.ok_or_else(DispatchError::missing_path)?;
        let path = Path::parse(&path_text)
            .map_err(|error| DispatchError::invalid_path(&path_text, &error))?;
        let command = self
            .store
            .command(&path, &name)
            .ok_or_else(|| DispatchError::unknown_command(path.to_string(), &name))?;

        let args = match args {
            None => Vec::new(),
            Some(Value::Array(items)) => items,
            Some(_) => {
                return Err(DispatchError::argument_binding(
                    &name,
                    "'args' must be an array",
                ));
            }
        };
        let kwargs = match kwargs {
            None => Map::new(),
            Some(Value::Object(entries)) => entries,
            Some(_) => {
                return Err(DispatchError::argument_binding(
                    &name,
                    "'kwargs' must be an object",
                ));
            }
        };
        let arguments = command
            .bind(args, kwargs)
            .map_err(|error| DispatchError::from_bind_error(&name, &error))?;

        Ok(PendingInvocation {
            id,
            path,
            command,
            arguments,
        })
    }

    fn spawn(&mut self, invocation: PendingInvocation) {
        let id = invocation.id;
        debug!(
            target: PROTOCOL_TARGET,
            id,
            path = %invocation.path,
            command = invocation.command.name(),
            "starting command"
        );
        let outbound = self.outbound.clone();
        let spawned = thread::Builder::new()
            .name(format!("inspector-command-{id}"))
            .spawn(move || {
                let outcome = run_invocation(invocation);
                deliver(&outbound, id, outcome);
            });
        match spawned {
            Ok(worker) => self.tasks.submit(id, worker),
            Err(error) => self.respond(
                id,
                Err(DispatchError::invocation(
                    format!("failed to start command worker: {error}"),
                    None,
                )),
            ),
        }
    }

    fn respond(&self, id: i64, outcome: Result<Value, DispatchError>) {
        deliver(&self.outbound, id, outcome);
    }
}

fn run_invocation(invocation: PendingInvocation) -> Result<Value, DispatchError> {
    let PendingInvocation {
        command, arguments, ..
    } = invocation;
    let completed = panic::catch_unwind(AssertUnwindSafe(|| command.invoke(arguments).wait()));
    let payload = match completed {
        Ok(Ok(payload)) => payload,
        Ok(Err(failure)) => return Err(DispatchError::from(failure)),
        Err(panic) => {
            return Err(DispatchError::invocation(
                panic_message(panic.as_ref()),
                Some(Backtrace::force_capture().to_string()),
            ));
        }
    };
    payload
        .to_json()
        .map_err(|source| DispatchError::Serialization { source })
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    let detail = panic
        .downcast_ref::<&str>()
        .map(|message| (*message).to_owned())
        .or_else(|| panic.downcast_ref::<String>().cloned());
    match detail {
        Some(detail) => format!("command panicked: {detail}"),
        None => "command panicked".to_owned(),
    }
}

fn deliver(outbound: &OutboundQueue, id: i64, outcome: Result<Value, DispatchError>) {
    let frame = match ServerMessage::outcome(id, outcome).to_frame() {
        Ok(frame) => frame,
        Err(source) => {
            let error = DispatchError::Serialization { source };
            match ServerMessage::error(id, &error).to_frame() {
                Ok(frame) => frame,
                Err(error) => {
                    warn!(
                        target: PROTOCOL_TARGET,
                        id,
                        error = %error,
                        "failed to encode command response"
                    );
                    return;
                }
            }
        }
    };
    if !outbound.enqueue(frame) {
        debug!(
            target: PROTOCOL_TARGET,
            id,
            "connection closed; discarding command response"
        );
    }
}
