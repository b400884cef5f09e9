//! Scenario world for the connection behaviour suite.

use std::cell::RefCell;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use inspector_state::{
    Command, CommandFailure, MemoryStore, ParameterSchema, Path, StateNode, StateStore, ValueKind,
};
use serde_json::Value;

use crate::protocol::{Connection, ConnectionError, InspectorContext};

use super::RecordingSink;

const FRAME_TIMEOUT: Duration = Duration::from_secs(5);

/// One client connection against an in-memory store.
pub struct ConnectionWorld {
    pub store: MemoryStore,
    sink: RecordingSink,
    announce: bool,
    connection: Option<Connection>,
    error: Option<ConnectionError>,
    consumed: usize,
}

impl ConnectionWorld {
    pub fn new() -> Self {
        Self {
            store: MemoryStore::new(),
            sink: RecordingSink::default(),
            announce: false,
            connection: None,
            error: None,
            consumed: 0,
        }
    }

    /// Replaces the store with one holding `document`.
    pub fn seed(&mut self, document: Value) {
        assert!(self.connection.is_none(), "seed before connecting");
        self.store = MemoryStore::with_root(StateNode::from_json(document));
    }

    pub fn announce_auto_unsubscribe(&mut self) {
        self.announce = true;
    }

    /// Attaches `reset`, which empties the mapping at `path`.
    pub fn add_reset(&self, path: &Path) {
        let store = self.store.clone();
        let target = path.clone();
        self.store.register_command(
            path,
            Command::new("reset", ParameterSchema::new(), move |_| {
                store
                    .set(&target, StateNode::mapping(Vec::new()))
                    .map_err(|error| CommandFailure::from_error(&error))
            }),
        );
    }

    /// Attaches `increment(amount)`, which adds to the integer at `path` and
    /// returns the new value.
    pub fn add_increment(&self, path: &Path) {
        let store = self.store.clone();
        let target = path.clone();
        self.store.register_command(
            path,
            Command::new(
                "increment",
                ParameterSchema::new().required("amount", ValueKind::Integer),
                move |arguments| {
                    let amount: i64 = arguments.value("amount")?;
                    let stored = store
                        .modify(&target, |current| {
                            let base = current.to_json().as_i64().unwrap_or(0);
                            StateNode::from(Value::from(base + amount))
                        })
                        .map_err(|error| CommandFailure::from_error(&error))?;
                    Ok(stored.to_json())
                },
            ),
        );
    }

    fn connection(&mut self) -> &mut Connection {
        if self.connection.is_none() {
            let store: Arc<dyn StateStore> = Arc::new(self.store.clone());
            let context =
                InspectorContext::new(store).with_announce_auto_unsubscribe(self.announce);
            let connection =
                Connection::open(&context, self.sink.clone()).expect("open connection");
            self.connection = Some(connection);
        }
        self.connection.as_mut().expect("connection was just opened")
    }

    /// Feeds one frame to the connection, closing it on a protocol error.
    pub fn send(&mut self, frame: &str) {
        if self.error.is_some() {
            return;
        }
        let connection = self.connection();
        if let Err(error) = connection.handle_frame(frame.as_bytes()) {
            connection.close();
            self.error = Some(error);
        }
    }

    pub fn close(&mut self) {
        if let Some(connection) = self.connection.as_mut() {
            connection.close();
        }
    }

    pub fn error(&self) -> Option<&ConnectionError> {
        self.error.as_ref()
    }

    pub fn is_closed(&self) -> bool {
        self.sink.is_closed()
    }

    fn parsed_frames(&self) -> Vec<Value> {
        self.sink
            .frames()
            .iter()
            .map(|frame| serde_json::from_str(frame).expect("frame is JSON"))
            .collect()
    }

    /// Waits for at least `count` frames and returns all frames seen.
    pub fn frames_at_least(&self, count: usize) -> Vec<Value> {
        let deadline = Instant::now() + FRAME_TIMEOUT;
        while self.sink.frames().len() < count && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        self.parsed_frames()
    }

    /// Returns the next frame not yet examined by a step.
    pub fn next_frame(&mut self) -> Value {
        let frames = self.frames_at_least(self.consumed + 1);
        let frame = frames
            .get(self.consumed)
            .cloned()
            .unwrap_or_else(|| panic!("expected frame #{}, got {frames:?}", self.consumed + 1));
        self.consumed += 1;
        frame
    }

    /// Frames sent so far, after letting in-flight work settle.
    pub fn settled_frames(&self) -> Vec<Value> {
        thread::sleep(Duration::from_millis(50));
        self.parsed_frames()
    }
}

/// Fresh world for each scenario.
pub fn world() -> RefCell<ConnectionWorld> {
    RefCell::new(ConnectionWorld::new())
}
