//! In-memory frame endpoints.

use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::protocol::{ConnectionError, FrameSink, FrameSource};

#[derive(Debug, Default)]
struct Recorded {
    frames: Vec<String>,
    closed: bool,
}

/// Sink that keeps every frame it receives.
///
/// Clones share the same recording, so a test keeps one clone while the
/// connection owns the other.
#[derive(Debug, Default, Clone)]
pub struct RecordingSink {
    recorded: Arc<Mutex<Recorded>>,
}

impl RecordingSink {
    fn lock(&self) -> MutexGuard<'_, Recorded> {
        self.recorded.lock().expect("recording sink mutex poisoned")
    }

    /// Frames written so far, in order.
    pub fn frames(&self) -> Vec<String> {
        self.lock().frames.clone()
    }

    /// Whether the sender closed the sink.
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }
}

impl FrameSink for RecordingSink {
    fn send_frame(&mut self, frame: &str) -> io::Result<()> {
        self.lock().frames.push(frame.to_owned());
        Ok(())
    }

    fn close(&mut self) {
        self.lock().closed = true;
    }
}

/// Source replaying a fixed list of frames, then reporting a disconnect.
pub struct ScriptedFrames {
    frames: VecDeque<Vec<u8>>,
}

impl ScriptedFrames {
    pub fn new<'a>(frames: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            frames: frames
                .into_iter()
                .map(|frame| frame.as_bytes().to_vec())
                .collect(),
        }
    }
}

impl FrameSource for ScriptedFrames {
    fn next_frame(&mut self) -> Result<Option<Vec<u8>>, ConnectionError> {
        Ok(self.frames.pop_front())
    }
}
