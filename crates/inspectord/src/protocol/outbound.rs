//! Ordered delivery of outbound frames.
//!
//! Producers (store callbacks, command workers, the coordinator) push fully
//! serialised frames into an unbounded queue; a single sender thread writes
//! them to the transport in FIFO order.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};

use tracing::{debug, warn};

use super::PROTOCOL_TARGET;
use super::errors::ConnectionError;
use super::frames::FrameSink;

enum Outbound {
    Frame(String),
    Close,
}

/// Cloneable producer side of a connection's outbound queue.
#[derive(Clone)]
pub(crate) struct OutboundQueue {
    sender: Sender<Outbound>,
    closed: Arc<AtomicBool>,
}

impl OutboundQueue {
    /// Queues a frame for delivery.
    ///
    /// Returns `false` when the channel is closed and the frame was dropped.
    pub(crate) fn enqueue(&self, frame: String) -> bool {
        if self.is_closed() {
            return false;
        }
        self.sender.send(Outbound::Frame(frame)).is_ok()
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Owner of the sender thread.
pub(crate) struct OutboundChannel {
    queue: OutboundQueue,
    worker: Option<JoinHandle<()>>,
}

impl OutboundChannel {
    /// Starts the sender thread writing into `sink`.
    pub(crate) fn start<S: FrameSink>(sink: S) -> Result<Self, ConnectionError> {
        let (sender, receiver) = mpsc::channel();
        let closed = Arc::new(AtomicBool::new(false));
        let worker_closed = Arc::clone(&closed);
        let worker = thread::Builder::new()
            .name("inspector-outbound".to_owned())
            .spawn(move || run_sender(&receiver, sink, &worker_closed))?;
        Ok(Self {
            queue: OutboundQueue { sender, closed },
            worker: Some(worker),
        })
    }

    pub(crate) fn queue(&self) -> OutboundQueue {
        self.queue.clone()
    }

    /// Flushes frames queued so far, stops the sender, and closes the sink.
    ///
    /// Later enqueues are discarded.
    pub(crate) fn close(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };
        self.queue.closed.store(true, Ordering::SeqCst);
        // Fails only when the sender already stopped after a write error.
        let _ = self.queue.sender.send(Outbound::Close);
        if worker.join().is_err() {
            warn!(target: PROTOCOL_TARGET, "outbound sender thread panicked");
        }
    }
}

impl Drop for OutboundChannel {
    fn drop(&mut self) {
        self.close();
    }
}

fn run_sender<S: FrameSink>(receiver: &Receiver<Outbound>, mut sink: S, closed: &AtomicBool) {
    for message in receiver {
        let Outbound::Frame(frame) = message else {
            break;
        };
        if let Err(error) = sink.send_frame(&frame) {
            warn!(
                target: PROTOCOL_TARGET,
                error = %error,
                "failed to write outbound frame"
            );
            closed.store(true, Ordering::SeqCst);
            break;
        }
    }
    debug!(target: PROTOCOL_TARGET, "outbound sender stopping");
    sink.close();
}
