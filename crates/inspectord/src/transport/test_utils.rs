//! Handlers used by the listener tests.

use std::io::{Read, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::{ConnectionHandler, ConnectionStream};

/// Counts accepted connections and echoes whatever the client sends.
pub(crate) struct CountingHandler {
    count: Arc<AtomicUsize>,
}

impl CountingHandler {
    pub(crate) fn new() -> (Arc<AtomicUsize>, Arc<Self>) {
        let count = Arc::new(AtomicUsize::new(0));
        let handler = Arc::new(Self {
            count: Arc::clone(&count),
        });
        (count, handler)
    }
}

impl ConnectionHandler for CountingHandler {
    fn handle(&self, mut stream: ConnectionStream) {
        self.count.fetch_add(1, Ordering::SeqCst);
        let mut buffer = [0_u8; 256];
        while let Ok(read) = stream.read(&mut buffer) {
            if read == 0 || stream.write_all(&buffer[..read]).is_err() {
                break;
            }
        }
    }
}
