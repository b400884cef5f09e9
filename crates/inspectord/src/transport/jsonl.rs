//! Newline-delimited JSON framing.

use std::io::{self, Read, Write};

use tracing::debug;

use super::LISTENER_TARGET;
use crate::protocol::{ConnectionError, FrameSink, FrameSource};

const CHUNK_BYTES: usize = 4096;

/// Splits a byte stream into newline-terminated frames.
///
/// Blank lines are skipped. A final frame without a trailing newline is
/// still delivered when the peer closes the stream.
pub struct JsonlFrames<R> {
    reader: R,
    buffer: Vec<u8>,
    max_frame_bytes: usize,
    finished: bool,
}

impl<R: Read> JsonlFrames<R> {
    /// Reads frames of at most `max_frame_bytes` bytes from `reader`.
    pub fn new(reader: R, max_frame_bytes: usize) -> Self {
        Self {
            reader,
            buffer: Vec::new(),
            max_frame_bytes,
            finished: false,
        }
    }

    fn take_line(&mut self) -> Option<Vec<u8>> {
        let position = self.buffer.iter().position(|byte| *byte == b'\n')?;
        let mut line: Vec<u8> = self.buffer.drain(..=position).collect();
        line.pop();
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        Some(line)
    }

    fn enforce_frame_limit(&self, size: usize) -> io::Result<()> {
        if size > self.max_frame_bytes {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "frame exceeds maximum size of {} bytes",
                    self.max_frame_bytes
                ),
            ));
        }
        Ok(())
    }

    fn next_line(&mut self) -> io::Result<Option<Vec<u8>>> {
        let mut chunk = [0_u8; CHUNK_BYTES];
        loop {
            if let Some(line) = self.take_line() {
                self.enforce_frame_limit(line.len())?;
                return Ok(Some(line));
            }
            self.enforce_frame_limit(self.buffer.len())?;
            if self.finished {
                return Ok(None);
            }

            let read = read_chunk_with_retry(&mut self.reader, &mut chunk)?;
            if read == 0 {
                self.finished = true;
                if self.buffer.is_empty() {
                    return Ok(None);
                }
                return Ok(Some(std::mem::take(&mut self.buffer)));
            }
            self.buffer.extend_from_slice(&chunk[..read]);
        }
    }
}

impl<R: Read> FrameSource for JsonlFrames<R> {
    fn next_frame(&mut self) -> Result<Option<Vec<u8>>, ConnectionError> {
        loop {
            match self.next_line()? {
                Some(line) if line.iter().all(u8::is_ascii_whitespace) => {}
                other => return Ok(other),
            }
        }
    }
}

fn read_chunk_with_retry<R: Read>(reader: &mut R, chunk: &mut [u8]) -> io::Result<usize> {
    loop {
        match reader.read(chunk) {
            Ok(read) => return Ok(read),
            Err(error) if error.kind() == io::ErrorKind::Interrupted => {}
            Err(error) => return Err(error),
        }
    }
}

/// Writes each frame as one line and flushes it.
pub struct JsonlSink<W> {
    writer: W,
    on_close: Option<Box<dyn FnOnce(&mut W) + Send>>,
}

impl<W: Write + Send + 'static> JsonlSink<W> {
    /// Writes frames into `writer`.
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            on_close: None,
        }
    }

    /// Runs `on_close` against the writer once the last frame was sent.
    #[must_use]
    pub fn with_close(mut self, on_close: impl FnOnce(&mut W) + Send + 'static) -> Self {
        self.on_close = Some(Box::new(on_close));
        self
    }
}

impl<W: Write + Send + 'static> FrameSink for JsonlSink<W> {
    fn send_frame(&mut self, frame: &str) -> io::Result<()> {
        self.writer.write_all(frame.as_bytes())?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()
    }

    fn close(&mut self) {
        if let Err(error) = self.writer.flush() {
            debug!(
                target: LISTENER_TARGET,
                error = %error,
                "failed to flush connection on close"
            );
        }
        if let Some(on_close) = self.on_close.take() {
            on_close(&mut self.writer);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::io::Cursor;
    use std::sync::{Arc, Mutex};

    fn read_all(input: &[u8], limit: usize) -> Result<Vec<Vec<u8>>, ConnectionError> {
        let mut frames = JsonlFrames::new(Cursor::new(input.to_vec()), limit);
        let mut collected = Vec::new();
        while let Some(frame) = frames.next_frame()? {
            collected.push(frame);
        }
        Ok(collected)
    }

    #[rstest]
    #[case::single(b"{}\n".as_slice(), vec![b"{}".to_vec()])]
    #[case::crlf(b"{}\r\n[]\r\n".as_slice(), vec![b"{}".to_vec(), b"[]".to_vec()])]
    #[case::unterminated(b"{}\n{\"a\":1}".as_slice(), vec![b"{}".to_vec(), b"{\"a\":1}".to_vec()])]
    #[case::blank_lines(b"\n  \n{}\n\n".as_slice(), vec![b"{}".to_vec()])]
    #[case::empty(b"".as_slice(), Vec::new())]
    fn splits_lines(#[case] input: &[u8], #[case] expected: Vec<Vec<u8>>) {
        assert_eq!(read_all(input, 1024).expect("frames"), expected);
    }

    #[test]
    fn oversized_frames_are_transport_errors() {
        let input = format!("{}\n", "x".repeat(64));
        let error = read_all(input.as_bytes(), 16).expect_err("too large");
        assert!(matches!(error, ConnectionError::Transport { .. }));
    }

    #[test]
    fn oversized_unterminated_input_is_rejected_before_eof() {
        let input = "y".repeat(CHUNK_BYTES * 2);
        let error = read_all(input.as_bytes(), 128).expect_err("too large");
        assert!(!error.is_protocol());
    }

    #[derive(Clone, Default)]
    struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().expect("buffer lock").extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn sink_writes_one_line_per_frame_and_runs_close_hook() {
        let buffer = SharedBuffer::default();
        let closed = Arc::new(Mutex::new(false));
        let flag = Arc::clone(&closed);
        let mut sink = JsonlSink::new(buffer.clone()).with_close(move |_| {
            *flag.lock().expect("flag lock") = true;
        });
        sink.send_frame(r#"{"id":1,"result":2}"#).expect("send");
        sink.send_frame(r#"{"id":2,"result":3}"#).expect("send");
        sink.close();

        let written = String::from_utf8(buffer.0.lock().expect("buffer lock").clone()).expect("utf8");
        assert_eq!(written, "{\"id\":1,\"result\":2}\n{\"id\":2,\"result\":3}\n");
        assert!(*closed.lock().expect("flag lock"));
    }
}
