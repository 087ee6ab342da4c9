//! Byte-stream framing.
//!
//! Frames are terminated by `\r\n`. Raw reads are appended to an accumulator
//! and complete frames are popped from its front; whatever remains is always a
//! partial trailing frame, regardless of how the delimiter was split across
//! reads.

use std::io::{self, Read};

/// Maximum protocol line length including the delimiter (RFC 2812).
pub const MAX_LINE_LEN: usize = 512;

/// Accumulated bytes without a delimiter beyond which the buffer is discarded.
pub const MAX_BUFFERED: usize = 16 * MAX_LINE_LEN;

const DELIMITER: &[u8; 2] = b"\r\n";

/// Remove the first complete frame from `buffer` and decode it.
///
/// Returns `None` when `buffer` holds no delimiter; the buffer is then left
/// untouched. Invalid UTF-8 is replaced rather than rejected since servers
/// relay whatever encoding their clients use.
pub fn pop_line(buffer: &mut Vec<u8>) -> Option<String> {
    let pos = buffer.windows(DELIMITER.len()).position(|w| w == DELIMITER)?;
    let mut frame = &buffer[..pos];
    // A stray bare CR before the delimiter is not part of the message.
    while let [rest @ .., b'\r'] = frame {
        frame = rest;
    }
    let line = String::from_utf8_lossy(frame).into_owned();
    buffer.drain(..pos + DELIMITER.len());
    Some(line)
}

/// Reads frames from any byte source.
pub struct LineReader<R> {
    inner: R,
    buffer: Vec<u8>,
}

impl<R: Read> LineReader<R> {
    pub fn new(inner: R) -> Self {
        LineReader {
            inner,
            buffer: Vec::with_capacity(MAX_LINE_LEN),
        }
    }

    /// Block until one complete frame is available.
    ///
    /// Returns `Ok(None)` once the source reports end of stream. Bytes of an
    /// unterminated trailing frame are dropped at that point.
    pub fn next_line(&mut self) -> io::Result<Option<String>> {
        let mut chunk = [0u8; MAX_LINE_LEN];
        loop {
            if let Some(line) = pop_line(&mut self.buffer) {
                return Ok(Some(line));
            }
            if self.buffer.len() > MAX_BUFFERED {
                tracing::warn!(
                    "discarding {} buffered bytes without a line delimiter",
                    self.buffer.len()
                );
                self.buffer.clear();
            }
            let n = match self.inner.read(&mut chunk) {
                Ok(0) => return Ok(None),
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };
            self.buffer.extend_from_slice(&chunk[..n]);
        }
    }

    /// Bytes received but not yet part of a complete frame.
    pub fn pending(&self) -> &[u8] {
        &self.buffer
    }
}
