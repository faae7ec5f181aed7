//! Byte-level framing for the AT interface.
//!
//! The EC21 brackets every response line with CR/LF pairs and usually sends
//! an extra empty pair in front of the first line of a reply:
//!
//! ```text
//! \r\n\r\nOK\r\n
//! ```
//!
//! [`LineFramer`] turns that byte stream into discrete lines without the
//! delimiters. [`PromptMatcher`] handles the one place where the module
//! departs from line framing: the `> ` prompt sent before a raw payload.

use bytes::{BufMut, Bytes, BytesMut};

/// Carriage return.
pub const CR: u8 = 0x0d;

/// Line feed.
pub const LF: u8 = 0x0a;

/// Default maximum response line length.
pub const MAX_LINE_LENGTH: usize = 1024;

/// State of the [`LineFramer`] state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramerState {
    /// Waiting for the CR that opens a frame. Other bytes (echo, noise) are ignored.
    Idle,
    /// Saw the opening CR, waiting for LF.
    SawCr,
    /// Inside a frame, accumulating body bytes.
    Collecting,
    /// The line buffer is full; bytes are dropped until the closing CR.
    BufferFull,
    /// Saw the closing CR, waiting for the final LF.
    AwaitLf,
}

/// A byte-at-a-time framer for CR/LF delimited response lines.
///
/// Zero-length lines are never produced: an empty `\r\n\r\n` pair is treated
/// as the delimiter in front of a real line. Lines longer than the capacity
/// are truncated to the capacity, but the framer still waits for the closing
/// CR/LF before returning them.
#[derive(Debug)]
pub struct LineFramer {
    state: FramerState,
    buffer: BytesMut,
    capacity: usize,
}

impl Default for LineFramer {
    fn default() -> Self {
        Self::new(MAX_LINE_LENGTH)
    }
}

impl LineFramer {
    /// Create a framer that keeps at most `capacity` bytes per line.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        LineFramer {
            state: FramerState::Idle,
            buffer: BytesMut::with_capacity(capacity),
            capacity,
        }
    }

    /// Current state of the state machine.
    pub fn state(&self) -> FramerState {
        self.state
    }

    /// Maximum number of bytes kept per line.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of body bytes collected for the frame in progress.
    pub fn pending_len(&self) -> usize {
        self.buffer.len()
    }

    /// Forget any partially received frame.
    pub fn reset(&mut self) {
        self.state = FramerState::Idle;
        self.buffer.clear();
    }

    /// Feed one byte. Returns a complete line when the closing LF arrives.
    pub fn feed(&mut self, byte: u8) -> Option<Bytes> {
        match self.state {
            FramerState::Idle => {
                if byte == CR {
                    self.state = FramerState::SawCr;
                }
            }
            FramerState::SawCr => match byte {
                LF => self.state = FramerState::Collecting,
                CR => {}
                _ => {
                    self.buffer.clear();
                    self.state = FramerState::Idle;
                }
            },
            FramerState::Collecting => {
                if byte == CR {
                    self.state = if self.buffer.is_empty() {
                        FramerState::SawCr
                    } else {
                        FramerState::AwaitLf
                    };
                } else {
                    self.buffer.put_u8(byte);
                    if self.buffer.len() == self.capacity {
                        self.state = FramerState::BufferFull;
                    }
                }
            }
            FramerState::BufferFull => {
                if byte == CR {
                    self.state = FramerState::AwaitLf;
                }
            }
            FramerState::AwaitLf => {
                if byte == LF {
                    self.state = FramerState::Idle;
                    let line = self.buffer.split().freeze();
                    log::trace!("framed line: {:?}", String::from_utf8_lossy(&line));
                    return Some(line);
                }
            }
        }
        None
    }

    /// Feed a slice, collecting every line it completes.
    pub fn feed_slice(&mut self, data: &[u8]) -> Vec<Bytes> {
        data.iter().filter_map(|&byte| self.feed(byte)).collect()
    }

    /// Encode a command for transmission.
    ///
    /// Appends the single carriage return terminator.
    pub fn encode_command(cmd: &str) -> Vec<u8> {
        let mut buf = Vec::with_capacity(cmd.len() + 1);
        buf.extend_from_slice(cmd.as_bytes());
        buf.push(CR);
        buf
    }
}

/// Matches a short literal byte sequence in a raw, unframed byte stream.
#[derive(Debug, Clone)]
pub struct PromptMatcher {
    prompt: Vec<u8>,
    index: usize,
}

impl PromptMatcher {
    /// Create a matcher for `prompt`.
    pub fn new(prompt: &[u8]) -> Self {
        PromptMatcher {
            prompt: prompt.to_vec(),
            index: 0,
        }
    }

    /// The literal being matched.
    pub fn prompt(&self) -> &[u8] {
        &self.prompt
    }

    /// Whether the whole prompt has been seen. An empty prompt is always matched.
    pub fn is_matched(&self) -> bool {
        self.index == self.prompt.len()
    }

    /// Restart matching from the first byte.
    pub fn reset(&mut self) {
        self.index = 0;
    }

    /// Feed one byte. Returns `true` once the full prompt has been seen.
    pub fn feed(&mut self, byte: u8) -> bool {
        if self.is_matched() {
            return true;
        }
        if self.prompt[self.index] == byte {
            self.index += 1;
        } else if self.prompt[0] == byte {
            self.index = 1;
        } else {
            self.index = 0;
        }
        self.is_matched()
    }
}
