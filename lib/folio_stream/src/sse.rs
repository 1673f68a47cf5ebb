//! Line-oriented Server-Sent Events decoding.
//!
//! Network reads are pushed into a [`LineDecoder`] as raw bytes and complete lines are popped
//! back out. A line is only decoded once its terminating `\n` has been buffered, so a UTF-8
//! sequence or a JSON token split across two reads is reassembled before anyone looks at it.
//!
//! Both sides of the relay use the same decoder: the relay server to re-frame the upstream
//! stream, and the [`crate::parser::StreamParser`] to read the relay's output.

use bytes::BytesMut;

/// Field name that introduces a data line.
pub const DATA_PREFIX: &str = "data:";

/// Payload that terminates a completion stream.
pub const DONE: &str = "[DONE]";

/// A single classified SSE line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Line {
    /// A `data:` line. The payload is trimmed of surrounding whitespace.
    Data(String),
    /// A `:` comment line, used by servers as a keep-alive.
    Comment(String),
    /// An empty line, the event dispatch marker.
    Blank,
    /// Any other field (`event:`, `id:`, `retry:`) or noise.
    Other(String),
}

impl Line {
    /// Classifies a line with its `\n` already removed. A trailing `\r` is tolerated.
    pub fn parse(line: &str) -> Self {
        let line = line.strip_suffix('\r').unwrap_or(line);

        if line.trim().is_empty() {
            return Line::Blank;
        }

        if let Some(comment) = line.strip_prefix(':') {
            return Line::Comment(comment.trim_start().to_string());
        }

        match line.strip_prefix(DATA_PREFIX) {
            Some(payload) => Line::Data(payload.trim().to_string()),
            None => Line::Other(line.to_string()),
        }
    }
}

/// A data frame as relayed between the upstream, the relay and the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A JSON payload (token delta or error object).
    Data(String),
    /// The `[DONE]` sentinel.
    Done,
}

impl Frame {
    pub fn from_payload(payload: String) -> Self {
        if payload == DONE {
            Frame::Done
        } else {
            Frame::Data(payload)
        }
    }

    pub fn payload(&self) -> &str {
        match self {
            Frame::Data(payload) => payload,
            Frame::Done => DONE,
        }
    }

    /// Wire encoding: `data: <payload>\n\n`.
    pub fn encode(&self) -> String {
        format!("data: {}\n\n", self.payload())
    }

    pub fn is_done(&self) -> bool {
        matches!(self, Frame::Done)
    }
}

/// Reassembles lines out of arbitrarily split network reads.
#[derive(Debug, Default)]
pub struct LineDecoder {
    buffer: BytesMut,
    /// Bytes at the front of `buffer` already known to hold no `\n`.
    scanned: usize,
}

impl LineDecoder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends the bytes of one network read.
    pub fn push(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Pops the next complete line, without its `\n` or `\r\n` terminator.
    ///
    /// Incomplete tail bytes stay buffered until the next [`LineDecoder::push`].
    pub fn next_line(&mut self) -> Option<String> {
        let Some(offset) = self.buffer[self.scanned..].iter().position(|byte| *byte == b'\n')
        else {
            self.scanned = self.buffer.len();
            return None;
        };

        let end = self.scanned + offset;
        self.scanned = 0;

        let mut line = self.buffer.split_to(end + 1);
        line.truncate(end);
        if line.last() == Some(&b'\r') {
            line.truncate(end - 1);
        }

        Some(String::from_utf8_lossy(&line).into_owned())
    }

    /// Pops the next data frame, discarding comments, blank lines and other fields.
    pub fn next_frame(&mut self) -> Option<Frame> {
        while let Some(line) = self.next_line() {
            match Line::parse(&line) {
                Line::Data(payload) => return Some(Frame::from_payload(payload)),
                other => log::trace!("skipping sse line: {:?}", other),
            }
        }

        None
    }

    /// Drains everything left once the byte stream has ended.
    ///
    /// Unterminated tail bytes are treated as a final line.
    pub fn finish(&mut self) -> Vec<Frame> {
        let mut frames: Vec<Frame> = std::iter::from_fn(|| self.next_frame()).collect();

        if !self.buffer.is_empty() {
            let rest = self.buffer.split();
            self.scanned = 0;
            if let Line::Data(payload) = Line::parse(&String::from_utf8_lossy(&rest)) {
                frames.push(Frame::from_payload(payload));
            }
        }

        frames
    }

    /// Number of bytes waiting for a line terminator.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }
}
