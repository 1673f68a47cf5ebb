use serde_json::Value;

use crate::openai::{error_message, ChatCompletionChunk};
use crate::sse::{Frame, LineDecoder};

/// What the relay's event stream means to a chat client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// Incremental assistant text.
    Delta(String),
    /// The `[DONE]` sentinel was observed.
    Done,
    /// An `{"error": ...}` frame. Terminal.
    Error(String),
}

impl StreamEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamEvent::Done | StreamEvent::Error(_))
    }
}

/// Per-request parsing state: the line buffer plus a payload held back because it ended
/// mid-JSON.
///
/// Nothing is emitted after a terminal event.
#[derive(Debug, Default)]
pub struct StreamParser {
    decoder: LineDecoder,
    pending: Option<String>,
    finished: bool,
}

impl StreamParser {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, bytes: &[u8]) {
        if !self.finished {
            self.decoder.push(bytes);
        }
    }

    pub fn next_event(&mut self) -> Option<StreamEvent> {
        while !self.finished {
            let frame = self.decoder.next_frame()?;
            if let Some(event) = self.handle(frame) {
                return Some(event);
            }
        }

        None
    }

    /// Flushes whatever is still buffered once the byte stream has closed.
    pub fn finish(&mut self) -> Vec<StreamEvent> {
        let mut events = Vec::new();

        for frame in self.decoder.finish() {
            if self.finished {
                break;
            }
            if let Some(event) = self.handle(frame) {
                events.push(event);
            }
        }

        if let Some(payload) = self.pending.take() {
            log::warn!("dropping truncated payload at end of stream: {}", payload);
        }

        self.finished = true;
        events
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    fn handle(&mut self, frame: Frame) -> Option<StreamEvent> {
        let payload = match frame {
            Frame::Done => {
                if let Some(payload) = self.pending.take() {
                    log::warn!("dropping truncated payload before [DONE]: {}", payload);
                }
                self.finished = true;
                return Some(StreamEvent::Done);
            }
            Frame::Data(payload) => match self.pending.take() {
                Some(head) => format!("{head}\n{payload}"),
                None => payload,
            },
        };

        if payload.is_empty() {
            return None;
        }

        let value: Value = match serde_json::from_str(&payload) {
            Ok(value) => value,
            Err(e) if e.is_eof() => {
                log::debug!("payload cut short, waiting for the next data line: {}", e);
                self.pending = Some(payload);
                return None;
            }
            Err(e) => {
                log::warn!("skipping unparsable payload ({}): {}", e, payload);
                return None;
            }
        };

        if let Some(error) = value.get("error").filter(|error| !error.is_null()) {
            self.finished = true;
            return Some(StreamEvent::Error(error_message(error)));
        }

        match serde_json::from_value::<ChatCompletionChunk>(value) {
            Ok(chunk) => chunk
                .content()
                .map(|content| StreamEvent::Delta(content.to_string())),
            Err(e) => {
                log::warn!("skipping payload with unexpected shape: {}", e);
                None
            }
        }
    }
}
