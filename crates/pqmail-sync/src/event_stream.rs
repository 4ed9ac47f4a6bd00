//! Server-sent event framing.
//!
//! Incremental parser for `text/event-stream` bodies. Bytes arrive in chunks
//! split at arbitrary boundaries (including inside a CRLF pair or a UTF-8
//! sequence); the parser buffers partial lines and yields the data of each
//! completed event.
//!
//! Only the `data` field is used. Comments (`:` lines) and the `event`, `id`
//! and `retry` fields are ignored.

use crate::api::EmailEvent;
use crate::error::{Result, SyncError};

/// Incremental event-stream parser.
#[derive(Debug, Default)]
pub struct EventStreamParser {
    line: Vec<u8>,
    data: Option<String>,
    after_cr: bool,
    started: bool,
}

impl EventStreamParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and return the data of every event it completes.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut events = Vec::new();
        for &byte in chunk {
            match byte {
                b'\n' if self.after_cr => {
                    // second half of CRLF
                    self.after_cr = false;
                }
                b'\r' | b'\n' => {
                    self.after_cr = byte == b'\r';
                    let line = std::mem::take(&mut self.line);
                    self.process_line(&line, &mut events);
                }
                _ => {
                    self.after_cr = false;
                    self.line.push(byte);
                }
            }
        }
        events
    }

    fn process_line(&mut self, raw: &[u8], events: &mut Vec<String>) {
        let decoded = String::from_utf8_lossy(raw);
        let mut line: &str = &decoded;
        if !self.started {
            self.started = true;
            line = line.strip_prefix('\u{feff}').unwrap_or(line);
        }

        if line.is_empty() {
            if let Some(data) = self.data.take() {
                events.push(data);
            }
            return;
        }
        if line.starts_with(':') {
            return;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        if field == "data" {
            match &mut self.data {
                Some(data) => {
                    data.push('\n');
                    data.push_str(value);
                }
                None => self.data = Some(value.to_string()),
            }
        }
    }
}

/// Decode the data of one event as an [`EmailEvent`].
pub fn decode_event(data: &str) -> Result<EmailEvent> {
    serde_json::from_str(data).map_err(|e| SyncError::InvalidEvent(e.to_string()))
}
