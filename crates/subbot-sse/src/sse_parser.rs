//! Line-oriented SSE frame parser.

use thiserror::Error;

/// A single completed SSE frame.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SseEvent {
    pub event_type: String,
    pub id: String,
    pub payload: Vec<u8>,
}

/// Errors produced while parsing SSE lines.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SseParseError {
    #[error("line didn't match id, event, or data: {line}")]
    MalformedLine { line: String },
}

/// Incremental parser that accumulates one `SseEvent` at a time.
#[derive(Debug, Default)]
pub struct SseEventParser {
    event: SseEvent,
    has_data: bool,
}

impl SseEventParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one line (without its terminator) into the parser.
    ///
    /// Lines are raw bytes; field names must be ASCII but values are taken
    /// as-is, so a stray non-UTF-8 byte in a payload never fails the frame.
    /// Returns `Ok(true)` when the line completes the current event; the
    /// caller must then call [`SseEventParser::take_event`].
    pub fn feed(&mut self, line: &[u8]) -> Result<bool, SseParseError> {
        if line.is_empty() {
            return Ok(true);
        }
        if line.starts_with(b":") {
            return Ok(false);
        }
        if let Some(rest) = line.strip_prefix(b"id:") {
            self.event.id = field_text(rest);
            return Ok(false);
        }
        if let Some(rest) = line.strip_prefix(b"event:") {
            self.event.event_type = field_text(rest);
            return Ok(false);
        }
        if let Some(rest) = line.strip_prefix(b"data:") {
            if self.has_data {
                self.event.payload.push(b'\n');
            }
            self.event.payload.extend_from_slice(rest.trim_ascii());
            self.has_data = true;
            return Ok(false);
        }

        Err(SseParseError::MalformedLine {
            line: String::from_utf8_lossy(line).into_owned(),
        })
    }

    /// Returns the accumulated event and resets the parser for the next one.
    pub fn take_event(&mut self) -> SseEvent {
        self.has_data = false;
        std::mem::take(&mut self.event)
    }

    #[cfg(test)]
    fn pending(&self) -> &SseEvent {
        &self.event
    }
}

fn field_text(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw.trim_ascii()).into_owned()
}
