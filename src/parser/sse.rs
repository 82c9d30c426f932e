//! Server-Sent Events body decoder
//!
//! Turns a fully-received `text/event-stream` body into an ordered list of
//! typed events. Bodies that carry no `event:` field at all are treated as a
//! plain JSON document instead.

use crate::error::DecodeError;
use serde_json::Value;

/// Event types emitted by the generation endpoints
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseEventKind {
    MessageStart,
    ContentStart,
    ContentEnd,
    MessageEnd,
    /// Unrecognized event name, kept verbatim for diagnostics
    Unknown(String),
}

impl SseEventKind {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "message_start" => SseEventKind::MessageStart,
            "content_start" => SseEventKind::ContentStart,
            "content_end" => SseEventKind::ContentEnd,
            "message_end" => SseEventKind::MessageEnd,
            other => SseEventKind::Unknown(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            SseEventKind::MessageStart => "message_start",
            SseEventKind::ContentStart => "content_start",
            SseEventKind::ContentEnd => "content_end",
            SseEventKind::MessageEnd => "message_end",
            SseEventKind::Unknown(raw) => raw,
        }
    }
}

/// Payload of a `data:` line
#[derive(Debug, Clone, PartialEq)]
pub enum SseData {
    Json(Value),
    /// The line was not valid JSON; the trimmed text is kept as-is
    Raw(String),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SseEvent {
    /// `None` when the event consisted of a `data:` line only
    pub kind: Option<SseEventKind>,
    pub data: Option<SseData>,
}

impl SseEvent {
    pub fn is(&self, kind: &SseEventKind) -> bool {
        self.kind.as_ref() == Some(kind)
    }
}

/// Result of decoding a response body
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedBody {
    Events {
        events: Vec<SseEvent>,
        /// Lifecycle kinds announced by an `event:` line, emitted or not
        seen: Lifecycle,
    },
    /// The body was not an event stream and parsed as a single JSON document
    Json(Value),
}

impl DecodedBody {
    pub fn has_event(&self, kind: &SseEventKind) -> bool {
        match self {
            DecodedBody::Events { events, .. } => events.iter().any(|e| e.is(kind)),
            DecodedBody::Json(_) => false,
        }
    }

    /// Lifecycle flags are raised by the `event:` line itself, so a kind that
    /// never got its `data:` line still counts.
    pub fn lifecycle(&self) -> Lifecycle {
        match self {
            DecodedBody::Events { seen, .. } => *seen,
            DecodedBody::Json(_) => Lifecycle::default(),
        }
    }

    pub fn event_count(&self) -> usize {
        match self {
            DecodedBody::Events { events, .. } => events.len(),
            DecodedBody::Json(_) => 1,
        }
    }
}

/// Presence of the four lifecycle events in a decoded stream
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Lifecycle {
    pub message_start: bool,
    pub content_start: bool,
    pub content_end: bool,
    pub message_end: bool,
}

impl Lifecycle {
    fn mark(&mut self, kind: &SseEventKind) {
        match kind {
            SseEventKind::MessageStart => self.message_start = true,
            SseEventKind::ContentStart => self.content_start = true,
            SseEventKind::ContentEnd => self.content_end = true,
            SseEventKind::MessageEnd => self.message_end = true,
            SseEventKind::Unknown(_) => {}
        }
    }

    pub fn is_complete(&self) -> bool {
        self.message_start && self.content_start && self.content_end && self.message_end
    }

    pub fn missing(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if !self.message_start {
            missing.push("message_start");
        }
        if !self.content_start {
            missing.push("content_start");
        }
        if !self.content_end {
            missing.push("content_end");
        }
        if !self.message_end {
            missing.push("message_end");
        }
        missing
    }
}

/// Decode a response body.
///
/// Empty bodies decode to an empty event list. A body without any `event:`
/// substring must be valid JSON (whitespace alone is not), otherwise a
/// [`DecodeError::HardParse`] is returned.
pub fn decode(body: &str) -> Result<DecodedBody, DecodeError> {
    if body.is_empty() {
        return Ok(DecodedBody::Events {
            events: Vec::new(),
            seen: Lifecycle::default(),
        });
    }

    if !body.contains("event:") {
        let value: Value = serde_json::from_str(body)?;
        return Ok(DecodedBody::Json(value));
    }

    let (events, seen) = scan(body);
    Ok(DecodedBody::Events { events, seen })
}

/// Line-driven event decoding. Every `data:` line closes the current event;
/// an event still open when the body ends is dropped.
pub fn decode_events(body: &str) -> Vec<SseEvent> {
    scan(body).0
}

fn scan(body: &str) -> (Vec<SseEvent>, Lifecycle) {
    let mut events = Vec::new();
    let mut seen = Lifecycle::default();
    let mut current = SseEvent::default();

    for line in body.lines() {
        let line = line.trim();

        if let Some(rest) = line.strip_prefix("event:") {
            let kind = SseEventKind::parse(rest.trim());
            seen.mark(&kind);
            current.kind = Some(kind);
        } else if let Some(rest) = line.strip_prefix("data:") {
            let raw = rest.trim();
            let data = match serde_json::from_str::<Value>(raw) {
                Ok(value) => SseData::Json(value),
                Err(_) => SseData::Raw(raw.to_string()),
            };
            current.data = Some(data);
            events.push(std::mem::take(&mut current));
        }
    }

    (events, seen)
}
