use crate::error::{Error, ErrorKind, Result};
use bytes::Bytes;
use serde::Serialize;
use serde_json::Value;

/// Name of the synthetic event every connection receives first.
pub const CONNECTED_EVENT: &str = "connected";

/// Text of the heartbeat comment frame.
pub const KEEPALIVE_COMMENT: &str = "keepalive";

/// Response headers that establish a streaming, non-buffered, long-lived response.
pub const STREAM_HEADERS: [(&str, &str); 3] = [
    ("content-type", "text/event-stream"),
    ("cache-control", "no-cache"),
    ("connection", "keep-alive"),
];

/// Trait for getting the SSE event type name
pub trait EventType {
    fn event_type(&self) -> String;
}

/// One encoded unit on the wire: either a named event
///
/// ```text
/// event: <name>\n
/// data: <json>\n
/// \n
/// ```
///
/// or a comment `: <text>\n\n`. Frames are cheap to clone and can be written
/// to any number of sinks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame(Bytes);

impl Frame {
    /// Serializes `payload` once and frames it under `event_name`.
    pub fn event<T: Serialize + ?Sized>(event_name: &str, payload: &T) -> Result<Self> {
        validate_event_name(event_name)?;
        // Compact JSON never contains a raw newline, so one data line is enough.
        let json = serde_json::to_string(payload)?;
        Ok(Self::encode(event_name, &json))
    }

    /// A comment frame. Line breaks in `text` are replaced by spaces.
    pub fn comment(text: &str) -> Self {
        let text = text.replace(['\r', '\n'], " ");
        Frame(Bytes::from(format!(": {text}\n\n")))
    }

    pub(crate) fn connected(client_id: &str) -> Result<Self> {
        #[derive(Serialize)]
        struct Connected<'a> {
            client_id: &'a str,
        }

        Self::event(CONNECTED_EVENT, &Connected { client_id })
    }

    fn encode(event_name: &str, json: &str) -> Self {
        Frame(Bytes::from(format!("event: {event_name}\ndata: {json}\n\n")))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Bytes {
        self.0
    }
}

fn validate_event_name(event_name: &str) -> Result<()> {
    if event_name.is_empty() || event_name.contains(['\r', '\n']) {
        return Err(Error {
            source: None,
            error_kind: ErrorKind::InvalidEventName,
        });
    }
    Ok(())
}

/// An event whose payload is already converted to JSON. Used for the
/// caller-supplied events sent right after `connected`.
#[derive(Debug, Clone, PartialEq)]
pub struct SseEvent {
    pub event_name: String,
    pub data: Value,
}

impl SseEvent {
    pub fn new<T: Serialize + ?Sized>(event_name: impl Into<String>, data: &T) -> Result<Self> {
        Ok(Self {
            event_name: event_name.into(),
            data: serde_json::to_value(data)?,
        })
    }

    pub fn to_frame(&self) -> Result<Frame> {
        Frame::event(&self.event_name, &self.data)
    }
}

#[derive(Debug, Clone)]
pub struct Message {
    pub event: SseEvent,
    pub scope: MessageScope,
}

#[derive(Debug, Clone)]
pub enum MessageScope {
    /// Send to one connected client
    Client { client_id: String },
    /// Send to all connected clients
    Broadcast,
}
