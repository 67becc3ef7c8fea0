//! Error types for the `sse` crate.
//!
//! Only serialization and framing errors reach callers of the broadcaster.
//! Sink errors are handled inside the crate by dropping the failing connection.

use std::error::Error as StdError;
use std::fmt;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug)]
pub struct Error {
    pub source: Option<Box<dyn StdError + Send + Sync>>,
    pub error_kind: ErrorKind,
}

#[derive(Debug, PartialEq)]
pub enum ErrorKind {
    /// The event payload could not be serialized to JSON. No frame was written.
    Serialization,
    /// The event name is empty or would break the line-based framing.
    InvalidEventName,
    Sink(SinkErrorKind),
}

/// Ways a write to a connected peer can fail.
#[derive(Debug, PartialEq)]
pub enum SinkErrorKind {
    /// The peer is gone (receiver dropped, stream closed).
    Closed,
    Io,
    /// The write did not complete within the sink's write timeout.
    TimedOut,
}

impl Error {
    pub fn sink(kind: SinkErrorKind) -> Self {
        Error {
            source: None,
            error_kind: ErrorKind::Sink(kind),
        }
    }

    pub fn is_sink_error(&self) -> bool {
        matches!(self.error_kind, ErrorKind::Sink(_))
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.error_kind {
            ErrorKind::Serialization => write!(f, "SSE payload serialization failed")?,
            ErrorKind::InvalidEventName => write!(f, "Invalid SSE event name")?,
            ErrorKind::Sink(kind) => write!(f, "SSE sink error: {kind:?}")?,
        }
        if let Some(source) = &self.source {
            write!(f, ": {source}")?;
        }
        Ok(())
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn StdError + 'static))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error {
            source: Some(Box::new(err)),
            error_kind: ErrorKind::Serialization,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        let kind = match err.kind() {
            std::io::ErrorKind::BrokenPipe
            | std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::ConnectionAborted
            | std::io::ErrorKind::UnexpectedEof => SinkErrorKind::Closed,
            std::io::ErrorKind::TimedOut => SinkErrorKind::TimedOut,
            _ => SinkErrorKind::Io,
        };
        Error {
            source: Some(Box::new(err)),
            error_kind: ErrorKind::Sink(kind),
        }
    }
}
