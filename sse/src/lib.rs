//! Server-Sent Events (SSE) infrastructure for real-time updates.
//!
//! This crate pushes server-generated events to many concurrently connected,
//! long-lived client streams.
//!
//! # Architecture
//!
//! - **Connection registry**: sharded `DashMap` of live connections keyed by a
//!   caller-supplied client id. A duplicate id replaces the older entry.
//! - **Sinks**: each connection owns one ordered output channel (`Sink`),
//!   either a channel drained by an HTTP body or any async byte writer.
//! - **Broadcaster**: `Manager::broadcast` serializes a payload once and writes
//!   the frame to a snapshot of the registry. A failing client is removed;
//!   the others still get the event.
//! - **Lifecycle**: `Manager::serve_connection` registers a client, sends the
//!   `connected` event and any initial events, keeps the stream alive with
//!   heartbeat comments and always deregisters on exit. Writes are bounded
//!   by a timeout and never delay cancellation, shutdown or replacement.
//! - **Ephemeral messages**: there is no replay. A client that is offline
//!   misses the event.
//!
//! # Wire format
//!
//! ```text
//! event: item_created
//! data: {"id":7}
//!
//! : keepalive
//!
//! ```
//!
//! # Example: Sending an event
//!
//! ```rust,ignore
//! app_state
//!     .sse_manager
//!     .broadcast("item_created", &json!({ "id": item.id }))
//!     .await?;
//! ```
//!
//! # Modules
//!
//! - `connection`: ConnectionRegistry and the ClientId type
//! - `sink`: Sink trait with channel and writer implementations
//! - `message`: frame encoding and event/scope definitions
//! - `manager`: broadcaster and targeted delivery
//! - `lifecycle`: per-connection state machine
//! - `domain_event_handler`: bridge from `events::DomainEvent` to SSE

pub mod connection;
pub mod domain_event_handler;
pub mod error;
pub mod lifecycle;
pub mod manager;
pub mod message;
pub mod sink;

pub use connection::ClientId;
pub use error::{Error, ErrorKind, SinkErrorKind};
pub use lifecycle::CloseReason;
pub use manager::{Delivery, Manager};
pub use message::{Frame, SseEvent};
pub use sink::{ChannelSink, EventStream, Sink, WriterSink};
