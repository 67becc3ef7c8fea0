//! Connection lifecycle: `Connecting -> Active -> Closed`.
//!
//! - Connecting: write the preamble, register, send `connected` and the
//!   caller's initial events.
//! - Active: wait for cancellation, shutdown, eviction or peer loss; write a keepalive
//!   comment every heartbeat interval. Application events arrive through the
//!   broadcaster, never from this loop.
//! - Closed: deregister. Runs from a drop guard, so it also happens when the
//!   serving future is dropped or a write fails.

use crate::connection::{ClientId, Generation};
use crate::error::{Error, Result, SinkErrorKind};
use crate::manager::Manager;
use crate::message::{Frame, SseEvent, KEEPALIVE_COMMENT, STREAM_HEADERS};
use crate::sink::Sink;
use log::*;
use std::sync::Arc;
use tokio::time::{interval_at, timeout, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Why a connection reached `Closed`.
#[derive(Debug)]
pub enum CloseReason {
    /// The caller's cancellation token fired.
    Cancelled,
    /// The sink reported that the peer went away.
    Disconnected,
    /// `Manager::shutdown` was called.
    Shutdown,
    /// The registry dropped this registration: a newer connection took over
    /// the id, or a failed write during a broadcast removed it.
    Evicted,
    /// A write failed or timed out, or an initial event could not be encoded.
    Failed(Error),
}

/// Removes the registration when dropped.
struct Registration<'a> {
    manager: &'a Manager,
    client_id: ClientId,
    generation: Generation,
}

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        debug!("SSE client {} closing", self.client_id);
        self.manager
            .drop_registration(&self.client_id, self.generation);
    }
}

/// What a live connection waits on besides its own writes.
struct ActiveConnection<'a> {
    client_id: &'a ClientId,
    sink: &'a dyn Sink,
    cancel: &'a CancellationToken,
    evicted: &'a CancellationToken,
}

impl Manager {
    /// Serves one streaming client until it is cancelled, replaced,
    /// disconnects or fails.
    ///
    /// If `client_id` is already registered the old entry is replaced and the
    /// old connection closes with `CloseReason::Evicted`. Every write races the
    /// close signals, so a stalled peer never delays cancellation or shutdown.
    pub async fn serve_connection(
        &self,
        client_id: ClientId,
        sink: Arc<dyn Sink>,
        initial_events: Vec<SseEvent>,
        cancel: CancellationToken,
    ) -> CloseReason {
        let opened = tokio::select! {
            biased;
            _ = cancel.cancelled() => return CloseReason::Cancelled,
            _ = self.shutdown.cancelled() => return CloseReason::Shutdown,
            opened = timeout(self.write_timeout, sink.open(&STREAM_HEADERS)) => {
                opened.unwrap_or_else(|_| Err(Error::sink(SinkErrorKind::TimedOut)))
            }
        };
        if let Err(e) = opened {
            debug!("SSE client {client_id} failed before registration: {e}");
            return CloseReason::Failed(e);
        }

        let info = self.register(client_id.clone(), sink.clone());
        let registration = Registration {
            manager: self,
            generation: info.generation,
            client_id,
        };
        let connection = ActiveConnection {
            client_id: &registration.client_id,
            sink: sink.as_ref(),
            cancel: &cancel,
            evicted: &info.evicted,
        };

        let reason = match self.run_connection(&connection, &initial_events).await {
            Ok(reason) => reason,
            Err(e) => {
                debug!(
                    "SSE client {} disconnected with error: {e}",
                    registration.client_id
                );
                CloseReason::Failed(e)
            }
        };

        drop(registration);
        reason
    }

    async fn run_connection(
        &self,
        connection: &ActiveConnection<'_>,
        initial_events: &[SseEvent],
    ) -> Result<CloseReason> {
        let connected = Frame::connected(connection.client_id.as_str())?;
        if let Some(reason) = self.deliver(connection, &connected).await? {
            return Ok(reason);
        }
        for event in initial_events {
            if let Some(reason) = self.deliver(connection, &event.to_frame()?).await? {
                return Ok(reason);
            }
        }

        let keepalive = Frame::comment(KEEPALIVE_COMMENT);
        let mut heartbeat = interval_at(
            Instant::now() + self.heartbeat_interval,
            self.heartbeat_interval,
        );
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                reason = self.closing(connection) => return Ok(reason),
                _ = heartbeat.tick() => {
                    if let Some(reason) = self.deliver(connection, &keepalive).await? {
                        return Ok(reason);
                    }
                    trace!("Sent keepalive to SSE client {}", connection.client_id);
                }
            }
        }
    }

    /// Writes `frame` unless the connection ends first, in which case the
    /// reason is returned and the write is abandoned.
    async fn deliver(
        &self,
        connection: &ActiveConnection<'_>,
        frame: &Frame,
    ) -> Result<Option<CloseReason>> {
        tokio::select! {
            biased;
            reason = self.closing(connection) => Ok(Some(reason)),
            written = self.write(connection.sink, frame) => written.map(|()| None),
        }
    }

    /// Resolves once anything other than a write error ends the connection.
    async fn closing(&self, connection: &ActiveConnection<'_>) -> CloseReason {
        tokio::select! {
            biased;
            _ = connection.cancel.cancelled() => CloseReason::Cancelled,
            _ = self.shutdown.cancelled() => CloseReason::Shutdown,
            _ = connection.evicted.cancelled() => CloseReason::Evicted,
            _ = connection.sink.closed() => CloseReason::Disconnected,
        }
    }
}
