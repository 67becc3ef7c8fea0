use crate::connection::{ClientId, ConnectionInfo, ConnectionRegistry, Generation};
use crate::error::{Error, Result, SinkErrorKind};
use crate::message::{Frame, Message as SseMessage, MessageScope};
use crate::sink::Sink;
use futures::future::join_all;
use log::*;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
// tokio intervals cannot have a zero period.
const MIN_HEARTBEAT_INTERVAL: Duration = Duration::from_millis(1);
/// Longest a single frame write may take before the peer is treated as failed.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// Result of a fan-out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Delivery {
    pub delivered: usize,
    /// Connections whose write failed; they have been removed from the registry.
    pub failed: usize,
}

/// Routes events to connected clients and runs their connection lifecycle.
pub struct Manager {
    pub(crate) registry: Arc<ConnectionRegistry>,
    pub(crate) heartbeat_interval: Duration,
    pub(crate) write_timeout: Duration,
    pub(crate) shutdown: CancellationToken,
}

impl Manager {
    pub fn new() -> Self {
        Self::with_heartbeat_interval(DEFAULT_HEARTBEAT_INTERVAL)
    }

    pub fn with_heartbeat_interval(heartbeat_interval: Duration) -> Self {
        Self {
            registry: Arc::new(ConnectionRegistry::new()),
            heartbeat_interval: heartbeat_interval.max(MIN_HEARTBEAT_INTERVAL),
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            shutdown: CancellationToken::new(),
        }
    }

    /// Bounds every frame write. A sink that does not accept a frame in time
    /// fails with `SinkErrorKind::TimedOut` and is removed.
    pub fn with_write_timeout(mut self, write_timeout: Duration) -> Self {
        self.write_timeout = write_timeout;
        self
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    pub fn heartbeat_interval(&self) -> Duration {
        self.heartbeat_interval
    }

    pub fn write_timeout(&self) -> Duration {
        self.write_timeout
    }

    pub fn connected_clients(&self) -> usize {
        self.registry.count()
    }

    /// Registers a sink directly, outside of `serve_connection`.
    pub fn register_connection(&self, client_id: ClientId, sink: Arc<dyn Sink>) -> Generation {
        self.register(client_id, sink).generation
    }

    pub(crate) fn register(&self, client_id: ClientId, sink: Arc<dyn Sink>) -> ConnectionInfo {
        let info = self.registry.insert(client_id.clone(), sink);
        info!(
            "SSE client {client_id} connected. Total: {}",
            self.registry.count()
        );
        info
    }

    /// Writes one frame, failing with `TimedOut` once the write timeout elapses.
    pub(crate) async fn write(&self, sink: &dyn Sink, frame: &Frame) -> Result<()> {
        match tokio::time::timeout(self.write_timeout, sink.send(frame)).await {
            Ok(result) => result,
            Err(_) => Err(Error::sink(SinkErrorKind::TimedOut)),
        }
    }

    pub fn unregister_connection(&self, client_id: &ClientId) {
        if self.registry.remove(client_id) {
            info!(
                "SSE client {client_id} removed. Total: {}",
                self.registry.count()
            );
        }
    }

    /// Serializes `payload` once and writes the frame to every connected client.
    ///
    /// Writes run concurrently against a snapshot of the registry, each bounded
    /// by the write timeout. A failing or stalled client is removed and does
    /// not hold up delivery to the others. Only a
    /// payload that cannot be serialized is reported as an error.
    pub async fn broadcast<T: Serialize + ?Sized>(
        &self,
        event_name: &str,
        payload: &T,
    ) -> Result<Delivery> {
        let frame = Frame::event(event_name, payload)?;
        Ok(self.broadcast_frame(&frame).await)
    }

    pub async fn broadcast_frame(&self, frame: &Frame) -> Delivery {
        let snapshot = self.registry.snapshot_all();
        let writes = snapshot.iter().map(|(client_id, info)| async move {
            match self.write(info.sink.as_ref(), frame).await {
                Ok(()) => None,
                Err(e) => {
                    warn!("Failed to send broadcast to SSE client {client_id}: {e}");
                    Some((client_id, info.generation))
                }
            }
        });
        let failures: Vec<_> = join_all(writes).await.into_iter().flatten().collect();

        for (client_id, generation) in &failures {
            self.drop_registration(client_id, *generation);
        }

        let delivery = Delivery {
            delivered: snapshot.len() - failures.len(),
            failed: failures.len(),
        };
        trace!("Broadcast delivered: {delivery:?}");
        delivery
    }

    /// Sends to a single client. Returns `Ok(false)` when the client is not
    /// connected or its write failed (it is then removed).
    pub async fn send_to_one<T: Serialize + ?Sized>(
        &self,
        client_id: &ClientId,
        event_name: &str,
        payload: &T,
    ) -> Result<bool> {
        let frame = Frame::event(event_name, payload)?;
        Ok(self.send_frame_to_one(client_id, &frame).await)
    }

    pub async fn send_frame_to_one(&self, client_id: &ClientId, frame: &Frame) -> bool {
        // The shard guard is released before the write.
        let Some(info) = self.registry.get(client_id) else {
            trace!("SSE client {client_id} not connected, skipping event");
            return false;
        };

        match self.write(info.sink.as_ref(), frame).await {
            Ok(()) => true,
            Err(e) => {
                warn!("Failed to send event to SSE client {client_id}: {e}");
                self.drop_registration(client_id, info.generation);
                false
            }
        }
    }

    /// Send a message based on its scope. Errors are logged, not returned.
    pub async fn send_message(&self, message: SseMessage) {
        let frame = match message.event.to_frame() {
            Ok(frame) => frame,
            Err(e) => {
                error!(
                    "Failed to serialize SSE event {}: {e}",
                    message.event.event_name
                );
                return;
            }
        };

        match message.scope {
            MessageScope::Client { client_id } => {
                self.send_frame_to_one(&ClientId::new(client_id), &frame)
                    .await;
            }
            MessageScope::Broadcast => {
                self.broadcast_frame(&frame).await;
            }
        }
    }

    /// Ends every active connection. Connections served afterwards close immediately.
    pub fn shutdown(&self) {
        info!(
            "Shutting down SSE manager with {} connected client(s)",
            self.registry.count()
        );
        self.shutdown.cancel();
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    pub(crate) fn drop_registration(&self, client_id: &ClientId, generation: Generation) {
        if self.registry.remove_registration(client_id, generation) {
            info!(
                "SSE client {client_id} removed. Total: {}",
                self.registry.count()
            );
        }
    }
}

impl Default for Manager {
    fn default() -> Self {
        Self::new()
    }
}
