use crate::connection::ClientId;
use crate::message::{EventType, Frame};
use crate::Manager;
use async_trait::async_trait;
use events::{Audience, DomainEvent, EventHandler};
use log::*;
use serde_json::{json, Value};
use std::sync::Arc;

impl EventType for DomainEvent {
    fn event_type(&self) -> String {
        match self {
            DomainEvent::RecordCreated { resource, .. } => format!("{resource}_created"),
            DomainEvent::RecordUpdated { resource, .. } => format!("{resource}_updated"),
            DomainEvent::RecordDeleted { resource, .. } => format!("{resource}_deleted"),
        }
    }
}

fn payload(event: &DomainEvent) -> Value {
    match event {
        DomainEvent::RecordCreated { record, .. } | DomainEvent::RecordUpdated { record, .. } => {
            record.clone()
        }
        DomainEvent::RecordDeleted { record_id, .. } => json!({ "id": record_id }),
    }
}

/// Handles domain events by converting them to SSE events and delivering
/// them to the event's audience.
///
/// The code emitting the event decides who is notified; this handler only
/// routes. Serialization problems are logged since there is no caller to
/// report them to.
pub struct SseDomainEventHandler {
    sse_manager: Arc<Manager>,
}

impl SseDomainEventHandler {
    pub fn new(sse_manager: Arc<Manager>) -> Self {
        Self { sse_manager }
    }
}

#[async_trait]
impl EventHandler for SseDomainEventHandler {
    async fn handle(&self, event: &DomainEvent) {
        let event_type = event.event_type();
        let frame = match Frame::event(&event_type, &payload(event)) {
            Ok(frame) => frame,
            Err(e) => {
                error!("Failed to encode SSE event {event_type}: {e}");
                return;
            }
        };

        match event.audience() {
            Audience::All => {
                let delivery = self.sse_manager.broadcast_frame(&frame).await;
                debug!(
                    "Broadcast {event_type} to {} client(s)",
                    delivery.delivered
                );
            }
            Audience::Clients(client_ids) => {
                for client_id in client_ids {
                    self.sse_manager
                        .send_frame_to_one(&ClientId::new(client_id.as_str()), &frame)
                        .await;
                }
                debug!(
                    "Sent {event_type} to {} client(s): {:?}",
                    client_ids.len(),
                    client_ids
                );
            }
        }
    }
}
