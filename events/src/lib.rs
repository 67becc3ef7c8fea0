//! Event system infrastructure for the realtime platform.
//!
//! This crate provides the event system that enables loose coupling between
//! the code that changes data and infrastructure concerns (like SSE notifications).
//!
//! # Architecture
//!
//! - **DomainEvent**: Enum representing all business events in the system
//! - **EventHandler**: Trait for implementing event handlers
//! - **EventPublisher**: Publishes events to registered handlers
//!
//! This crate has no dependencies on internal crates, avoiding circular
//! dependencies. Record data is carried as serialized JSON values.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

/// Who should receive the notification for an event.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Audience {
    /// Every connected client.
    #[default]
    All,
    /// Only the listed client ids. Ids that are not connected are skipped.
    Clients(Vec<String>),
}

/// Domain events that represent business-level changes in the system.
/// These events are emitted after the persistence layer commits a change.
///
/// Record data is carried as `serde_json::Value`; the event system only
/// transmits what it is given.
#[derive(Debug, Clone)]
pub enum DomainEvent {
    /// Emitted when a new record of `resource` (e.g. "item") is created.
    RecordCreated {
        resource: String,
        /// Complete serialized record, sent as the event payload.
        record: Value,
        audience: Audience,
    },
    /// Emitted when an existing record is modified.
    RecordUpdated {
        resource: String,
        record: Value,
        audience: Audience,
    },
    /// Emitted when a record is permanently removed.
    /// Only the id is carried since the record no longer exists.
    RecordDeleted {
        resource: String,
        record_id: Value,
        audience: Audience,
    },
}

impl DomainEvent {
    pub fn audience(&self) -> &Audience {
        match self {
            DomainEvent::RecordCreated { audience, .. }
            | DomainEvent::RecordUpdated { audience, .. }
            | DomainEvent::RecordDeleted { audience, .. } => audience,
        }
    }
}

/// Trait for handling domain events.
/// Implementations can perform side effects like sending notifications,
/// updating caches, logging, etc.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: &DomainEvent);
}

/// Publishes domain events to registered handlers.
/// Handlers are called sequentially in registration order.
#[derive(Clone)]
pub struct EventPublisher {
    handlers: Arc<Vec<Arc<dyn EventHandler>>>,
}

impl EventPublisher {
    pub fn new() -> Self {
        Self {
            handlers: Arc::new(Vec::new()),
        }
    }

    /// Register a new event handler.
    /// Note: This creates a new publisher instance with the additional handler.
    /// Store the returned publisher in your application state.
    pub fn with_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        let mut handlers = (*self.handlers).clone();
        handlers.push(handler);
        self.handlers = Arc::new(handlers);
        self
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }

    /// Publish an event to all registered handlers, one after another.
    pub async fn publish(&self, event: DomainEvent) {
        for handler in self.handlers.iter() {
            handler.handle(&event).await;
        }
    }
}

impl Default for EventPublisher {
    fn default() -> Self {
        Self::new()
    }
}
