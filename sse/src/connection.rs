use crate::sink::Sink;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use log::*;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Caller-supplied identifier of a streaming client, unique among live connections.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientId(String);

impl ClientId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Random id for callers that have none of their own.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ClientId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for ClientId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Identifies one particular registration of an id. A later registration
/// under the same id gets a new generation.
pub type Generation = u64;

/// Connection information stored in the registry.
#[derive(Clone)]
pub struct ConnectionInfo {
    pub sink: Arc<dyn Sink>,
    pub connected_at: DateTime<Utc>,
    pub generation: Generation,
    /// Cancelled once this registration leaves the registry, whether it was
    /// replaced under the same id or removed.
    pub evicted: CancellationToken,
}

impl fmt::Debug for ConnectionInfo {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("ConnectionInfo")
            .field("connected_at", &self.connected_at)
            .field("generation", &self.generation)
            .field("evicted", &self.evicted.is_cancelled())
            .finish_non_exhaustive()
    }
}

/// Live connections keyed by client id.
///
/// Backed by a sharded `DashMap`: operations on different ids rarely contend,
/// operations on the same id are serialized by its shard lock. Iteration only
/// happens through `snapshot_all`, which copies entries out so callers never
/// hold a shard lock while writing to a sink.
pub struct ConnectionRegistry {
    connections: DashMap<ClientId, ConnectionInfo>,
    next_generation: AtomicU64,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
            next_generation: AtomicU64::new(1),
        }
    }

    /// Stores `sink` under `id`, replacing any previous entry. The replaced
    /// registration's `evicted` token is cancelled so its connection can close.
    pub fn add(&self, id: ClientId, sink: Arc<dyn Sink>) -> Generation {
        self.insert(id, sink).generation
    }

    /// Like `add`, returning the stored entry.
    pub fn insert(&self, id: ClientId, sink: Arc<dyn Sink>) -> ConnectionInfo {
        let info = ConnectionInfo {
            sink,
            connected_at: Utc::now(),
            generation: self.next_generation.fetch_add(1, Ordering::Relaxed),
            evicted: CancellationToken::new(),
        };
        if let Some(previous) = self.connections.insert(id.clone(), info.clone()) {
            debug!(
                "SSE client {id} re-registered, replacing connection from {}",
                previous.connected_at
            );
            previous.evicted.cancel();
        }
        info
    }

    /// Removes the entry for `id` whichever registration it is. Idempotent.
    pub fn remove(&self, id: &ClientId) -> bool {
        match self.connections.remove(id) {
            Some((_, info)) => {
                info.evicted.cancel();
                true
            }
            None => false,
        }
    }

    /// Removes `id` only while it still holds the given registration.
    pub fn remove_registration(&self, id: &ClientId, generation: Generation) -> bool {
        match self
            .connections
            .remove_if(id, |_, info| info.generation == generation)
        {
            Some((_, info)) => {
                info.evicted.cancel();
                true
            }
            None => false,
        }
    }

    pub fn get(&self, id: &ClientId) -> Option<ConnectionInfo> {
        self.connections.get(id).map(|entry| entry.value().clone())
    }

    pub fn contains(&self, id: &ClientId) -> bool {
        self.connections.contains_key(id)
    }

    /// Point-in-time copy of all entries, safe to iterate while the registry changes.
    pub fn snapshot_all(&self) -> Vec<(ClientId, ConnectionInfo)> {
        self.connections
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    /// Number of registered connections. Advisory under concurrent mutation.
    pub fn count(&self) -> usize {
        self.connections.len()
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::ChannelSink;

    fn sink() -> Arc<dyn Sink> {
        let (sink, _stream) = ChannelSink::new();
        Arc::new(sink)
    }

    #[test]
    fn test_add_remove_and_count() {
        let registry = ConnectionRegistry::new();
        registry.add("a".into(), sink());
        registry.add("b".into(), sink());
        assert_eq!(registry.count(), 2);
        assert!(registry.contains(&"a".into()));

        assert!(registry.remove(&"a".into()));
        assert!(!registry.remove(&"a".into()));
        assert_eq!(registry.count(), 1);
    }

    #[test]
    fn test_duplicate_id_replaces_entry() {
        let registry = ConnectionRegistry::new();
        let first = registry.add("a".into(), sink());
        let second = registry.add("a".into(), sink());
        assert_ne!(first, second);
        assert_eq!(registry.count(), 1);
        assert_eq!(registry.get(&"a".into()).unwrap().generation, second);
    }

    #[test]
    fn test_replacing_or_removing_cancels_the_evicted_token() {
        let registry = ConnectionRegistry::new();
        let first = registry.insert("a".into(), sink());
        assert!(!first.evicted.is_cancelled());

        let second = registry.insert("a".into(), sink());
        assert!(first.evicted.is_cancelled());
        assert!(!second.evicted.is_cancelled());

        registry.remove(&"a".into());
        assert!(second.evicted.is_cancelled());
    }

    #[test]
    fn test_stale_registration_cannot_remove_replacement() {
        let registry = ConnectionRegistry::new();
        let first = registry.add("a".into(), sink());
        let second = registry.add("a".into(), sink());

        assert!(!registry.remove_registration(&"a".into(), first));
        assert!(registry.contains(&"a".into()));
        assert!(registry.remove_registration(&"a".into(), second));
        assert_eq!(registry.count(), 0);
    }

    #[test]
    fn test_snapshot_is_detached_from_later_mutation() {
        let registry = ConnectionRegistry::new();
        registry.add("a".into(), sink());
        registry.add("b".into(), sink());

        let snapshot = registry.snapshot_all();
        for (id, _) in &snapshot {
            registry.remove(id);
            registry.add(ClientId::generate(), sink());
        }
        assert_eq!(snapshot.len(), 2);
        assert_eq!(registry.count(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_adds_and_removes() {
        let registry = Arc::new(ConnectionRegistry::new());
        let mut tasks = Vec::new();
        for n in 0..100 {
            let registry = registry.clone();
            tasks.push(tokio::spawn(async move {
                let id = ClientId::new(format!("client-{n}"));
                registry.add(id.clone(), sink());
                if n % 2 == 0 {
                    registry.remove(&id);
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }
        assert_eq!(registry.count(), 50);
    }
}
