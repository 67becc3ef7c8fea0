//! Attempt counter storage.
//!
//! Pure bookkeeping: the store knows nothing about admission policy, it only
//! keeps `(count, window_start)` per key and applies mutations atomically per key.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::time::Duration;
use tokio::time::Instant;

/// Attempts recorded for one key in its current window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttemptEntry {
    pub count: u32,
    pub window_start: Instant,
}

impl AttemptEntry {
    fn first(now: Instant) -> Self {
        Self {
            count: 1,
            window_start: now,
        }
    }

    /// A window is over once `window` has fully elapsed since its first attempt.
    pub fn is_expired(&self, now: Instant, window: Duration) -> bool {
        now.saturating_duration_since(self.window_start) >= window
    }

    /// Time left in the window, zero when already expired.
    pub fn remaining(&self, now: Instant, window: Duration) -> Duration {
        window.saturating_sub(now.saturating_duration_since(self.window_start))
    }
}

/// Concurrent attempt counters keyed by rate-limit key.
#[derive(Debug, Default)]
pub struct AttemptStore {
    entries: DashMap<String, AttemptEntry>,
}

impl AttemptStore {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Copy of the entry for `key`, if any. Does not check expiry.
    pub fn get(&self, key: &str) -> Option<AttemptEntry> {
        self.entries.get(key).map(|entry| *entry)
    }

    /// Records one attempt, starting a fresh window when there is none or the
    /// current one is expired. The expiry check and the reset-or-increment
    /// happen under the key's shard lock, so concurrent callers never lose an update.
    pub fn record(&self, key: &str, now: Instant, window: Duration) -> AttemptEntry {
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                let entry = occupied.get_mut();
                if entry.is_expired(now, window) {
                    *entry = AttemptEntry::first(now);
                } else {
                    entry.count = entry.count.saturating_add(1);
                }
                *entry
            }
            Entry::Vacant(vacant) => *vacant.insert(AttemptEntry::first(now)),
        }
    }

    /// Removes `key` only if its window is still expired when the shard lock is held.
    /// A window restarted by a concurrent `record` is left alone.
    pub fn remove_expired(&self, key: &str, now: Instant, window: Duration) -> bool {
        self.entries
            .remove_if(key, |_, entry| entry.is_expired(now, window))
            .is_some()
    }

    /// Unconditional removal; idempotent.
    pub fn remove(&self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Drops every entry whose window started at least `horizon` ago.
    /// Shards are locked one at a time.
    pub fn retain_newer_than(&self, now: Instant, horizon: Duration) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| now.saturating_duration_since(entry.window_start) < horizon);
        before.saturating_sub(self.entries.len())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_secs(60);

    #[test]
    fn test_record_starts_window_then_increments() {
        let store = AttemptStore::new();
        let now = Instant::now();

        assert_eq!(store.record("k", now, WINDOW).count, 1);
        let entry = store.record("k", now + Duration::from_secs(10), WINDOW);
        assert_eq!(entry.count, 2);
        assert_eq!(entry.window_start, now);
    }

    #[test]
    fn test_record_after_expiry_restarts_window() {
        let store = AttemptStore::new();
        let start = Instant::now();
        store.record("k", start, WINDOW);
        store.record("k", start, WINDOW);

        let later = start + WINDOW;
        let entry = store.record("k", later, WINDOW);
        assert_eq!(entry.count, 1);
        assert_eq!(entry.window_start, later);
    }

    #[test]
    fn test_remove_expired_keeps_live_windows() {
        let store = AttemptStore::new();
        let start = Instant::now();
        store.record("k", start, WINDOW);

        assert!(!store.remove_expired("k", start + Duration::from_secs(59), WINDOW));
        assert!(store.get("k").is_some());
        assert!(store.remove_expired("k", start + WINDOW, WINDOW));
        assert!(store.get("k").is_none());
    }

    #[test]
    fn test_retain_newer_than_drops_old_windows_only() {
        let store = AttemptStore::new();
        let start = Instant::now();
        store.record("old", start, WINDOW);
        store.record("new", start + Duration::from_secs(100), WINDOW);

        let removed = store.retain_newer_than(start + Duration::from_secs(120), WINDOW * 2);
        assert_eq!(removed, 1);
        assert!(store.get("old").is_none());
        assert!(store.get("new").is_some());
    }

    #[test]
    fn test_remaining_saturates_at_zero() {
        let start = Instant::now();
        let entry = AttemptEntry::first(start);
        assert_eq!(entry.remaining(start + Duration::from_secs(15), WINDOW), Duration::from_secs(45));
        assert_eq!(entry.remaining(start + WINDOW * 3, WINDOW), Duration::ZERO);
    }
}
