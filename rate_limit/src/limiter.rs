use crate::error::Error;
use crate::store::AttemptStore;
use log::*;
use std::time::Duration;
use tokio::time::Instant;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
pub const DEFAULT_LOCKOUT_WINDOW: Duration = Duration::from_secs(15 * 60);

/// Limiter policy, fixed for the lifetime of a `RateLimiter`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    max_attempts: u32,
    lockout_window: Duration,
}

impl RateLimitConfig {
    pub fn new(max_attempts: u32, lockout_window: Duration) -> Result<Self, Error> {
        if max_attempts == 0 {
            return Err(Error::invalid_config("max_attempts must be at least 1"));
        }
        if lockout_window.is_zero() {
            return Err(Error::invalid_config("lockout_window must be non-zero"));
        }
        Ok(Self {
            max_attempts,
            lockout_window,
        })
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn lockout_window(&self) -> Duration {
        self.lockout_window
    }

    /// Entries whose window started this long ago can no longer influence
    /// admission and are safe to sweep.
    pub fn sweep_horizon(&self) -> Duration {
        self.lockout_window.saturating_mul(2)
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            lockout_window: DEFAULT_LOCKOUT_WINDOW,
        }
    }
}

/// Rolling-window attempt limiter.
///
/// Rate limiting is approximate: a request racing a window rollover may be
/// admitted or denied depending on which mutation lands first. Each key's
/// own mutation is always atomic.
#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimitConfig,
    store: AttemptStore,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            store: AttemptStore::new(),
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// True iff `key` has an unexpired window with at least `max_attempts` attempts.
    /// An expired entry is evicted as a side effect.
    pub fn is_blocked(&self, key: &str) -> bool {
        let now = Instant::now();
        let Some(entry) = self.store.get(key) else {
            return false;
        };

        if entry.is_expired(now, self.config.lockout_window) {
            self.store
                .remove_expired(key, now, self.config.lockout_window);
            trace!("Evicted expired rate limit entry for {key}");
            return false;
        }

        let blocked = entry.count >= self.config.max_attempts;
        if blocked {
            debug!("Rate limit reached for {key} ({} attempts)", entry.count);
        }
        blocked
    }

    /// Admission check in `Result` form for callers that propagate with `?`.
    pub fn check(&self, key: &str) -> Result<(), Error> {
        if self.is_blocked(key) {
            let retry_after = self.retry_after(key).unwrap_or(Duration::ZERO);
            return Err(Error::too_many_attempts(retry_after));
        }
        Ok(())
    }

    /// Records one attempt and returns the count in the current window.
    pub fn record_attempt(&self, key: &str) -> u32 {
        let entry = self
            .store
            .record(key, Instant::now(), self.config.lockout_window);
        trace!("Recorded attempt {} for {key}", entry.count);
        entry.count
    }

    /// Forgets every attempt for `key`. Idempotent.
    pub fn reset_attempts(&self, key: &str) {
        if self.store.remove(key) {
            trace!("Reset rate limit attempts for {key}");
        }
    }

    /// Attempts counted in the current window, `None` when there is no live window.
    pub fn attempts(&self, key: &str) -> Option<u32> {
        self.store
            .get(key)
            .filter(|entry| !entry.is_expired(Instant::now(), self.config.lockout_window))
            .map(|entry| entry.count)
    }

    /// Time until `key` is admitted again, `None` if it is not blocked.
    pub fn retry_after(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        self.store
            .get(key)
            .filter(|entry| {
                entry.count >= self.config.max_attempts
                    && !entry.is_expired(now, self.config.lockout_window)
            })
            .map(|entry| entry.remaining(now, self.config.lockout_window))
    }

    /// Drops entries whose window started at least twice the lockout window ago.
    /// Returns how many were removed.
    pub fn sweep_expired(&self) -> usize {
        let removed = self
            .store
            .retain_newer_than(Instant::now(), self.config.sweep_horizon());
        debug!(
            "Rate limit sweep removed {removed} stale entries, {} remaining",
            self.store.len()
        );
        removed
    }

    /// Number of tracked keys, including expired ones not yet evicted.
    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(RateLimitConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::key::build_login_key;
    use std::sync::Arc;

    fn limiter(max_attempts: u32, minutes: u64) -> RateLimiter {
        RateLimiter::new(RateLimitConfig::new(max_attempts, Duration::from_secs(minutes * 60)).unwrap())
    }

    #[test]
    fn test_config_rejects_zero_attempts_and_zero_window() {
        let err = RateLimitConfig::new(0, Duration::from_secs(60)).unwrap_err();
        assert!(matches!(err.error_kind, ErrorKind::InvalidConfig(_)));
        assert!(RateLimitConfig::new(3, Duration::ZERO).is_err());
        assert_eq!(RateLimitConfig::default().max_attempts(), 5);
        assert_eq!(
            RateLimitConfig::default().lockout_window(),
            Duration::from_secs(900)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_blocked_exactly_when_count_reaches_max() {
        let limiter = limiter(5, 15);
        let key = build_login_key("1.2.3.4", "alice");

        for n in 1..=5 {
            assert!(!limiter.is_blocked(&key), "blocked before attempt {n}");
            assert_eq!(limiter.record_attempt(&key), n);
            assert_eq!(limiter.attempts(&key), Some(n));
        }
        assert!(limiter.is_blocked(&key));
    }

    #[tokio::test(start_paused = true)]
    async fn test_lockout_lifts_after_window_elapses() {
        let limiter = limiter(5, 15);
        let key = "login:1.2.3.4:alice";
        for _ in 0..5 {
            limiter.record_attempt(key);
        }
        assert!(limiter.is_blocked(key));
        assert!(limiter.check(key).is_err());

        tokio::time::advance(Duration::from_secs(15 * 60)).await;

        assert!(!limiter.is_blocked(key));
        // Lazy expiry removed the entry.
        assert_eq!(limiter.len(), 0);
        assert_eq!(limiter.record_attempt(key), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_unblocks_immediately() {
        let limiter = limiter(2, 15);
        let key = "login:10.0.0.1:bob";
        limiter.record_attempt(key);
        limiter.record_attempt(key);
        limiter.record_attempt(key);
        assert!(limiter.is_blocked(key));

        limiter.reset_attempts(key);
        assert!(!limiter.is_blocked(key));
        assert_eq!(limiter.attempts(key), None);

        // Idempotent
        limiter.reset_attempts(key);
        assert!(!limiter.is_blocked(key));
    }

    #[tokio::test(start_paused = true)]
    async fn test_check_reports_remaining_window() {
        let limiter = limiter(1, 15);
        let key = "login:1.2.3.4:carol";
        assert!(limiter.check(key).is_ok());
        limiter.record_attempt(key);

        tokio::time::advance(Duration::from_secs(5 * 60)).await;

        let err = limiter.check(key).unwrap_err();
        assert_eq!(err.code(), "too_many_attempts");
        assert_eq!(err.retry_after(), Some(Duration::from_secs(10 * 60)));
        assert_eq!(limiter.retry_after("login:1.2.3.4:nobody"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_only_drops_entries_past_twice_the_window() {
        let limiter = limiter(5, 15);
        limiter.record_attempt("stale");
        tokio::time::advance(Duration::from_secs(20 * 60)).await;
        limiter.record_attempt("fresh");
        for _ in 0..4 {
            limiter.record_attempt("fresh");
        }

        tokio::time::advance(Duration::from_secs(10 * 60)).await;
        assert_eq!(limiter.sweep_expired(), 1);
        assert_eq!(limiter.len(), 1);
        // A sweep never changes the outcome for keys inside their window.
        assert!(limiter.is_blocked("fresh"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_attempts_are_never_lost() {
        let limiter = Arc::new(limiter(1_000, 15));
        let mut tasks = Vec::new();
        for _ in 0..100 {
            let limiter = limiter.clone();
            tasks.push(tokio::spawn(async move {
                limiter.record_attempt("login:1.2.3.4:alice");
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }
        assert_eq!(limiter.attempts("login:1.2.3.4:alice"), Some(100));
    }
}
