//! Per-key attempt limiting for sensitive operations (e.g. login attempts).
//!
//! # Architecture
//!
//! - **Attempt store**: `DashMap`-backed counters, one entry per key. Each key
//!   is mutated under its shard lock, so unrelated keys never serialize on a
//!   single global lock.
//! - **Rate limiter**: admits or denies based on the number of attempts in the
//!   current window. Expired entries are evicted lazily on query.
//! - **Sweeper**: optional background task that drops entries old enough to
//!   no longer affect any admission decision. It only bounds memory; the
//!   limiter behaves the same whether it runs or not.
//!
//! # Example
//!
//! ```rust,ignore
//! let limiter = RateLimiter::new(RateLimitConfig::default());
//! let key = rate_limit::key::build_login_key(&client_ip, &username);
//!
//! if limiter.is_blocked(&key) {
//!     return Err(too_many_attempts());
//! }
//! match validate(&username, &password).await {
//!     Ok(user) => limiter.reset_attempts(&key),
//!     Err(_) => { limiter.record_attempt(&key); }
//! }
//! ```

pub mod error;
pub mod key;
pub mod limiter;
pub mod store;
pub mod sweep;
pub mod throttle;

pub use error::{Error, ErrorKind};
pub use limiter::{RateLimitConfig, RateLimiter};
pub use sweep::SweepHandle;
pub use throttle::{Throttle, ThrottleError};
