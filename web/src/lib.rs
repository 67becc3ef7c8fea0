//! HTTP transport for the realtime services.
//!
//! Routing, authentication and the login controller belong to the host
//! application; this crate contributes the event stream endpoint, client
//! address extraction for rate-limit keys and the HTTP mapping of throttling.

pub mod error;
pub mod extractors;
mod router;
mod sse;
pub mod throttle;

pub use router::router;
pub use service::AppState;
