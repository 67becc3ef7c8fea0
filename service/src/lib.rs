use config::Config;
use events::EventPublisher;
use log::info;
use rate_limit::{RateLimiter, SweepHandle};
use sse::domain_event_handler::SseDomainEventHandler;
use std::sync::Arc;

pub mod config;
pub mod logging;

// Service-level state shared by every request handler.
// Needs to implement Clone to be able to be passed into Router as State
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub sse_manager: Arc<sse::Manager>,
    pub rate_limiter: Arc<RateLimiter>,
    pub event_publisher: EventPublisher,
    // Keeps the sweep task alive for as long as any clone of the state exists.
    _sweeper: Arc<SweepHandle>,
}

impl AppState {
    /// Builds the shared services and starts the rate limit sweeper.
    /// Must be called from within a tokio runtime.
    pub fn new(app_config: Config) -> Result<Self, rate_limit::Error> {
        let rate_limiter = Arc::new(RateLimiter::new(app_config.rate_limit_config()?));
        let sweeper = rate_limiter.spawn_sweeper(app_config.sweep_delay(), app_config.sweep_interval());

        let sse_manager = Arc::new(
            sse::Manager::with_heartbeat_interval(app_config.heartbeat_interval())
                .with_write_timeout(app_config.write_timeout()),
        );
        let event_publisher = EventPublisher::new()
            .with_handler(Arc::new(SseDomainEventHandler::new(sse_manager.clone())));

        info!(
            "Rate limiting: {} attempts per {}s window; SSE heartbeat every {}s",
            rate_limiter.config().max_attempts(),
            rate_limiter.config().lockout_window().as_secs(),
            sse_manager.heartbeat_interval().as_secs(),
        );

        Ok(Self {
            config: app_config,
            sse_manager,
            rate_limiter,
            event_publisher,
            _sweeper: Arc::new(sweeper),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use events::{Audience, DomainEvent};
    use serde_json::json;
    use std::time::Duration;

    #[tokio::test]
    async fn test_app_state_wires_config_into_services() {
        let config = Config::parse_from([
            "test",
            "--rate-limit-max-attempts",
            "2",
            "--sse-heartbeat-interval-secs",
            "5",
            "--sse-write-timeout-secs",
            "3",
        ]);
        let state = AppState::new(config).unwrap();

        assert_eq!(state.rate_limiter.config().max_attempts(), 2);
        assert_eq!(state.sse_manager.heartbeat_interval(), Duration::from_secs(5));
        assert_eq!(state.sse_manager.write_timeout(), Duration::from_secs(3));
        assert_eq!(state.event_publisher.handler_count(), 1);
    }

    #[tokio::test]
    async fn test_published_events_reach_sse_clients() {
        let state = AppState::new(Config::parse_from(["test"])).unwrap();
        let (sink, mut stream) = sse::ChannelSink::new();
        state
            .sse_manager
            .register_connection("a".into(), Arc::new(sink));

        state
            .event_publisher
            .publish(DomainEvent::RecordDeleted {
                resource: "item".to_string(),
                record_id: json!(7),
                audience: Audience::All,
            })
            .await;

        assert_eq!(
            stream.try_recv().unwrap(),
            &b"event: item_deleted\ndata: {\"id\":7}\n\n"[..]
        );
    }
}
