/// Shared application state passed to axum handlers.

use std::sync::Arc;

use crate::api::rate_limit::RateLimiter;
use crate::config::RelayConfig;
use crate::relay::EventRelay;

#[derive(Clone)]
pub struct AppState {
    pub relay: Arc<EventRelay>,
    pub config: Arc<RelayConfig>,
    pub publish_limiter: RateLimiter,
}

impl AppState {
    pub fn new(config: RelayConfig) -> Self {
        Self {
            relay: Arc::new(EventRelay::new(config.channel_capacity)),
            publish_limiter: RateLimiter::new(config.publish_rate_limit),
            config: Arc::new(config),
        }
    }
}
