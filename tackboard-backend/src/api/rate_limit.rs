//! Sliding-window rate limiter keyed by board.
//!
//! Tracks request timestamps per key in a shared map behind `Arc<Mutex<_>>`.
//! When the number of requests for a key in the last 1 second reaches the
//! configured maximum, the caller answers 429 Too Many Requests.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};

const WINDOW: Duration = Duration::from_secs(1);

#[derive(Clone)]
pub struct RateLimiter {
    windows: Arc<Mutex<HashMap<String, VecDeque<Instant>>>>,
    max_per_window: usize,
}

impl RateLimiter {
    /// Create a rate limiter allowing `max_per_second` requests per key per second.
    pub fn new(max_per_second: usize) -> Self {
        Self {
            windows: Arc::new(Mutex::new(HashMap::new())),
            max_per_window: max_per_second,
        }
    }

    pub fn max_per_window(&self) -> usize {
        self.max_per_window
    }

    /// Returns true and records the request if `key` is under the limit.
    pub fn check(&self, key: &str) -> bool {
        self.check_at(key, Instant::now())
    }

    fn check_at(&self, key: &str, now: Instant) -> bool {
        let mut windows = self.windows.lock().unwrap_or_else(|e| e.into_inner());
        let cutoff = now.checked_sub(WINDOW).unwrap_or(now);
        windows.retain(|_, stamps| {
            while stamps.front().is_some_and(|&t| t < cutoff) {
                stamps.pop_front();
            }
            !stamps.is_empty()
        });
        let stamps = windows.entry(key.to_string()).or_default();
        if stamps.len() < self.max_per_window {
            stamps.push_back(now);
            true
        } else {
            false
        }
    }
}

pub fn too_many_requests() -> Response {
    (
        StatusCode::TOO_MANY_REQUESTS,
        [("retry-after", "1")],
        "Too many requests",
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limit_is_per_key() {
        let limiter = RateLimiter::new(2);
        let now = Instant::now();
        assert!(limiter.check_at("b1", now));
        assert!(limiter.check_at("b1", now));
        assert!(!limiter.check_at("b1", now));
        assert!(limiter.check_at("b2", now));
    }

    #[test]
    fn test_window_slides() {
        let limiter = RateLimiter::new(1);
        let now = Instant::now();
        assert!(limiter.check_at("b1", now));
        assert!(!limiter.check_at("b1", now + Duration::from_millis(500)));
        assert!(limiter.check_at("b1", now + Duration::from_millis(1500)));
    }
}
