//! Adaptive rate limiter for the completion endpoint.
//!
//! Tracks per-model request budgets from `x-ratelimit-*` headers and backs
//! off after 429 responses, preferring the server's `retry-after` hint over
//! exponential backoff.

use dashmap::DashMap;
use reqwest::header::HeaderMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Upper bound on exponential backoff.
const MAX_BACKOFF_SECS: f64 = 60.0;

/// Rate limit state for a single model.
#[derive(Debug, Default)]
pub struct ModelRateLimitState {
    /// Remaining requests in current interval
    pub remaining_requests: Option<u32>,
    /// When the request limit resets
    pub reset_requests_at: Option<Instant>,
    /// Consecutive 429 errors (for backoff)
    pub consecutive_429s: u32,
    /// Backoff until this time
    pub backoff_until: Option<Instant>,
}

impl ModelRateLimitState {
    /// Get time to wait before proceeding.
    pub fn wait_time(&self) -> Duration {
        let now = Instant::now();
        let mut wait = Duration::ZERO;

        if let Some(until) = self.backoff_until.filter(|&t| t > now) {
            wait = wait.max(until - now);
        }

        if self.remaining_requests == Some(0) {
            if let Some(reset_at) = self.reset_requests_at.filter(|&t| t > now) {
                wait = wait.max(reset_at - now);
            }
        }

        wait
    }

    /// Record a 429 and schedule backoff.
    pub fn record_429(&mut self, retry_after: Option<f64>) {
        self.consecutive_429s += 1;
        let backoff_secs = retry_after
            .unwrap_or_else(|| 2.0_f64.powi(self.consecutive_429s as i32))
            .clamp(0.0, MAX_BACKOFF_SECS);
        self.backoff_until = Some(Instant::now() + Duration::from_secs_f64(backoff_secs));
        warn!(
            consecutive_429s = self.consecutive_429s,
            backoff_secs, "Rate limited (429), backing off"
        );
    }

    /// Record a successful request.
    pub fn record_success(&mut self) {
        self.consecutive_429s = 0;
        self.backoff_until = None;
    }

    /// Update request budget from response headers.
    pub fn update_from_headers(&mut self, headers: &HeaderMap) {
        if let Some(remaining) = header_value::<u32>(headers, "x-ratelimit-remaining-requests") {
            self.remaining_requests = Some(remaining);
        }
        if let Some(secs) = header_value::<f64>(headers, "x-ratelimit-reset-requests") {
            self.reset_requests_at = Some(Instant::now() + Duration::from_secs_f64(secs.max(0.0)));
        }
    }
}

fn header_value<T: std::str::FromStr>(headers: &HeaderMap, key: &str) -> Option<T> {
    headers.get(key)?.to_str().ok()?.trim().parse().ok()
}

/// Per-model rate limiter shared across completion calls.
#[derive(Debug, Default)]
pub struct RateLimiter {
    states: DashMap<String, ModelRateLimitState>,
    total_requests: AtomicU64,
    total_429s: AtomicU64,
    total_wait_ms: AtomicU64,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait if necessary before making a request to the given model.
    ///
    /// Returns the duration waited.
    pub async fn wait_if_needed(&self, model: &str) -> Duration {
        // Guard dropped before sleeping.
        let wait_time = self
            .states
            .get(model)
            .map(|state| state.wait_time())
            .unwrap_or(Duration::ZERO);

        if wait_time > Duration::ZERO {
            debug!(
                model,
                wait_ms = wait_time.as_millis() as u64,
                "Waiting for rate limit"
            );
            self.total_wait_ms
                .fetch_add(wait_time.as_millis() as u64, Ordering::Relaxed);
            tokio::time::sleep(wait_time).await;
        }

        wait_time
    }

    /// Record a response for the given model.
    pub fn record_request(&self, model: &str, status: u16, headers: &HeaderMap) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);

        let mut state = self.states.entry(model.to_string()).or_default();
        state.update_from_headers(headers);

        if status == 429 {
            self.total_429s.fetch_add(1, Ordering::Relaxed);
            state.record_429(header_value::<f64>(headers, "retry-after"));
        } else if status < 400 {
            state.record_success();
        }
    }

    pub fn stats(&self) -> RateLimiterStats {
        RateLimiterStats {
            total_requests: self.total_requests.load(Ordering::Relaxed),
            total_429s: self.total_429s.load(Ordering::Relaxed),
            total_wait_secs: self.total_wait_ms.load(Ordering::Relaxed) as f64 / 1000.0,
        }
    }
}

/// Rate limiter statistics.
#[derive(Debug, Clone)]
pub struct RateLimiterStats {
    pub total_requests: u64,
    pub total_429s: u64,
    pub total_wait_secs: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for &(k, v) in pairs {
            map.insert(k, HeaderValue::from_static(v));
        }
        map
    }

    #[test]
    fn test_429_backs_off_and_success_clears() {
        let limiter = RateLimiter::new();
        limiter.record_request("m", 429, &HeaderMap::new());

        let wait = limiter.states.get("m").unwrap().wait_time();
        assert!(wait > Duration::ZERO);
        assert!(wait <= Duration::from_secs(2));

        limiter.record_request("m", 200, &HeaderMap::new());
        assert_eq!(limiter.states.get("m").unwrap().wait_time(), Duration::ZERO);
        assert_eq!(limiter.stats().total_429s, 1);
        assert_eq!(limiter.stats().total_requests, 2);
    }

    #[test]
    fn test_retry_after_overrides_exponential_backoff() {
        let limiter = RateLimiter::new();
        limiter.record_request("m", 429, &headers(&[("retry-after", "0")]));
        assert_eq!(limiter.states.get("m").unwrap().wait_time(), Duration::ZERO);
    }

    #[test]
    fn test_exhausted_budget_waits_for_reset() {
        let limiter = RateLimiter::new();
        limiter.record_request(
            "m",
            200,
            &headers(&[
                ("x-ratelimit-remaining-requests", "0"),
                ("x-ratelimit-reset-requests", "5"),
            ]),
        );
        let wait = limiter.states.get("m").unwrap().wait_time();
        assert!(wait > Duration::from_secs(4));
    }

    #[test]
    fn test_models_are_tracked_independently() {
        let limiter = RateLimiter::new();
        limiter.record_request("a", 429, &HeaderMap::new());
        assert!(limiter.states.get("b").is_none());
    }

    #[tokio::test]
    async fn test_unknown_model_does_not_wait() {
        let limiter = RateLimiter::new();
        assert_eq!(limiter.wait_if_needed("fresh").await, Duration::ZERO);
    }
}
