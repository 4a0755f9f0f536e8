//! Per-route, per-client request rate limiting.
//!
//! Each limited route owns a [`KeyedRateLimiter`] that keeps one sliding
//! window per client IP. Requests over the limit are answered with
//! `429 Too Many Requests` before they reach the wallet manager.

use axum::{
    Json,
    extract::{ConnectInfo, Request, State},
    http::{HeaderValue, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::collections::{HashMap, VecDeque};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use super::wallets::ErrorResponse;
use crate::metrics;

/// Client windows kept before idle ones are pruned
const PRUNE_THRESHOLD: usize = 10_000;

/// Rate limiter using a sliding window algorithm
#[derive(Debug)]
pub struct RateLimiter {
    /// Timestamps of recent requests
    timestamps: VecDeque<Instant>,
    /// Maximum number of requests allowed in the window
    max_requests: usize,
    /// Time window for rate limiting
    window: Duration,
}

impl RateLimiter {
    /// Create a new rate limiter
    ///
    /// # Arguments
    ///
    /// * `max_requests` - Maximum number of requests allowed in the time window
    /// * `window` - Time window duration
    ///
    /// # Example
    ///
    /// ```
    /// use wallet_server::api::rate_limiter::RateLimiter;
    /// use std::time::Duration;
    ///
    /// // Allow 10 requests per minute
    /// let limiter = RateLimiter::new(10, Duration::from_secs(60));
    /// ```
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            timestamps: VecDeque::with_capacity(max_requests),
            max_requests,
            window,
        }
    }

    /// Check if a request should be allowed
    ///
    /// Returns `true` if the request is allowed, `false` if rate limit exceeded.
    ///
    /// # Example
    ///
    /// ```
    /// # use wallet_server::api::rate_limiter::RateLimiter;
    /// # use std::time::Duration;
    /// let mut limiter = RateLimiter::new(5, Duration::from_secs(1));
    ///
    /// // First 5 requests allowed
    /// for _ in 0..5 {
    ///     assert!(limiter.check());
    /// }
    ///
    /// // 6th request blocked
    /// assert!(!limiter.check());
    /// ```
    pub fn check(&mut self) -> bool {
        let now = Instant::now();
        self.evict_expired(now);

        if self.timestamps.len() >= self.max_requests {
            return false;
        }

        self.timestamps.push_back(now);
        true
    }

    /// Get the time until the oldest request leaves the window
    ///
    /// Returns `None` if there are no requests in the current window.
    pub fn reset_in(&self) -> Option<Duration> {
        self.timestamps.front().map(|oldest| {
            let elapsed = Instant::now().duration_since(*oldest);
            self.window.saturating_sub(elapsed)
        })
    }

    /// Whether every recorded request has left the window
    fn is_idle(&self, now: Instant) -> bool {
        self.timestamps
            .back()
            .is_none_or(|newest| now.duration_since(*newest) > self.window)
    }

    fn evict_expired(&mut self, now: Instant) {
        while let Some(ts) = self.timestamps.front() {
            if now.duration_since(*ts) > self.window {
                self.timestamps.pop_front();
            } else {
                break;
            }
        }
    }
}

/// Per-route request thresholds
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteLimits {
    /// Whether rate limiting is applied at all
    pub enabled: bool,
    /// `POST /wallets` requests per client per minute
    pub create_per_minute: usize,
    /// `GET /wallets/{id}` requests per client per minute
    pub read_per_minute: usize,
    /// `POST /wallets/{id}/operation` requests per client per minute
    pub operation_per_minute: usize,
}

impl Default for RouteLimits {
    fn default() -> Self {
        Self {
            enabled: true,
            create_per_minute: 5,
            read_per_minute: 30,
            operation_per_minute: 10,
        }
    }
}

impl RouteLimits {
    /// Limits that never reject a request
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }
}

/// Sliding-window rate limiter keyed by client IP
#[derive(Debug)]
pub struct KeyedRateLimiter {
    route: &'static str,
    max_requests: usize,
    window: Duration,
    clients: Mutex<HashMap<IpAddr, RateLimiter>>,
}

impl KeyedRateLimiter {
    /// Create a limiter for one route
    pub fn new(route: &'static str, max_requests: usize, window: Duration) -> Self {
        Self {
            route,
            max_requests,
            window,
            clients: Mutex::new(HashMap::new()),
        }
    }

    /// Create a limiter allowing `max_requests` per client per minute
    pub fn per_minute(route: &'static str, max_requests: usize) -> Self {
        Self::new(route, max_requests, Duration::from_secs(60))
    }

    pub fn route(&self) -> &'static str {
        self.route
    }

    /// Record a request from `client`
    ///
    /// A rejected request carries the wait until the client's oldest request
    /// leaves the window.
    pub fn check(&self, client: IpAddr) -> Result<(), Duration> {
        let mut clients = self.clients.lock().unwrap_or_else(PoisonError::into_inner);

        if clients.len() >= PRUNE_THRESHOLD {
            let now = Instant::now();
            clients.retain(|_, limiter| !limiter.is_idle(now));
        }

        let limiter = clients
            .entry(client)
            .or_insert_with(|| RateLimiter::new(self.max_requests, self.window));

        if limiter.check() {
            Ok(())
        } else {
            Err(limiter.reset_in().unwrap_or(self.window))
        }
    }

    /// Number of clients currently tracked
    pub fn tracked_clients(&self) -> usize {
        self.clients
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// Resolve the peer address of a request, if the server recorded one
fn client_ip(request: &Request) -> IpAddr {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED))
}

/// Whole seconds for a `Retry-After` header, never below one
fn retry_after_secs(wait: Duration) -> u64 {
    let secs = wait.as_secs() + u64::from(wait.subsec_nanos() > 0);
    secs.max(1)
}

/// Middleware enforcing a route's [`KeyedRateLimiter`]
pub async fn enforce_rate_limit(
    State(limiter): State<Arc<KeyedRateLimiter>>,
    request: Request,
    next: Next,
) -> Response {
    let client = client_ip(&request);

    if let Err(wait) = limiter.check(client) {
        let retry_after = retry_after_secs(wait);
        tracing::warn!(
            route = limiter.route(),
            client = %client,
            retry_after_secs = retry_after,
            "Rate limit exceeded"
        );
        metrics::rate_limited_requests_total(limiter.route());
        return (
            StatusCode::TOO_MANY_REQUESTS,
            [(header::RETRY_AFTER, HeaderValue::from(retry_after))],
            Json(ErrorResponse::new(
                "Too many requests. Please try again later.",
            )),
        )
            .into_response();
    }

    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_rate_limiter_allows_within_limit() {
        let mut limiter = RateLimiter::new(5, Duration::from_secs(1));

        for _ in 0..5 {
            assert!(limiter.check(), "Should allow requests within limit");
        }
    }

    #[test]
    fn test_rate_limiter_blocks_over_limit() {
        let mut limiter = RateLimiter::new(3, Duration::from_secs(1));

        for _ in 0..3 {
            assert!(limiter.check());
        }

        assert!(!limiter.check(), "Should block request over limit");
    }

    #[test]
    fn test_rate_limiter_window_expiry() {
        let mut limiter = RateLimiter::new(2, Duration::from_millis(100));

        assert!(limiter.check());
        assert!(limiter.check());
        assert!(!limiter.check());

        thread::sleep(Duration::from_millis(150));

        assert!(limiter.check(), "Should allow after window expires");
    }

    #[test]
    fn test_reset_in() {
        let mut limiter = RateLimiter::new(5, Duration::from_secs(1));
        assert!(limiter.reset_in().is_none());

        limiter.check();
        let reset = limiter.reset_in().expect("Should have reset time after request");
        assert!(reset <= Duration::from_secs(1));
    }

    #[test]
    fn test_keyed_limiter_isolates_clients() {
        let limiter = KeyedRateLimiter::per_minute("create", 2);
        let a: IpAddr = "10.0.0.1".parse().unwrap();
        let b: IpAddr = "10.0.0.2".parse().unwrap();

        assert!(limiter.check(a).is_ok());
        assert!(limiter.check(a).is_ok());
        assert!(limiter.check(a).is_err(), "Third request from a should be blocked");
        assert!(limiter.check(b).is_ok(), "Other clients keep their own window");
        assert_eq!(limiter.tracked_clients(), 2);
    }

    #[test]
    fn test_keyed_limiter_reports_wait() {
        let limiter = KeyedRateLimiter::per_minute("read", 1);
        let client: IpAddr = "10.0.0.3".parse().unwrap();

        assert!(limiter.check(client).is_ok());
        let wait = limiter.check(client).unwrap_err();
        assert!(wait > Duration::from_secs(55));
        assert!(wait <= Duration::from_secs(60));
    }

    #[test]
    fn test_retry_after_rounds_up() {
        assert_eq!(retry_after_secs(Duration::from_millis(59_001)), 60);
        assert_eq!(retry_after_secs(Duration::from_secs(12)), 12);
        assert_eq!(retry_after_secs(Duration::ZERO), 1);
    }

    #[test]
    fn test_default_route_limits() {
        let limits = RouteLimits::default();
        assert!(limits.enabled);
        assert_eq!(limits.create_per_minute, 5);
        assert_eq!(limits.read_per_minute, 30);
        assert_eq!(limits.operation_per_minute, 10);
        assert!(!RouteLimits::disabled().enabled);
    }
}
