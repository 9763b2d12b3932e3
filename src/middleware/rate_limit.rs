//! Per-IP rate limiting.
//!
//! Sliding-window counters keyed by client IP. Each router group gets
//! its own limiter with its own quota, so admin routes can run much
//! tighter than the public read API. The key space is bounded by the
//! periodic cleanup sweep.

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use parking_lot::Mutex;
use tracing::warn;

use crate::config::RouteQuota;

struct WindowEntry {
    count: u32,
    window_start: Instant,
}

#[derive(Clone)]
pub struct IpRateLimiter {
    quota: RouteQuota,
    window: Duration,
    state: Arc<Mutex<HashMap<IpAddr, WindowEntry>>>,
}

enum Decision {
    Allowed,
    Exceeded { retry_after: Duration },
}

impl IpRateLimiter {
    pub fn new(quota: RouteQuota) -> Self {
        Self {
            quota,
            window: Duration::from_secs(quota.window_secs.max(1)),
            state: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn check(&self, ip: IpAddr) -> Decision {
        let mut state = self.state.lock();
        let now = Instant::now();

        let entry = state.entry(ip).or_insert(WindowEntry {
            count: 0,
            window_start: now,
        });

        if now.duration_since(entry.window_start) >= self.window {
            entry.count = 0;
            entry.window_start = now;
        }

        entry.count += 1;
        let limit = self.quota.max_requests + self.quota.burst;
        if entry.count > limit {
            let reset_at = entry.window_start + self.window;
            Decision::Exceeded {
                retry_after: reset_at.saturating_duration_since(now),
            }
        } else {
            Decision::Allowed
        }
    }

    /// Drop entries idle for more than two windows. Call from a
    /// background sweep so the map stays bounded.
    pub fn cleanup(&self) {
        let mut state = self.state.lock();
        let now = Instant::now();
        let window = self.window;
        state.retain(|_, entry| now.duration_since(entry.window_start) < window * 2);
    }
}

pub async fn rate_limit_middleware(
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    axum::extract::State(limiter): axum::extract::State<IpRateLimiter>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let ip = addr.ip();

    match limiter.check(ip) {
        Decision::Allowed => next.run(request).await,
        Decision::Exceeded { retry_after } => {
            warn!(ip = %ip, retry_after_secs = retry_after.as_secs(), "rate limit exceeded");
            let body = serde_json::json!({
                "error": "rate_limit_exceeded",
                "retry_after_seconds": retry_after.as_secs(),
            });
            (
                StatusCode::TOO_MANY_REQUESTS,
                [("Retry-After", retry_after.as_secs().to_string())],
                axum::Json(body),
            )
                .into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quota(max_requests: u32, burst: u32) -> RouteQuota {
        RouteQuota {
            max_requests,
            window_secs: 60,
            burst,
        }
    }

    #[test]
    fn allows_up_to_limit_plus_burst() {
        let limiter = IpRateLimiter::new(quota(5, 3));
        let ip: IpAddr = "203.0.113.9".parse().unwrap();

        for _ in 0..8 {
            assert!(matches!(limiter.check(ip), Decision::Allowed));
        }
        assert!(matches!(limiter.check(ip), Decision::Exceeded { .. }));
    }

    #[test]
    fn limits_are_per_ip() {
        let limiter = IpRateLimiter::new(quota(1, 0));
        let a: IpAddr = "203.0.113.9".parse().unwrap();
        let b: IpAddr = "203.0.113.10".parse().unwrap();

        assert!(matches!(limiter.check(a), Decision::Allowed));
        assert!(matches!(limiter.check(a), Decision::Exceeded { .. }));
        assert!(matches!(limiter.check(b), Decision::Allowed));
    }

    #[test]
    fn cleanup_bounds_the_key_space() {
        let limiter = IpRateLimiter::new(quota(5, 0));
        for i in 0..100u32 {
            let ip: IpAddr = format!("10.0.{}.{}", i / 256, i % 256).parse().unwrap();
            limiter.check(ip);
        }
        assert_eq!(limiter.state.lock().len(), 100);
        // entries are fresh, so nothing is evicted yet
        limiter.cleanup();
        assert_eq!(limiter.state.lock().len(), 100);
    }
}
