use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Mutex;
use std::time::Instant;

use axum::{
    extract::{ConnectInfo, Request, State},
    http::HeaderMap,
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::error::AppError;
use crate::AppState;

#[derive(Debug, Clone, Copy)]
struct Bucket {
    allowance: f64,
    last_check: Instant,
}

/// Per-key token bucket.
///
/// Each key holds up to `capacity` tokens, refilled continuously at
/// `rate_per_minute / 60` tokens per second. A request spends one token.
/// Buckets are never evicted, so memory grows with the number of distinct
/// keys seen.
#[derive(Debug)]
pub struct IpRateLimiter {
    rate_per_sec: f64,
    capacity: f64,
    buckets: Mutex<HashMap<String, Bucket>>,
}

impl IpRateLimiter {
    pub fn new(rate_per_minute: u32) -> Self {
        let rate_per_minute = rate_per_minute.max(1) as f64;
        Self {
            rate_per_sec: rate_per_minute / 60.0,
            capacity: rate_per_minute,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    pub fn allow(&self, key: &str) -> bool {
        self.allow_at(key, Instant::now())
    }

    /// `allow` with an explicit clock, for deterministic callers.
    pub fn allow_at(&self, key: &str, now: Instant) -> bool {
        // Buckets stay consistent even if a holder panicked
        let mut buckets = self
            .buckets
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let bucket = buckets.entry(key.to_string()).or_insert(Bucket {
            allowance: self.capacity,
            last_check: now,
        });

        let elapsed = now.saturating_duration_since(bucket.last_check).as_secs_f64();
        bucket.last_check = now;
        bucket.allowance = (bucket.allowance + elapsed * self.rate_per_sec).min(self.capacity);

        if bucket.allowance < 1.0 {
            return false;
        }
        bucket.allowance -= 1.0;
        true
    }

    pub fn tracked_keys(&self) -> usize {
        self.buckets
            .lock()
            .map(|buckets| buckets.len())
            .unwrap_or_else(|poisoned| poisoned.into_inner().len())
    }
}

/// Client address used as the rate-limit key.
///
/// Behind a trusted proxy the first `X-Forwarded-For` entry wins, then
/// `X-Real-IP`. Otherwise the socket peer address is used.
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>, trust_proxy: bool) -> String {
    if trust_proxy {
        let forwarded = headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty());
        if let Some(ip) = forwarded {
            return ip.to_string();
        }

        let real_ip = headers
            .get("x-real-ip")
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty());
        if let Some(ip) = real_ip {
            return ip.to_string();
        }
    }

    peer.map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

pub async fn rate_limit_login(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let ip = client_ip(request.headers(), peer, state.config.trust_proxy_headers);

    if !state.rate_limiter.allow(&ip) {
        tracing::warn!(client_ip = %ip, path = %request.uri().path(), "Login rate limit exceeded");
        return AppError::RateLimited.into_response();
    }

    next.run(request).await
}
