// ============================
// crates/backend-lib/src/middleware/rate_limit.rs
// ============================
//! Fixed-window rate limiting per bucket and client address.
use std::convert::Infallible;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    extract::{ConnectInfo, FromRequestParts},
    http::{request::Parts, HeaderMap},
};
use dashmap::DashMap;
use metrics::counter;

use crate::config::{BucketLimit, RateLimitSettings};
use crate::metrics::RATE_LIMITED;
use crate::AppState;

/// Operation families limited independently of each other
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Bucket {
    Authenticate,
    Logout,
    GetVPlan,
}

impl Bucket {
    pub fn as_str(&self) -> &'static str {
        match self {
            Bucket::Authenticate => "authenticate",
            Bucket::Logout => "logout",
            Bucket::GetVPlan => "getVPlan",
        }
    }
}

impl fmt::Display for Bucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rate limit entry for a client
#[derive(Debug)]
struct RateLimitEntry {
    requests: u32,
    window_start: Instant,
}

/// Rate limiter shared by all handlers
#[derive(Debug)]
pub struct RateLimiter {
    entries: DashMap<(Bucket, String), RateLimitEntry>,
    limits: RateLimitSettings,
}

impl RateLimiter {
    pub fn new(limits: RateLimitSettings) -> Self {
        Self {
            entries: DashMap::new(),
            limits,
        }
    }

    fn limit(&self, bucket: Bucket) -> BucketLimit {
        match bucket {
            Bucket::Authenticate => self.limits.authenticate,
            Bucket::Logout => self.limits.logout,
            Bucket::GetVPlan => self.limits.get_vplan,
        }
    }

    /// Count one request of `client` against `bucket`. Returns `false`
    /// when the budget of the current window is used up.
    pub fn check(&self, bucket: Bucket, client: &str) -> bool {
        let limit = self.limit(bucket);

        let mut entry = self
            .entries
            .entry((bucket, client.to_string()))
            .or_insert_with(|| RateLimitEntry {
                requests: 0,
                window_start: Instant::now(),
            });

        // Check if window has expired
        if entry.window_start.elapsed() >= limit.window() {
            entry.requests = 0;
            entry.window_start = Instant::now();
        }

        if entry.requests >= limit.max_requests {
            counter!(RATE_LIMITED, "bucket" => bucket.as_str()).increment(1);
            tracing::debug!(%bucket, client, "rate limited");
            return false;
        }

        entry.requests += 1;
        true
    }

    /// Drop entries whose window ended
    pub fn cleanup(&self) {
        self.entries
            .retain(|(bucket, _), entry| entry.window_start.elapsed() < self.limit(*bucket).window());
    }

    /// Whether [`ClientAddr`] may read forwarding headers
    pub fn trusts_proxy_headers(&self) -> bool {
        self.limits.trust_proxy_headers
    }

    /// Number of tracked (bucket, client) pairs
    pub fn tracked(&self) -> usize {
        self.entries.len()
    }
}

/// Key the limiter counts a request under.
///
/// The TCP peer address is used unless `trust_proxy` is set; only then
/// the first `X-Forwarded-For` hop, then `X-Real-IP` take precedence.
/// Without any of them the key is `"unknown"`.
pub fn client_key(headers: &HeaderMap, peer: Option<SocketAddr>, trust_proxy: bool) -> String {
    let peer = peer.map(|addr| addr.ip().to_string());
    if !trust_proxy {
        return peer.unwrap_or_else(|| "unknown".to_string());
    }

    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|h| h.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    let real_ip = headers
        .get("x-real-ip")
        .and_then(|h| h.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty());

    forwarded
        .or(real_ip)
        .map(str::to_string)
        .or(peer)
        .unwrap_or_else(|| "unknown".to_string())
}

/// Extractor yielding [`client_key`] for the current request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientAddr(pub String);

impl FromRequestParts<Arc<AppState>> for ClientAddr {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);
        Ok(ClientAddr(client_key(
            &parts.headers,
            peer,
            state.rate_limiter.trusts_proxy_headers(),
        )))
    }
}

/// Period of the background cleanup task
pub const CLEANUP_INTERVAL: Duration = Duration::from_secs(5 * 60);
