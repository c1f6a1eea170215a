//! Per-client rate limiting for the request pipeline.
//!
//! Token bucket keyed by client IP: each key owns `capacity` tokens refilled
//! at `refill_rate` tokens per whole elapsed second. The limiter is an
//! explicit component injected into the router state, and a periodic sweep
//! keeps the bucket map bounded under many distinct client keys.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use dashmap::DashMap;

use crate::api::error::rate_limited_response;
use crate::auth::client_key;

/// Rate limiter tuning. Immutable after startup.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Maximum tokens per bucket; also the burst size of a fresh key
    pub capacity: u32,
    /// Tokens added per whole elapsed second
    pub refill_rate: u32,
    /// Soft cap on distinct keys; exceeding it triggers an inline sweep
    pub max_keys: usize,
    /// Buckets idle longer than this are dropped by the sweep
    pub idle_ttl: Duration,
    /// Interval of the background sweep task
    pub sweep_interval: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            capacity: 10,
            refill_rate: 5,
            max_keys: 10_000,
            idle_ttl: Duration::from_secs(10 * 60),
            sweep_interval: Duration::from_secs(60),
        }
    }
}

/// Outcome of an admission check. Never an error: a limiter-internal miss
/// degrades to "denied".
#[derive(Debug, Clone, Copy)]
pub struct RateLimitDecision {
    pub allowed: bool,
    /// Seconds until the bucket's next refill tick; meaningful when denied
    pub retry_after_secs: u64,
}

#[derive(Debug)]
struct Bucket {
    tokens: u32,
    last_refill: Instant,
    last_seen: Instant,
}

impl Bucket {
    fn new(capacity: u32, now: Instant) -> Self {
        Self {
            tokens: capacity,
            last_refill: now,
            last_seen: now,
        }
    }

    /// Add `refill_rate` tokens per whole elapsed second, capped at capacity.
    /// `last_refill` advances by exactly the seconds converted into tokens,
    /// so fractional progress toward the next tick is never lost.
    fn refill(&mut self, capacity: u32, refill_rate: u32, now: Instant) {
        let whole_secs = now.duration_since(self.last_refill).as_secs();
        if whole_secs >= 1 {
            let added = (whole_secs as u128 * refill_rate as u128).min(capacity as u128) as u32;
            self.tokens = self.tokens.saturating_add(added).min(capacity);
            self.last_refill += Duration::from_secs(whole_secs);
        }
    }

    fn try_consume(&mut self, capacity: u32, refill_rate: u32, now: Instant) -> bool {
        self.refill(capacity, refill_rate, now);
        self.last_seen = now;
        if self.tokens > 0 {
            self.tokens -= 1;
            true
        } else {
            false
        }
    }

    /// Seconds until the next whole-second refill tick, minimum 1.
    fn retry_after(&self, now: Instant) -> u64 {
        let since_refill = now.duration_since(self.last_refill);
        let into_tick = since_refill.as_millis() as u64 % 1000;
        (1000 - into_tick).div_ceil(1000).max(1)
    }
}

/// Per-IP token-bucket limiter shared across all request tasks.
///
/// Buckets are created lazily on first sight of a key. Each bucket mutates
/// under its dashmap entry guard, so operations on one key are linearizable
/// while distinct keys proceed without contending on a single lock.
pub struct IpRateLimiter {
    buckets: DashMap<String, Bucket>,
    config: RateLimitConfig,
}

impl IpRateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            buckets: DashMap::new(),
            config,
        }
    }

    /// Admission check for one request from `key`.
    pub fn check(&self, key: &str) -> RateLimitDecision {
        self.check_at(key, Instant::now())
    }

    fn check_at(&self, key: &str, now: Instant) -> RateLimitDecision {
        if !self.buckets.contains_key(key) && self.buckets.len() >= self.config.max_keys {
            // Soft cap: reclaim idle buckets before growing the map.
            self.sweep_at(now);
        }

        let mut bucket = self
            .buckets
            .entry(key.to_string())
            .or_insert_with(|| Bucket::new(self.config.capacity, now));

        if bucket.try_consume(self.config.capacity, self.config.refill_rate, now) {
            RateLimitDecision {
                allowed: true,
                retry_after_secs: 0,
            }
        } else {
            RateLimitDecision {
                allowed: false,
                retry_after_secs: bucket.retry_after(now),
            }
        }
    }

    /// Drop buckets idle longer than the configured TTL. Returns the number
    /// removed.
    pub fn sweep(&self) -> usize {
        self.sweep_at(Instant::now())
    }

    fn sweep_at(&self, now: Instant) -> usize {
        let before = self.buckets.len();
        self.buckets
            .retain(|_, bucket| now.duration_since(bucket.last_seen) < self.config.idle_ttl);
        before - self.buckets.len()
    }

    /// Number of live buckets.
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    pub fn sweep_interval(&self) -> Duration {
        self.config.sweep_interval
    }
}

/// Spawn a background task that sweeps idle buckets periodically.
/// Returns a handle that can be used to abort the task.
pub fn spawn_sweeper(limiter: Arc<IpRateLimiter>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(limiter.sweep_interval());
        loop {
            interval.tick().await;
            let removed = limiter.sweep();
            if removed > 0 {
                tracing::debug!(removed, "Swept idle rate-limit buckets");
            }
        }
    })
}

/// Middleware applying the limiter to every request, allow-listed paths
/// included. Denials short-circuit with 429 and a retry hint.
pub async fn enforce_rate_limit(
    State(limiter): State<Arc<IpRateLimiter>>,
    request: Request,
    next: Next,
) -> Response {
    let key = client_key(&request);
    let decision = limiter.check(&key);

    if decision.allowed {
        next.run(request).await
    } else {
        tracing::debug!(client = %key, path = %request.uri().path(), "Rate limit exceeded");
        rate_limited_response(request.uri().path(), decision.retry_after_secs)
    }
}
