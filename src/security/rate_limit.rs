//! Per-identity token-bucket rate limiting.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::config::RateLimitConfig;
use crate::lifecycle::{Sweeper, SweeperSlot};
use crate::observability::Metrics;

/// A continuous token bucket.
///
/// Invariant: `0.0 <= tokens <= capacity`.
#[derive(Debug, Clone)]
struct TokenBucket {
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    fn new(capacity: f64, now: Instant) -> Self {
        Self {
            tokens: capacity,
            last_refill: now,
        }
    }

    fn try_acquire(&mut self, capacity: f64, refill_per_sec: f64, now: Instant) -> bool {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();

        self.tokens = (self.tokens + elapsed * refill_per_sec).min(capacity);
        self.last_refill = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

/// In-memory rate limiter keyed by resolved client identity.
pub struct RateLimiter {
    buckets: Mutex<HashMap<String, TokenBucket>>,
    requests_per_minute: u32,
    capacity: f64,
    refill_per_sec: f64,
    idle_retention: Duration,
    sweep_interval: Duration,
    pub(crate) sweeper: SweeperSlot,
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            buckets: Mutex::new(HashMap::new()),
            requests_per_minute: config.requests_per_minute,
            capacity: config.burst_size as f64,
            refill_per_sec: config.requests_per_minute as f64 / 60.0,
            idle_retention: Duration::from_secs(config.idle_retention_secs),
            sweep_interval: Duration::from_secs(config.sweep_interval_secs),
            sweeper: SweeperSlot::new(),
        }
    }

    /// Shorthand for a limiter with default retention and sweep settings.
    pub fn with_rate(requests_per_minute: u32, burst_size: u32) -> Self {
        Self::new(&RateLimitConfig {
            requests_per_minute,
            burst_size,
            ..RateLimitConfig::default()
        })
    }

    /// Admit or reject one request from `identity`.
    pub fn allow(&self, identity: &str) -> bool {
        self.allow_at(identity, Instant::now())
    }

    pub(crate) fn allow_at(&self, identity: &str, now: Instant) -> bool {
        let mut buckets = self.lock_buckets();

        if let Some(bucket) = buckets.get_mut(identity) {
            return bucket.try_acquire(self.capacity, self.refill_per_sec, now);
        }

        let mut bucket = TokenBucket::new(self.capacity, now);
        let allowed = bucket.try_acquire(self.capacity, self.refill_per_sec, now);
        buckets.insert(identity.to_string(), bucket);
        allowed
    }

    /// Configured sustained rate, for `X-RateLimit-Limit`.
    pub fn limit(&self) -> u32 {
        self.requests_per_minute
    }

    /// Seconds until a drained bucket earns its next token.
    pub fn retry_after_secs(&self) -> u64 {
        match self.requests_per_minute {
            0 => 60,
            rpm => 60u64.div_ceil(u64::from(rpm)),
        }
    }

    /// Current token count for `identity`, if a bucket exists.
    pub fn tokens(&self, identity: &str) -> Option<f64> {
        self.lock_buckets().get(identity).map(|b| b.tokens)
    }

    /// Drop buckets untouched for longer than the retention window.
    pub fn evict_idle(&self) -> usize {
        self.evict_idle_at(Instant::now())
    }

    pub(crate) fn evict_idle_at(&self, now: Instant) -> usize {
        let mut buckets = self.lock_buckets();
        let before = buckets.len();
        buckets.retain(|_, b| now.saturating_duration_since(b.last_refill) < self.idle_retention);
        before - buckets.len()
    }

    /// Start the periodic idle-bucket eviction. Idempotent.
    pub fn start(self: &Arc<Self>, metrics: Arc<Metrics>) {
        self.sweeper.start_with(|| {
            Sweeper::spawn(
                "rate_limit",
                self,
                self.sweep_interval,
                move |limiter: Arc<RateLimiter>| {
                    let metrics = metrics.clone();
                    async move {
                        let removed = limiter.evict_idle();
                        if removed > 0 {
                            tracing::debug!(removed, "Evicted idle rate-limit buckets");
                            metrics.record_sweep("rate_limit", removed as u64);
                        }
                    }
                },
            )
        });
    }

    /// Stop the eviction task and wait for it to exit.
    pub async fn stop(&self, grace: Duration) {
        self.sweeper.stop(grace).await;
    }

    /// Bucket state stays within its invariant even if a holder panicked.
    fn lock_buckets(&self) -> MutexGuard<'_, HashMap<String, TokenBucket>> {
        self.buckets.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
