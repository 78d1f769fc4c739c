//! Token-bucket rate limiter keyed by caller
//!
//! Each key owns a bucket holding up to `capacity` tokens that refills
//! continuously at `refill_per_sec`. A call is admitted when at least one
//! whole token is available, which it then consumes.

use dashmap::DashMap;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;

/// Rate limiter construction errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RateLimitError {
    #[error("invalid rate limit: {0}")]
    InvalidParams(String),
}

#[derive(Debug, Clone, Copy)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

impl Bucket {
    fn full(capacity: f64, now: Instant) -> Self {
        Self {
            tokens: capacity,
            last_refill: now,
        }
    }

    /// Tokens the bucket would hold at `now`, without mutating it
    fn level_at(&self, now: Instant, capacity: f64, rate: f64) -> f64 {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        (self.tokens + elapsed * rate).min(capacity)
    }

    fn refill(&mut self, now: Instant, capacity: f64, rate: f64) {
        self.tokens = self.level_at(now, capacity, rate);
        // Callers racing with slightly older instants must not rewind the clock
        if now > self.last_refill {
            self.last_refill = now;
        }
    }
}

/// Per-key token-bucket limiter
///
/// The bucket map is shared behind an `Arc`; clones observe the same state.
/// Refill and deduction for a key run while holding that key's shard lock,
/// so concurrent callers can never spend the same token twice.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    name: &'static str,
    buckets: Arc<DashMap<String, Bucket>>,
    capacity: f64,
    refill_per_sec: f64,
    max_keys: Option<usize>,
}

impl RateLimiter {
    /// Create a limiter; `capacity` must be at least 1 and the refill rate
    /// non-negative.
    pub fn new(capacity: f64, refill_per_sec: f64) -> Result<Self, RateLimitError> {
        if !capacity.is_finite() || capacity < 1.0 {
            return Err(RateLimitError::InvalidParams(format!(
                "capacity must be a finite number >= 1, got {}",
                capacity
            )));
        }
        if !refill_per_sec.is_finite() || refill_per_sec < 0.0 {
            return Err(RateLimitError::InvalidParams(format!(
                "refill rate must be a finite number >= 0, got {}",
                refill_per_sec
            )));
        }

        Ok(Self {
            name: "default",
            buckets: Arc::new(DashMap::new()),
            capacity,
            refill_per_sec,
            max_keys: None,
        })
    }

    /// Label used in logs and metrics
    pub fn named(mut self, name: &'static str) -> Self {
        self.name = name;
        self
    }

    /// Bound the number of tracked keys
    ///
    /// The bound is soft: callers inserting new keys concurrently may
    /// overshoot it by the number of racing inserts.
    pub fn with_max_keys(mut self, max_keys: usize) -> Self {
        self.max_keys = Some(max_keys.max(1));
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn capacity(&self) -> f64 {
        self.capacity
    }

    pub fn refill_per_sec(&self) -> f64 {
        self.refill_per_sec
    }

    /// Number of keys currently tracked
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Admit or reject one call for `key`
    #[inline]
    pub fn allow(&self, key: &str) -> bool {
        self.allow_at(key, Instant::now())
    }

    /// Admit or reject one call for `key` as of `now`
    pub fn allow_at(&self, key: &str, now: Instant) -> bool {
        if let Some(mut bucket) = self.buckets.get_mut(key) {
            return self.take(&mut bucket, now);
        }

        if let Some(max_keys) = self.max_keys {
            if self.buckets.len() >= max_keys {
                self.make_room(now, max_keys);
            }
        }

        let mut bucket = self
            .buckets
            .entry(key.to_string())
            .or_insert_with(|| Bucket::full(self.capacity, now));
        self.take(&mut bucket, now)
    }

    fn take(&self, bucket: &mut Bucket, now: Instant) -> bool {
        bucket.refill(now, self.capacity, self.refill_per_sec);
        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Drop buckets that have refilled to capacity
    ///
    /// A full bucket behaves exactly like a fresh one, so removing it changes
    /// no future decision. Returns the number of buckets removed.
    pub fn prune_idle(&self, now: Instant) -> usize {
        let before = self.buckets.len();
        let (capacity, rate) = (self.capacity, self.refill_per_sec);
        self.buckets
            .retain(|_, bucket| bucket.level_at(now, capacity, rate) < capacity);
        before.saturating_sub(self.buckets.len())
    }

    fn make_room(&self, now: Instant, max_keys: usize) {
        self.prune_idle(now);

        while self.buckets.len() >= max_keys {
            // Least recently refilled is least recently seen
            let oldest = self
                .buckets
                .iter()
                .min_by_key(|entry| entry.value().last_refill)
                .map(|entry| entry.key().clone());

            match oldest {
                Some(key) => {
                    self.buckets.remove(&key);
                }
                None => break,
            }
        }
    }
}
