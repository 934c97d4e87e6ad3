//! Delete rate limiting.
//!
//! Paces deletes with a token bucket so a run's load on the store is a
//! configured rate rather than whatever the RPC latency happens to allow.
//! One throttle is shared by all shards of a run.

use std::sync::Mutex;
use std::time::Duration;

use tokio::time::Instant;

/// Token bucket measured in deletes.
#[derive(Debug)]
pub struct TokenBucket {
    capacity: f64,
    tokens: f64,
    refill_per_sec: f64,
    last_refill: Instant,
}

impl TokenBucket {
    /// Create a full bucket with the given capacity and refill rate (tokens/sec).
    pub fn new(capacity: u64, rate_per_sec: f64, now: Instant) -> Self {
        Self {
            capacity: capacity as f64,
            tokens: capacity as f64,
            refill_per_sec: rate_per_sec,
            last_refill: now,
        }
    }

    /// Refill tokens based on elapsed time since last refill.
    pub fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill);
        if !elapsed.is_zero() {
            self.tokens = (self.tokens + elapsed.as_secs_f64() * self.refill_per_sec)
                .min(self.capacity);
            self.last_refill = now;
        }
    }

    /// Take one token, or return how long until one is available.
    pub fn try_take(&mut self, now: Instant) -> Result<(), Duration> {
        self.refill(now);
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            Ok(())
        } else {
            let missing = 1.0 - self.tokens;
            Err(Duration::from_secs_f64(missing / self.refill_per_sec))
        }
    }
}

/// Async delete pacer. A rate of zero disables pacing.
#[derive(Debug)]
pub struct DeleteThrottle {
    bucket: Option<Mutex<TokenBucket>>,
}

impl DeleteThrottle {
    /// Allows `max_per_sec` deletes per second with a burst of one second's worth.
    pub fn new(max_per_sec: u64) -> Self {
        let bucket = (max_per_sec > 0).then(|| {
            Mutex::new(TokenBucket::new(
                max_per_sec,
                max_per_sec as f64,
                Instant::now(),
            ))
        });
        Self { bucket }
    }

    /// A throttle that never waits.
    pub fn unlimited() -> Self {
        Self { bucket: None }
    }

    pub fn is_limited(&self) -> bool {
        self.bucket.is_some()
    }

    /// Wait until one more delete is allowed.
    pub async fn acquire(&self) {
        let Some(bucket) = &self.bucket else {
            return;
        };
        loop {
            let wait = {
                let mut b = bucket.lock().unwrap_or_else(|p| p.into_inner());
                match b.try_take(Instant::now()) {
                    Ok(()) => return,
                    Err(wait) => wait,
                }
            };
            tokio::time::sleep(wait).await;
        }
    }
}
