/// Per-email token bucket
///
/// Guards the flows that send mail on demand (resend confirmation, forgot
/// password). Each key starts with a full bucket of `capacity` tokens; a
/// request consumes one and tokens trickle back at `refill_per_minute`.
/// State is in-process only. The number of tracked emails is capped at
/// `max_keys`: refilled buckets go first, then the fullest ones.
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::time::Instant;

use super::config::ThrottleConfig;

#[derive(Debug, Clone)]
struct TokenBucket {
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    fn full(capacity: u32, now: Instant) -> Self {
        Self {
            tokens: f64::from(capacity),
            last_refill: now,
        }
    }

    fn refill(&mut self, rate_per_sec: f64, capacity: u32, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * rate_per_sec).min(f64::from(capacity));
        self.last_refill = now;
    }

    fn try_consume(&mut self) -> bool {
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    fn seconds_until_available(&self, rate_per_sec: f64) -> u64 {
        let deficit = 1.0 - self.tokens;
        if deficit <= 0.0 || rate_per_sec <= 0.0 {
            0
        } else {
            (deficit / rate_per_sec).ceil() as u64
        }
    }
}

/// Keyed token buckets
#[derive(Debug)]
pub struct Throttle {
    config: ThrottleConfig,
    buckets: Mutex<HashMap<String, TokenBucket>>,
}

impl Throttle {
    pub fn new(config: ThrottleConfig) -> Self {
        Self {
            config,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// Takes a token for `key`
    ///
    /// # Errors
    ///
    /// Returns the number of seconds until a token is available.
    /// A zero-capacity throttle never admits anything.
    pub fn check(&self, key: &str) -> Result<(), u64> {
        let rate = f64::from(self.config.refill_per_minute) / 60.0;
        let now = Instant::now();

        let mut buckets = self
            .buckets
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if !buckets.contains_key(key) && buckets.len() >= self.config.max_keys.max(1) {
            self.evict(&mut buckets, rate, now);
        }

        let bucket = buckets
            .entry(key.to_string())
            .or_insert_with(|| TokenBucket::full(self.config.capacity, now));
        bucket.refill(rate, self.config.capacity, now);

        if bucket.try_consume() {
            Ok(())
        } else {
            Err(bucket.seconds_until_available(rate).max(1))
        }
    }

    /// Drops buckets that have refilled completely
    pub fn prune(&self) {
        let rate = f64::from(self.config.refill_per_minute) / 60.0;
        let capacity = self.config.capacity;
        let now = Instant::now();

        let mut buckets = self
            .buckets
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        buckets.retain(|_, bucket| {
            bucket.refill(rate, capacity, now);
            bucket.tokens < f64::from(capacity)
        });
    }

    /// Shrinks the map to three quarters of `max_keys`
    fn evict(&self, buckets: &mut HashMap<String, TokenBucket>, rate: f64, now: Instant) {
        let capacity = self.config.capacity;
        buckets.retain(|_, bucket| {
            bucket.refill(rate, capacity, now);
            bucket.tokens < f64::from(capacity)
        });

        let max_keys = self.config.max_keys.max(1);
        let target = max_keys - max_keys / 4;
        if buckets.len() < target {
            return;
        }

        let mut by_tokens: Vec<(String, f64)> = buckets
            .iter()
            .map(|(key, bucket)| (key.clone(), bucket.tokens))
            .collect();
        by_tokens.sort_by(|a, b| b.1.total_cmp(&a.1));

        let excess = buckets.len() + 1 - target;
        for (key, _) in by_tokens.into_iter().take(excess) {
            buckets.remove(&key);
        }
        tracing::debug!(tracked = buckets.len(), "Throttle evicted buckets");
    }

    #[cfg(test)]
    fn tracked(&self) -> usize {
        self.buckets.lock().map(|b| b.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_burst_then_block() {
        let throttle = Throttle::new(ThrottleConfig {
            capacity: 3,
            refill_per_minute: 1,
            max_keys: 16,
        });

        for _ in 0..3 {
            assert!(throttle.check("ada@x.com").is_ok());
        }
        let wait = throttle.check("ada@x.com").unwrap_err();
        assert!(wait > 0 && wait <= 60, "wait was {}", wait);

        // other keys are independent
        assert!(throttle.check("bob@x.com").is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_refill_over_time() {
        let throttle = Throttle::new(ThrottleConfig {
            capacity: 1,
            refill_per_minute: 1,
            max_keys: 16,
        });

        assert!(throttle.check("ada@x.com").is_ok());
        assert!(throttle.check("ada@x.com").is_err());

        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(throttle.check("ada@x.com").is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_prune_forgets_full_buckets() {
        let throttle = Throttle::new(ThrottleConfig {
            capacity: 2,
            refill_per_minute: 60,
            max_keys: 16,
        });
        throttle.check("ada@x.com").unwrap();
        throttle.prune();
        assert_eq!(throttle.tracked(), 1);

        tokio::time::advance(Duration::from_secs(5)).await;
        throttle.prune();
        assert_eq!(throttle.tracked(), 0);
    }

    #[tokio::test]
    async fn test_zero_capacity_blocks() {
        let throttle = Throttle::new(ThrottleConfig {
            capacity: 0,
            refill_per_minute: 0,
            max_keys: 16,
        });
        assert!(throttle.check("ada@x.com").is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_tracked_keys_are_bounded() {
        let throttle = Throttle::new(ThrottleConfig::default());

        for i in 0..10_000 {
            assert!(throttle.check(&format!("ghost{}@x.com", i)).is_ok());
        }
        assert!(throttle.tracked() <= 4096, "tracked {}", throttle.tracked());

        // eviction drops the fullest buckets, so a drained key stays limited
        let throttle = Throttle::new(ThrottleConfig {
            capacity: 2,
            refill_per_minute: 1,
            max_keys: 4,
        });
        throttle.check("ada@x.com").unwrap();
        throttle.check("ada@x.com").unwrap();
        for i in 0..5 {
            throttle.check(&format!("ghost{}@x.com", i)).unwrap();
        }
        assert!(throttle.tracked() <= 4);
        assert!(throttle.check("ada@x.com").is_err());
    }
}
