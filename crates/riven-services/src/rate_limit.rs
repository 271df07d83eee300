//! Per-backend token-bucket rate limiter (C1, "Shared resources").
//!
//! A token-bucket limiter shared across a backend's workers, using the
//! familiar burst/replenish-period shape rather than a fixed-window counter.

use std::sync::Mutex;
use std::time::Duration;
use tokio::time::{sleep, Instant};

/// Configuration for a single backend's limiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Maximum burst of requests allowed with a full bucket.
    pub burst: u32,
    /// Duration between token replenishments (one token per period).
    pub replenish_period: Duration,
}

struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

/// A token-bucket limiter shared across all workers hitting one backend.
pub struct TokenBucketLimiter {
    config: RateLimitConfig,
    bucket: Mutex<Bucket>,
}

impl TokenBucketLimiter {
    /// Construct a limiter starting with a full bucket.
    #[must_use]
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            bucket: Mutex::new(Bucket {
                    tokens: f64::from(config.burst),
                    last_refill: Instant::now(),
            }),
        }
    }

    /// Blocks until a token is available, then consumes it.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut bucket = self.bucket.lock().expect("rate limiter mutex poisoned");
                self.refill(&mut bucket);
                if bucket.tokens >= 1.0 {
                    bucket.tokens -= 1.0;
                    None
                } else {
                    Some(self.config.replenish_period)
                }
            };
            match wait {
                None => return,
                Some(duration) => sleep(duration).await,
            }
        }
    }

    fn refill(&self, bucket: &mut Bucket) {
        let elapsed = bucket.last_refill.elapsed();
        if elapsed.is_zero() {
            return;
        }
        let period_secs = self.config.replenish_period.as_secs_f64().max(f64::EPSILON);
        let earned = elapsed.as_secs_f64() / period_secs;
        bucket.tokens = (bucket.tokens + earned).min(f64::from(self.config.burst));
        bucket.last_refill = Instant::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::Instant as TokioInstant;

    #[tokio::test(start_paused = true)]
    async fn burst_is_immediate_then_spaced() {
        let limiter = TokenBucketLimiter::new(RateLimitConfig {
                burst: 1,
                replenish_period: Duration::from_secs(1),
        });

        let start = TokioInstant::now();
        limiter.acquire().await;
        assert!(start.elapsed() < Duration::from_millis(10));

        limiter.acquire().await;
        assert!(start.elapsed() >= Duration::from_secs(1));
    }
}
