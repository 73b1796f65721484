//! Client-side token bucket shared by every model call.
//!
//! Spreads requests at the provider's documented rate instead of sleeping a
//! fixed interval between pipeline steps.

use tokio::sync::Mutex;
use tokio::time::{Duration, Instant};

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

#[derive(Debug)]
pub struct RateLimiter {
    /// Tokens added per second; `None` disables limiting.
    refill_per_sec: Option<f64>,
    capacity: f64,
    bucket: Mutex<Bucket>,
}

impl RateLimiter {
    /// `requests_per_minute == 0` means unlimited. A burst of 0 is treated as 1.
    pub fn new(requests_per_minute: u32, burst: u32) -> Self {
        let capacity = f64::from(burst.max(1));
        let refill_per_sec = (requests_per_minute > 0).then(|| f64::from(requests_per_minute) / 60.0);
        Self {
            refill_per_sec,
            capacity,
            bucket: Mutex::new(Bucket {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
        }
    }

    pub fn unlimited() -> Self {
        Self::new(0, 1)
    }

    /// Waits until a request may be sent and consumes one token.
    ///
    /// The lock is held across the wait so callers are served in order.
    pub async fn acquire(&self) -> Duration {
        let Some(rate) = self.refill_per_sec else {
            return Duration::ZERO;
        };

        let mut bucket = self.bucket.lock().await;
        self.refill(&mut bucket, rate);

        let mut waited = Duration::ZERO;
        if bucket.tokens < 1.0 {
            let wait = Duration::from_secs_f64((1.0 - bucket.tokens) / rate);
            tracing::debug!(wait_ms = wait.as_millis() as u64, "rate limiter pacing request");
            tokio::time::sleep(wait).await;
            waited = wait;
            self.refill(&mut bucket, rate);
            // Float rounding can leave the bucket a hair short of a whole token.
            bucket.tokens = bucket.tokens.max(1.0);
        }
        bucket.tokens -= 1.0;
        waited
    }

    fn refill(&self, bucket: &mut Bucket, rate: f64) {
        let now = Instant::now();
        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * rate).min(self.capacity);
        bucket.last_refill = now;
    }
}
