//! DialLimiter: token bucket bounding how fast a pool opens connections.
//!
//! The bucket starts full with one second's worth of tokens and refills
//! continuously. An empty bucket rejects immediately; callers never sleep
//! waiting for a token.

use parking_lot::Mutex;
use tokio::time::Instant;

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

#[derive(Debug)]
pub(crate) struct DialLimiter {
    /// Burst capacity, equal to the per-second rate.
    capacity: f64,
    /// Tokens added per second.
    rate: f64,
    bucket: Mutex<Bucket>,
}

impl DialLimiter {
    pub(crate) fn per_second(rate: u32) -> Self {
        let rate = f64::from(rate.max(1));
        Self {
            capacity: rate,
            rate,
            bucket: Mutex::new(Bucket {
                tokens: rate,
                last_refill: Instant::now(),
            }),
        }
    }

    /// Take a token if one is available.
    pub(crate) fn try_acquire(&self) -> bool {
        let mut bucket = self.bucket.lock();
        let now = Instant::now();
        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.rate).min(self.capacity);
        bucket.last_refill = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn allows_burst_up_to_rate() {
        let limiter = DialLimiter::per_second(3);
        assert!(limiter.try_acquire());
        assert!(limiter.try_acquire());
        assert!(limiter.try_acquire());
        assert!(!limiter.try_acquire());
    }

    #[tokio::test(start_paused = true)]
    async fn refills_over_time() {
        let limiter = DialLimiter::per_second(2);
        assert!(limiter.try_acquire());
        assert!(limiter.try_acquire());
        assert!(!limiter.try_acquire());

        tokio::time::advance(Duration::from_millis(600)).await;
        assert!(limiter.try_acquire());
        assert!(!limiter.try_acquire());
    }

    #[test]
    fn zero_rate_still_admits_one_dial() {
        let limiter = DialLimiter::per_second(0);
        assert!(limiter.try_acquire());
    }
}
