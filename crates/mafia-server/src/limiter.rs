use std::time::Instant;

/// Token bucket over the commands of one connection. Starts full, refills
/// continuously, and never holds more than one second's worth of tokens.
pub struct CommandLimiter {
    capacity: f64,
    tokens: f64,
    refill_per_sec: f64,
    last_refill: Instant,
}

impl CommandLimiter {
    pub fn new(per_second: u32) -> Self {
        let capacity = per_second.max(1) as f64;
        Self {
            capacity,
            tokens: capacity,
            refill_per_sec: capacity,
            last_refill: Instant::now(),
        }
    }

    /// Spend one token if the bucket has one.
    pub fn allow(&mut self) -> bool {
        self.allow_at(Instant::now())
    }

    fn allow_at(&mut self, now: Instant) -> bool {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        self.last_refill = now;
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
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
    fn test_burst_up_to_capacity() {
        let mut limiter = CommandLimiter::new(3);
        let now = Instant::now();
        assert!(limiter.allow_at(now));
        assert!(limiter.allow_at(now));
        assert!(limiter.allow_at(now));
        assert!(!limiter.allow_at(now));
    }

    #[test]
    fn test_refills_over_time() {
        let mut limiter = CommandLimiter::new(2);
        let now = Instant::now();
        assert!(limiter.allow_at(now));
        assert!(limiter.allow_at(now));
        assert!(!limiter.allow_at(now));

        // Half a second buys one token back at 2/s.
        let later = now + Duration::from_millis(600);
        assert!(limiter.allow_at(later));
        assert!(!limiter.allow_at(later));
    }

    #[test]
    fn test_idle_does_not_accumulate_past_capacity() {
        let mut limiter = CommandLimiter::new(2);
        let now = Instant::now();
        let much_later = now + Duration::from_secs(60);
        assert!(limiter.allow_at(much_later));
        assert!(limiter.allow_at(much_later));
        assert!(!limiter.allow_at(much_later));
    }

    #[test]
    fn test_zero_rate_still_allows_a_trickle() {
        // A misconfigured rate of 0 is clamped to 1/s rather than locking
        // the connection out entirely.
        let mut limiter = CommandLimiter::new(0);
        let now = Instant::now();
        assert!(limiter.allow_at(now));
        assert!(!limiter.allow_at(now));
        assert!(limiter.allow_at(now + Duration::from_secs(1)));
    }
}
