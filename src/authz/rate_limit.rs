//! Request-volume rate limiting for the auth endpoints.
//!
//! Distinct from the login lockout: this caps how often any one caller may
//! hit the token endpoints at all, regardless of credential validity.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allowed,
    Limited,
}

pub trait RequestLimiter: Send + Sync {
    fn check(&self, caller: &str) -> RateLimitDecision;
}

/// Sliding-window limiter: at most `budget` requests per `window` per
/// caller key (client ip, or "unknown" when no ip could be derived).
pub struct SlidingWindowLimiter {
    window: Duration,
    budget: usize,
    hits: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl SlidingWindowLimiter {
    #[must_use]
    pub fn new(budget: usize, window: Duration) -> Self {
        Self {
            window,
            budget,
            hits: Mutex::new(HashMap::new()),
        }
    }

    #[cfg(test)]
    fn tracked_callers(&self) -> usize {
        self.hits
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }
}

impl RequestLimiter for SlidingWindowLimiter {
    fn check(&self, caller: &str) -> RateLimitDecision {
        let now = Instant::now();
        let mut hits = self.hits.lock().unwrap_or_else(|poisoned| {
            // A poisoned counter map is still a valid counter map.
            poisoned.into_inner()
        });
        // Caller keys come from attacker-controllable headers: drop every
        // entry whose newest hit has left the window so the map stays
        // bounded by active callers.
        hits.retain(|_, window| {
            window
                .back()
                .is_some_and(|hit| now.duration_since(*hit) < self.window)
        });
        let window = hits.entry(caller.to_string()).or_default();
        while window
            .front()
            .is_some_and(|hit| now.duration_since(*hit) >= self.window)
        {
            window.pop_front();
        }
        if window.len() >= self.budget {
            return RateLimitDecision::Limited;
        }
        window.push_back(now);
        RateLimitDecision::Allowed
    }
}

/// Pass-through limiter for tests.
#[derive(Clone, Debug)]
pub struct NoopLimiter;

impl RequestLimiter for NoopLimiter {
    fn check(&self, _caller: &str) -> RateLimitDecision {
        RateLimitDecision::Allowed
    }
}

#[cfg(test)]
mod tests {
    use super::{NoopLimiter, RateLimitDecision, RequestLimiter, SlidingWindowLimiter};
    use std::time::Duration;

    #[test]
    fn budget_exhausts_then_limits() {
        let limiter = SlidingWindowLimiter::new(3, Duration::from_secs(60));
        for _ in 0..3 {
            assert_eq!(limiter.check("1.2.3.4"), RateLimitDecision::Allowed);
        }
        assert_eq!(limiter.check("1.2.3.4"), RateLimitDecision::Limited);
        // Another caller has an independent budget.
        assert_eq!(limiter.check("5.6.7.8"), RateLimitDecision::Allowed);
    }

    #[test]
    fn window_expiry_frees_budget() {
        let limiter = SlidingWindowLimiter::new(1, Duration::from_millis(10));
        assert_eq!(limiter.check("1.2.3.4"), RateLimitDecision::Allowed);
        assert_eq!(limiter.check("1.2.3.4"), RateLimitDecision::Limited);
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(limiter.check("1.2.3.4"), RateLimitDecision::Allowed);
    }

    #[test]
    fn stale_caller_keys_are_dropped() {
        let limiter = SlidingWindowLimiter::new(1, Duration::from_millis(1));
        for n in 0..100 {
            limiter.check(&format!("203.0.113.{n}"));
        }
        std::thread::sleep(Duration::from_millis(10));
        // The next check sweeps out every expired spoofed key.
        assert_eq!(limiter.check("198.51.100.1"), RateLimitDecision::Allowed);
        assert_eq!(limiter.tracked_callers(), 1);
    }

    #[test]
    fn noop_limiter_always_allows() {
        let limiter = NoopLimiter;
        for _ in 0..100 {
            assert_eq!(limiter.check("1.2.3.4"), RateLimitDecision::Allowed);
        }
    }
}
