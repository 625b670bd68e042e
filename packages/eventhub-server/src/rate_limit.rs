//! Per-user sliding-window rate limiter.
//!
//! Each key keeps the timestamps of its recent hits; a hit is allowed while
//! fewer than `max` of them fall inside the window.

use std::collections::VecDeque;
use std::sync::Arc;

use dashmap::DashMap;

/// Result of a successful check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitStatus {
    /// Hits left in the current window after this one
    pub remaining: usize,
}

/// A rejected hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitExceeded {
    /// Seconds until the oldest hit leaves the window
    pub retry_after_secs: u64,
}

#[derive(Clone)]
pub struct RateLimiter {
    max: usize,
    window_secs: i64,
    hits: Arc<DashMap<String, VecDeque<i64>>>,
}

impl RateLimiter {
    pub fn new(max: usize, window_secs: i64) -> Self {
        Self {
            max,
            window_secs: window_secs.max(1),
            hits: Arc::new(DashMap::new()),
        }
    }

    /// Record a hit for `key` at `now` (unix seconds) if the limit allows.
    pub fn check(&self, key: &str, now: i64) -> Result<RateLimitStatus, RateLimitExceeded> {
        let mut entry = self.hits.entry(key.to_string()).or_default();
        let window_start = now - self.window_secs;
        while entry.front().map_or(false, |&t| t <= window_start) {
            entry.pop_front();
        }

        if entry.len() >= self.max {
            let oldest = entry.front().copied().unwrap_or(now);
            let retry = (oldest + self.window_secs - now).max(1);
            return Err(RateLimitExceeded {
                retry_after_secs: retry as u64,
            });
        }

        entry.push_back(now);
        Ok(RateLimitStatus {
            remaining: self.max - entry.len(),
        })
    }

    /// Drop keys with no hits inside the window.
    pub fn prune(&self, now: i64) {
        let window_start = now - self.window_secs;
        self.hits
            .retain(|_, hits| hits.back().map_or(false, |&t| t > window_start));
    }

    pub fn tracked_keys(&self) -> usize {
        self.hits.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allows_up_to_max() {
        let limiter = RateLimiter::new(3, 3600);
        assert_eq!(limiter.check("u", 100).unwrap().remaining, 2);
        assert_eq!(limiter.check("u", 101).unwrap().remaining, 1);
        assert_eq!(limiter.check("u", 102).unwrap().remaining, 0);

        let err = limiter.check("u", 200).unwrap_err();
        assert_eq!(err.retry_after_secs, 3500);

        // Other keys are independent
        assert!(limiter.check("v", 200).is_ok());
    }

    #[test]
    fn test_window_slides() {
        let limiter = RateLimiter::new(1, 60);
        assert!(limiter.check("u", 0).is_ok());
        assert!(limiter.check("u", 59).is_err());
        assert!(limiter.check("u", 60).is_ok());
    }

    #[test]
    fn test_prune() {
        let limiter = RateLimiter::new(1, 60);
        limiter.check("a", 0).unwrap();
        limiter.check("b", 50).unwrap();
        limiter.prune(100);
        assert_eq!(limiter.tracked_keys(), 1);
    }
}
