use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Admits at most `max_requests` within any trailing `window`
pub struct RollingWindowLimiter {
    max_requests: usize,
    window: Duration,
    hits: Mutex<VecDeque<Instant>>,
}

impl RollingWindowLimiter {
    #[must_use]
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            hits: Mutex::new(VecDeque::with_capacity(max_requests.min(1024))),
        }
    }

    /// Record a request if quota remains
    pub fn try_acquire(&self) -> bool {
        self.try_acquire_at(Instant::now())
    }

    fn try_acquire_at(&self, now: Instant) -> bool {
        if self.max_requests == 0 {
            return false;
        }
        let Ok(mut hits) = self.hits.lock() else {
            return false;
        };
        while hits
            .front()
            .is_some_and(|&oldest| now.saturating_duration_since(oldest) >= self.window)
        {
            hits.pop_front();
        }
        if hits.len() >= self.max_requests {
            return false;
        }
        hits.push_back(now);
        true
    }
}
