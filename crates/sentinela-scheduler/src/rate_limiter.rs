//! Sliding-window rate limiter for outbound upstream calls (§4.6), ported
//! from the Python `HubSoftRateLimiter`'s window/record logic.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

pub struct RateLimiter {
    max_requests_per_minute: u32,
    window: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn new(max_requests_per_minute: u32) -> Self {
        Self {
            max_requests_per_minute,
            window: Mutex::new(VecDeque::new()),
        }
    }

    fn evict_stale(&self, window: &mut VecDeque<Instant>, now: Instant) {
        while let Some(oldest) = window.front() {
            if now.duration_since(*oldest) > Duration::from_secs(60) {
                window.pop_front();
            } else {
                break;
            }
        }
    }

    pub fn can_make_request(&self) -> bool {
        let mut window = self.window.lock();
        self.evict_stale(&mut window, Instant::now());
        (window.len() as u32) < self.max_requests_per_minute
    }

    pub fn record_call(&self) {
        self.window.lock().push_back(Instant::now());
    }

    /// Blocks until a call is permitted, checking at least every 100ms.
    pub async fn wait_for_budget(&self) {
        loop {
            let wait = {
                let mut window = self.window.lock();
                let now = Instant::now();
                self.evict_stale(&mut window, now);
                if (window.len() as u32) < self.max_requests_per_minute {
                    None
                } else {
                    let oldest = *window.front().expect("window full implies non-empty");
                    let elapsed = now.duration_since(oldest);
                    let remaining = Duration::from_secs(60).saturating_sub(elapsed);
                    Some(remaining.max(Duration::from_millis(100)))
                }
            };
            match wait {
                None => return,
                Some(d) => tokio::time::sleep(d).await,
            }
        }
    }

    pub fn current_load(&self) -> u32 {
        let mut window = self.window.lock();
        self.evict_stale(&mut window, Instant::now());
        window.len() as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn budget_available_when_window_is_empty() {
        let limiter = RateLimiter::new(30);
        assert!(limiter.can_make_request());
        limiter.wait_for_budget().await;
    }

    #[test]
    fn exhausting_budget_blocks_further_requests() {
        let limiter = RateLimiter::new(2);
        limiter.record_call();
        limiter.record_call();
        assert!(!limiter.can_make_request());
    }
}
