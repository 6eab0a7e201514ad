//! Single global circuit breaker guarding the upstream client (§4.6).

use parking_lot::RwLock;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
}

pub struct CircuitBreaker {
    threshold: u32,
    probe_interval: Duration,
    consecutive_failures: AtomicU32,
    state: RwLock<BreakerState>,
    opened_at: RwLock<Option<Instant>>,
}

impl CircuitBreaker {
    pub fn new(threshold: u32, probe_interval: Duration) -> Self {
        Self {
            threshold,
            probe_interval,
            consecutive_failures: AtomicU32::new(0),
            state: RwLock::new(BreakerState::Closed),
            opened_at: RwLock::new(None),
        }
    }

    /// `true` means the caller may dispatch now. An open breaker allows a
    /// single probe through once `probe_interval` has elapsed since opening.
    pub fn allow_request(&self) -> bool {
        match *self.state.read() {
            BreakerState::Closed => true,
            BreakerState::Open => {
                let opened_at = *self.opened_at.read();
                match opened_at {
                    Some(t) if t.elapsed() >= self.probe_interval => true,
                    _ => false,
                }
            }
        }
    }

    pub fn record_success(&self) {
        self.consecutive_failures.store(0, Ordering::SeqCst);
        *self.state.write() = BreakerState::Closed;
        *self.opened_at.write() = None;
    }

    pub fn record_failure(&self) {
        let failures = self.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1;
        if failures >= self.threshold {
            *self.state.write() = BreakerState::Open;
            // Every failure while open re-arms the probe window, including a
            // failed probe itself — otherwise the first opening timestamp
            // would let every subsequent poll past the initial interval through.
            *self.opened_at.write() = Some(Instant::now());
        }
    }

    pub fn state(&self) -> BreakerState {
        *self.state.read()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opens_after_threshold_consecutive_failures() {
        let breaker = CircuitBreaker::new(3, Duration::from_secs(5));
        breaker.record_failure();
        breaker.record_failure();
        assert!(breaker.allow_request());
        breaker.record_failure();
        assert_eq!(breaker.state(), BreakerState::Open);
        assert!(!breaker.allow_request());
    }

    #[test]
    fn success_resets_breaker() {
        let breaker = CircuitBreaker::new(2, Duration::from_secs(5));
        breaker.record_failure();
        breaker.record_failure();
        assert_eq!(breaker.state(), BreakerState::Open);
        breaker.record_success();
        assert_eq!(breaker.state(), BreakerState::Closed);
        assert!(breaker.allow_request());
    }

    #[test]
    fn probe_allowed_after_interval_elapses() {
        let breaker = CircuitBreaker::new(1, Duration::from_millis(10));
        breaker.record_failure();
        assert!(!breaker.allow_request());
        std::thread::sleep(Duration::from_millis(15));
        assert!(breaker.allow_request());
    }

    #[test]
    fn failed_probe_resets_the_wait_window() {
        let breaker = CircuitBreaker::new(1, Duration::from_millis(10));
        breaker.record_failure();
        std::thread::sleep(Duration::from_millis(15));
        assert!(breaker.allow_request());
        breaker.record_failure();
        assert!(!breaker.allow_request());
        std::thread::sleep(Duration::from_millis(15));
        assert!(breaker.allow_request());
    }
}
