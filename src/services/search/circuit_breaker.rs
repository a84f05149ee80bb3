//! Per-adapter circuit breaker.
//!
//! One breaker instance per adapter, shared by every task that calls
//! it. State lives behind a plain mutex; no lock is ever held across
//! an await point.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::config::BreakerConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

struct BreakerInner {
    state: BreakerState,
    /// Sliding window of call outcomes; `true` = success.
    window: VecDeque<bool>,
    opened_at: Option<Instant>,
    probe_in_flight: bool,
}

pub struct CircuitBreaker {
    failure_ratio: f64,
    window_size: usize,
    cooldown: Duration,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(config: &BreakerConfig) -> Self {
        Self {
            failure_ratio: config.failure_ratio,
            window_size: config.window_size.max(1),
            cooldown: Duration::from_secs(config.cooldown_secs),
            inner: Mutex::new(BreakerInner {
                state: BreakerState::Closed,
                window: VecDeque::new(),
                opened_at: None,
                probe_in_flight: false,
            }),
        }
    }

    /// Whether a call may proceed. While OPEN the answer is no until
    /// the cooldown elapses; then exactly one probe is admitted.
    pub fn try_acquire(&self) -> bool {
        let mut inner = self.inner.lock().expect("breaker lock poisoned");
        match inner.state {
            BreakerState::Closed => true,
            BreakerState::Open => {
                let cooled_down = inner
                    .opened_at
                    .map(|t| t.elapsed() >= self.cooldown)
                    .unwrap_or(true);
                if cooled_down {
                    inner.state = BreakerState::HalfOpen;
                    inner.probe_in_flight = true;
                    true
                } else {
                    false
                }
            },
            BreakerState::HalfOpen => {
                if inner.probe_in_flight {
                    false
                } else {
                    inner.probe_in_flight = true;
                    true
                }
            },
        }
    }

    pub fn on_success(&self) {
        let mut inner = self.inner.lock().expect("breaker lock poisoned");
        match inner.state {
            BreakerState::HalfOpen => {
                inner.state = BreakerState::Closed;
                inner.window.clear();
                inner.opened_at = None;
                inner.probe_in_flight = false;
            },
            _ => self.push_outcome(&mut inner, true),
        }
    }

    pub fn on_failure(&self) {
        let mut inner = self.inner.lock().expect("breaker lock poisoned");
        match inner.state {
            BreakerState::HalfOpen => {
                inner.state = BreakerState::Open;
                inner.opened_at = Some(Instant::now());
                inner.probe_in_flight = false;
            },
            _ => {
                self.push_outcome(&mut inner, false);
                if inner.window.len() >= self.window_size {
                    let failures = inner.window.iter().filter(|ok| !**ok).count();
                    let ratio = failures as f64 / inner.window.len() as f64;
                    if ratio >= self.failure_ratio {
                        inner.state = BreakerState::Open;
                        inner.opened_at = Some(Instant::now());
                        inner.window.clear();
                    }
                }
            },
        }
    }

    pub fn state(&self) -> BreakerState {
        self.inner.lock().expect("breaker lock poisoned").state
    }

    /// Force OPEN regardless of history (used when an upstream bans us).
    pub fn trip(&self) {
        let mut inner = self.inner.lock().expect("breaker lock poisoned");
        inner.state = BreakerState::Open;
        inner.opened_at = Some(Instant::now());
        inner.window.clear();
        inner.probe_in_flight = false;
    }

    fn push_outcome(&self, inner: &mut BreakerInner, ok: bool) {
        inner.window.push_back(ok);
        while inner.window.len() > self.window_size {
            inner.window.pop_front();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(failure_ratio: f64, window_size: usize, cooldown_secs: u64) -> CircuitBreaker {
        CircuitBreaker::new(&BreakerConfig { failure_ratio, window_size, cooldown_secs })
    }

    #[test]
    fn stays_closed_below_the_failure_ratio() {
        let b = breaker(0.5, 4, 30);
        b.on_failure();
        b.on_success();
        b.on_success();
        b.on_failure();
        // 2/4 failures is at the ratio boundary only when >= 0.5; the
        // last outcome decides.
        assert_eq!(b.state(), BreakerState::Open);

        let b = breaker(0.75, 4, 30);
        b.on_failure();
        b.on_success();
        b.on_success();
        b.on_failure();
        assert_eq!(b.state(), BreakerState::Closed);
        assert!(b.try_acquire());
    }

    #[test]
    fn trips_open_and_blocks_calls() {
        let b = breaker(0.5, 2, 60);
        b.on_failure();
        b.on_failure();
        assert_eq!(b.state(), BreakerState::Open);
        assert!(!b.try_acquire());
        assert!(!b.try_acquire());
    }

    #[test]
    fn admits_a_single_probe_after_cooldown() {
        let b = breaker(0.5, 2, 0);
        b.on_failure();
        b.on_failure();
        assert_eq!(b.state(), BreakerState::Open);

        // Cooldown of zero: next acquire transitions to HALF_OPEN.
        assert!(b.try_acquire());
        assert_eq!(b.state(), BreakerState::HalfOpen);
        // Second caller is rejected while the probe is in flight.
        assert!(!b.try_acquire());

        b.on_success();
        assert_eq!(b.state(), BreakerState::Closed);
        assert!(b.try_acquire());
    }

    #[test]
    fn failed_probe_reopens() {
        let b = breaker(0.5, 2, 0);
        b.on_failure();
        b.on_failure();
        assert!(b.try_acquire());
        b.on_failure();
        assert_eq!(b.state(), BreakerState::Open);
    }

    #[test]
    fn manual_trip_blocks_immediately() {
        let b = breaker(0.5, 10, 60);
        assert!(b.try_acquire());
        b.trip();
        assert!(!b.try_acquire());
    }
}
