use std::time::Instant;

use serde::{Deserialize, Serialize};

/// Per-provider breaker configuration (§4.3). Defaults match the spec's
/// named defaults; the teacher's own cooldown buckets (short for 5xx/
/// timeout, ~forever for auth failures) inform how callers typically tune
/// `open_duration_secs` per error class rather than this struct itself.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BreakerParams {
    pub failure_threshold: u32,
    pub success_threshold: u32,
    pub open_duration_secs: u64,
    pub half_open_ceiling: u32,
}

impl Default for BreakerParams {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 3,
            open_duration_secs: 60,
            half_open_ceiling: 3,
        }
    }
}

/// The three states from §4.3. Transitions are driven entirely by reads:
/// there is no background task flipping `Open` back to `HalfOpen`, the
/// check happens the moment something asks whether the breaker admits.
/// Grounded on the teacher's lazy `CredentialState::Unavailable { until }`
/// check performed at acquire time, rather than its background
/// `UnavailableQueue` recovery task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

/// Mutable breaker bookkeeping for one provider.
#[derive(Debug, Clone)]
pub struct CircuitStatus {
    state: CircuitState,
    consecutive_failures: u32,
    consecutive_successes: u32,
    opened_at: Option<Instant>,
    params: BreakerParams,
    half_open_in_flight: u32,
}

impl CircuitStatus {
    pub fn new(params: BreakerParams) -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            consecutive_successes: 0,
            opened_at: None,
            params,
            half_open_in_flight: 0,
        }
    }

    /// Resolves the effective state as of `now`, lazily moving `Open` to
    /// `HalfOpen` once `open_duration_secs` has elapsed.
    pub fn effective_state(&mut self, now: Instant) -> CircuitState {
        if self.state == CircuitState::Open {
            if let Some(opened_at) = self.opened_at {
                let deadline =
                    opened_at + std::time::Duration::from_secs(self.params.open_duration_secs);
                if now >= deadline {
                    self.state = CircuitState::HalfOpen;
                    self.half_open_in_flight = 0;
                    self.consecutive_successes = 0;
                }
            }
        }
        self.state
    }

    /// Returns `true` if a new attempt may be admitted right now. HalfOpen
    /// admits only up to `half_open_ceiling` concurrently.
    pub fn admit(&mut self, now: Instant) -> bool {
        match self.effective_state(now) {
            CircuitState::Closed => true,
            CircuitState::Open => false,
            CircuitState::HalfOpen => {
                if self.half_open_in_flight < self.params.half_open_ceiling {
                    self.half_open_in_flight += 1;
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Records a success. In `half_open`, `success_threshold` consecutive
    /// successes are required to close; any failure in between resets the
    /// count (enforced by `record_failure` re-opening immediately).
    pub fn record_success(&mut self, now: Instant) {
        let _ = now;
        match self.state {
            CircuitState::Closed => {
                self.consecutive_failures = 0;
            }
            CircuitState::HalfOpen => {
                self.half_open_in_flight = self.half_open_in_flight.saturating_sub(1);
                self.consecutive_successes += 1;
                if self.consecutive_successes >= self.params.success_threshold {
                    self.state = CircuitState::Closed;
                    self.consecutive_failures = 0;
                    self.consecutive_successes = 0;
                    self.opened_at = None;
                }
            }
            CircuitState::Open => {}
        }
    }

    pub fn record_failure(&mut self, now: Instant) {
        match self.state {
            CircuitState::HalfOpen => {
                self.half_open_in_flight = self.half_open_in_flight.saturating_sub(1);
                self.state = CircuitState::Open;
                self.opened_at = Some(now);
                self.consecutive_successes = 0;
                self.consecutive_failures += 1;
            }
            CircuitState::Closed => {
                self.consecutive_failures += 1;
                if self.consecutive_failures >= self.params.failure_threshold {
                    self.state = CircuitState::Open;
                    self.opened_at = Some(now);
                }
            }
            CircuitState::Open => {
                self.consecutive_failures += 1;
            }
        }
    }

    pub fn state(&self) -> CircuitState {
        self.state
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn params(failure_threshold: u32, success_threshold: u32, open_duration_secs: u64, half_open_ceiling: u32) -> BreakerParams {
        BreakerParams {
            failure_threshold,
            success_threshold,
            open_duration_secs,
            half_open_ceiling,
        }
    }

    #[test]
    fn opens_after_threshold_failures() {
        let mut status = CircuitStatus::new(params(3, 3, 10, 1));
        let t0 = Instant::now();
        assert!(status.admit(t0));
        status.record_failure(t0);
        status.record_failure(t0);
        assert_eq!(status.state(), CircuitState::Closed);
        status.record_failure(t0);
        assert_eq!(status.state(), CircuitState::Open);
        assert!(!status.admit(t0));
    }

    #[test]
    fn success_resets_consecutive_failures_in_closed() {
        let mut status = CircuitStatus::new(params(3, 3, 10, 1));
        let t0 = Instant::now();
        status.record_failure(t0);
        status.record_failure(t0);
        status.record_success(t0);
        assert_eq!(status.consecutive_failures(), 0);
        status.record_failure(t0);
        status.record_failure(t0);
        assert_eq!(status.state(), CircuitState::Closed);
    }

    #[test]
    fn half_open_requires_success_threshold_consecutive_successes_to_close() {
        let mut status = CircuitStatus::new(params(1, 2, 5, 3));
        let t0 = Instant::now();
        status.record_failure(t0);
        assert_eq!(status.state(), CircuitState::Open);

        let still_open = t0 + Duration::from_secs(1);
        assert!(!status.admit(still_open));

        let past_cooldown = t0 + Duration::from_secs(6);
        assert!(status.admit(past_cooldown));
        assert_eq!(status.state(), CircuitState::HalfOpen);

        status.record_success(past_cooldown);
        assert_eq!(status.state(), CircuitState::HalfOpen);

        assert!(status.admit(past_cooldown));
        status.record_success(past_cooldown);
        assert_eq!(status.state(), CircuitState::Closed);
    }

    #[test]
    fn half_open_ceiling_limits_concurrent_probes() {
        let mut status = CircuitStatus::new(params(1, 3, 1, 2));
        let t0 = Instant::now();
        status.record_failure(t0);
        let probe_time = t0 + Duration::from_secs(2);
        assert!(status.admit(probe_time));
        assert!(status.admit(probe_time));
        assert!(!status.admit(probe_time));
    }

    #[test]
    fn half_open_failure_reopens_immediately() {
        let mut status = CircuitStatus::new(params(1, 3, 1, 1));
        let t0 = Instant::now();
        status.record_failure(t0);
        let probe_time = t0 + Duration::from_secs(2);
        assert!(status.admit(probe_time));
        status.record_failure(probe_time);
        assert_eq!(status.state(), CircuitState::Open);
    }
}
