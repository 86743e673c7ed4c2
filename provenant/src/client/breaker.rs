//! Per-endpoint circuit breaker.

use crate::config::BreakerConfig;
use crate::errors::RemoteErrorKind;
use parking_lot::Mutex;
use std::time::{Duration, Instant};

/// Observable circuit state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Circuit {
    /// Calls flow normally.
    Closed,
    /// Calls fail fast without a network attempt.
    Open,
    /// One trial call is admitted after the cooldown.
    HalfOpen,
}

struct BreakerState {
    circuit: Circuit,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    probe_in_flight: bool,
}

/// Stops calling a failing endpoint for a cooldown window.
///
/// After `failure_threshold` consecutive failures the circuit opens; calls
/// fail immediately until the cooldown elapses, then exactly one trial call
/// is admitted. Trial success closes the circuit and resets the failure
/// count; trial failure reopens it and restarts the cooldown.
pub struct CircuitBreaker {
    failure_threshold: u32,
    cooldown: Duration,
    state: Mutex<BreakerState>,
}

impl CircuitBreaker {
    /// Creates a closed breaker from the endpoint's thresholds.
    #[must_use]
    pub fn new(config: &BreakerConfig) -> Self {
        Self {
            failure_threshold: config.failure_threshold.max(1),
            cooldown: Duration::from_secs(config.cooldown_secs),
            state: Mutex::new(BreakerState {
                circuit: Circuit::Closed,
                consecutive_failures: 0,
                opened_at: None,
                probe_in_flight: false,
            }),
        }
    }

    /// Admits or rejects a call.
    ///
    /// Rejection means the circuit is open (or a half-open trial is already
    /// in flight); no network attempt may be made.
    pub fn try_acquire(&self) -> Result<(), RemoteErrorKind> {
        let mut state = self.state.lock();
        match state.circuit {
            Circuit::Closed => Ok(()),
            Circuit::Open => {
                let elapsed_cooldown = state
                    .opened_at
                    .map_or(true, |at| at.elapsed() >= self.cooldown);
                if elapsed_cooldown {
                    state.circuit = Circuit::HalfOpen;
                    state.probe_in_flight = true;
                    Ok(())
                } else {
                    Err(RemoteErrorKind::CircuitOpen)
                }
            }
            Circuit::HalfOpen => {
                if state.probe_in_flight {
                    Err(RemoteErrorKind::CircuitOpen)
                } else {
                    state.probe_in_flight = true;
                    Ok(())
                }
            }
        }
    }

    /// Records a successful call: closes the circuit and resets counters.
    pub fn record_success(&self) {
        let mut state = self.state.lock();
        state.circuit = Circuit::Closed;
        state.consecutive_failures = 0;
        state.opened_at = None;
        state.probe_in_flight = false;
    }

    /// Records a failed call.
    ///
    /// In half-open state the circuit reopens and the cooldown restarts;
    /// when closed, the consecutive-failure counter advances and trips the
    /// circuit at the threshold.
    pub fn record_failure(&self) {
        let mut state = self.state.lock();
        match state.circuit {
            Circuit::HalfOpen => {
                state.circuit = Circuit::Open;
                state.opened_at = Some(Instant::now());
                state.probe_in_flight = false;
            }
            Circuit::Closed => {
                state.consecutive_failures += 1;
                if state.consecutive_failures >= self.failure_threshold {
                    state.circuit = Circuit::Open;
                    state.opened_at = Some(Instant::now());
                }
            }
            Circuit::Open => {}
        }
    }

    /// Releases a half-open probe slot without recording an outcome.
    ///
    /// Used when an admitted call is cancelled before it resolves, or when
    /// the outcome says nothing about endpoint health (a 4xx answer).
    pub fn abort_probe(&self) {
        let mut state = self.state.lock();
        if state.circuit == Circuit::HalfOpen {
            state.probe_in_flight = false;
        }
    }

    /// Current circuit state, for tests and diagnostics.
    #[must_use]
    pub fn circuit(&self) -> Circuit {
        self.state.lock().circuit
    }

    /// Current consecutive-failure count.
    #[must_use]
    pub fn consecutive_failures(&self) -> u32 {
        self.state.lock().consecutive_failures
    }
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("circuit", &self.circuit())
            .field("consecutive_failures", &self.consecutive_failures())
            .finish()
    }
}
