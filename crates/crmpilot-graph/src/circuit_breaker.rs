//! Fail-fast guard around the hosted model.
//!
//! After `threshold` consecutive upstream failures for a model the circuit
//! opens and turns fail immediately instead of calling the upstream. Once
//! `cooldown` has elapsed a single call is let through as a trial: its
//! success closes the circuit, its failure reopens it for another cooldown.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

pub const DEFAULT_THRESHOLD: u32 = 5;

pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
enum Circuit {
    #[default]
    Closed,
    Open {
        since: Instant,
    },
    /// One trial call is in flight. A trial that never reports back (its turn was
    /// cancelled) is replaced after another cooldown.
    HalfOpen {
        trial_at: Instant,
    },
}

#[derive(Debug, Clone, Default)]
struct CircuitState {
    consecutive_failures: u32,
    circuit: Circuit,
}

/// Per-model circuit breaker, shared across requests
#[derive(Debug)]
pub struct CircuitBreaker {
    threshold: u32,
    cooldown: Duration,
    states: Mutex<HashMap<String, CircuitState>>,
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(DEFAULT_THRESHOLD, DEFAULT_COOLDOWN)
    }
}

impl CircuitBreaker {
    pub fn new(threshold: u32, cooldown: Duration) -> Self {
        Self {
            threshold: threshold.max(1),
            cooldown,
            states: Mutex::new(HashMap::new()),
        }
    }

    fn states(&self) -> MutexGuard<'_, HashMap<String, CircuitState>> {
        // the map is always left consistent, so a poisoned lock is still usable
        self.states.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Whether a call to `model` may go out.
    ///
    /// Always true while closed. After the cooldown exactly one caller gets
    /// `true` and makes the trial call; everyone else is refused until it
    /// reports through [`record_success`](Self::record_success) or
    /// [`record_failure`](Self::record_failure).
    pub fn is_available(&self, model: &str) -> bool {
        let mut states = self.states();
        let Some(state) = states.get_mut(model) else {
            return true;
        };
        match state.circuit {
            Circuit::Closed => true,
            Circuit::Open { since } | Circuit::HalfOpen { trial_at: since } if since.elapsed() >= self.cooldown => {
                tracing::info!(model, "circuit half-open, allowing a trial call");
                state.circuit = Circuit::HalfOpen { trial_at: Instant::now() };
                true
            }
            Circuit::Open { .. } | Circuit::HalfOpen { .. } => false,
        }
    }

    pub fn record_success(&self, model: &str) {
        if let Some(state) = self.states().get_mut(model) {
            if state.circuit != Circuit::Closed {
                tracing::info!(model, "circuit closed");
            }
            state.consecutive_failures = 0;
            state.circuit = Circuit::Closed;
        }
    }

    pub fn record_failure(&self, model: &str) {
        let mut states = self.states();
        let state = states.entry(model.to_string()).or_default();
        state.consecutive_failures += 1;
        match state.circuit {
            Circuit::HalfOpen { .. } => {
                tracing::warn!(model, "trial call failed, circuit reopened");
                state.circuit = Circuit::Open { since: Instant::now() };
            }
            Circuit::Closed if state.consecutive_failures >= self.threshold => {
                tracing::warn!(
                    model,
                    failures = state.consecutive_failures,
                    "circuit opened after consecutive upstream failures"
                );
                state.circuit = Circuit::Open { since: Instant::now() };
            }
            Circuit::Closed | Circuit::Open { .. } => {}
        }
    }

    /// True unless the circuit is closed (a trial call in flight still counts as open)
    pub fn is_open(&self, model: &str) -> bool {
        self.states()
            .get(model)
            .map(|s| s.circuit != Circuit::Closed)
            .unwrap_or(false)
    }
}
