//! Circuit breaker keyed by `(endpoint, mother account)`.
//!
//! States:
//! - Closed: calls proceed; consecutive failures are counted
//! - Open: calls fail fast until the cool-down elapses
//! - HalfOpen: a single trial call is let through

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;
use tracing::{info, warn};

use seatbroker_core::types::{Clock, MotherId};

/// Breaker state for one `(endpoint, mother)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Normal operation.
    Closed {
        /// Consecutive failures so far.
        failures: u32,
    },
    /// Tripped; calls are rejected.
    Open {
        /// When the circuit opened.
        since: DateTime<Utc>,
    },
    /// Cool-down elapsed; one trial call is in flight.
    HalfOpen,
}

type CircuitKey = (String, MotherId);

/// Table of breaker states, constructed once and shared by reference.
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    states: Arc<Mutex<HashMap<CircuitKey, CircuitState>>>,
    failure_threshold: u32,
    cooldown: Duration,
    clock: Arc<dyn Clock>,
}

impl CircuitBreaker {
    /// Create a breaker that opens after `failure_threshold` consecutive
    /// failures and half-opens after `cooldown`.
    pub fn new(failure_threshold: u32, cooldown: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            states: Arc::new(Mutex::new(HashMap::new())),
            failure_threshold: failure_threshold.max(1),
            cooldown,
            clock,
        }
    }

    /// Whether a call may proceed. Moving from Open to HalfOpen admits
    /// exactly one caller; others keep failing fast until it reports back.
    pub async fn try_acquire(&self, endpoint: &str, mother_id: MotherId) -> bool {
        let mut states = self.states.lock().await;
        let key = (endpoint.to_string(), mother_id);
        match states.get(&key).copied() {
            None | Some(CircuitState::Closed { .. }) => true,
            Some(CircuitState::HalfOpen) => false,
            Some(CircuitState::Open { since }) => {
                if self.clock.now() - since >= self.cooldown {
                    states.insert(key, CircuitState::HalfOpen);
                    info!(endpoint = %endpoint, mother_id = %mother_id, "Circuit half-open, allowing trial call");
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Close the circuit.
    pub async fn record_success(&self, endpoint: &str, mother_id: MotherId) {
        let mut states = self.states.lock().await;
        let previous = states.insert(
            (endpoint.to_string(), mother_id),
            CircuitState::Closed { failures: 0 },
        );
        if matches!(previous, Some(CircuitState::HalfOpen)) {
            info!(endpoint = %endpoint, mother_id = %mother_id, "Circuit closed after trial call");
        }
    }

    /// Count a failure, opening the circuit at the threshold or after a
    /// failed trial call.
    pub async fn record_failure(&self, endpoint: &str, mother_id: MotherId) {
        let now = self.clock.now();
        let mut states = self.states.lock().await;
        let key = (endpoint.to_string(), mother_id);
        let next = match states.get(&key).copied() {
            None => self.after_failures(1, now),
            Some(CircuitState::Closed { failures }) => self.after_failures(failures + 1, now),
            Some(CircuitState::HalfOpen) => CircuitState::Open { since: now },
            Some(open @ CircuitState::Open { .. }) => open,
        };
        if matches!(next, CircuitState::Open { since } if since == now) {
            warn!(endpoint = %endpoint, mother_id = %mother_id, "Circuit opened");
        }
        states.insert(key, next);
    }

    /// Release a half-open slot without judging the endpoint, for calls
    /// that ended with a non-retryable answer.
    pub async fn record_neutral(&self, endpoint: &str, mother_id: MotherId) {
        let mut states = self.states.lock().await;
        let key = (endpoint.to_string(), mother_id);
        if states.get(&key) == Some(&CircuitState::HalfOpen) {
            states.insert(key, CircuitState::Closed { failures: 0 });
        }
    }

    /// Current state, `Closed` for unknown pairs.
    pub async fn state(&self, endpoint: &str, mother_id: MotherId) -> CircuitState {
        self.states
            .lock()
            .await
            .get(&(endpoint.to_string(), mother_id))
            .copied()
            .unwrap_or(CircuitState::Closed { failures: 0 })
    }

    fn after_failures(&self, failures: u32, now: DateTime<Utc>) -> CircuitState {
        if failures >= self.failure_threshold {
            CircuitState::Open { since: now }
        } else {
            CircuitState::Closed { failures }
        }
    }
}
