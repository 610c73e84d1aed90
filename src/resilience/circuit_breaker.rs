//! # Circuit Breaker Implementation
//!
//! Classic three-state circuit breaker (Closed, Open, HalfOpen) guarding a
//! single phase. Failures increment a counter; reaching the threshold opens
//! the circuit; while open, attempts are rejected without contacting the
//! phase; once the cooldown has elapsed since the last failure, the next
//! attempt probes in half-open mode and a probe success closes the circuit
//! and resets the counter.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Circuit breaker states representing the current operational mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Normal operation - calls are allowed through
    Closed = 0,
    /// Failure mode - calls are rejected without executing
    Open = 1,
    /// Cooldown elapsed - a single probe call is allowed
    HalfOpen = 2,
}

impl From<u8> for CircuitState {
    fn from(value: u8) -> Self {
        match value {
            0 => CircuitState::Closed,
            2 => CircuitState::HalfOpen,
            _ => CircuitState::Open,
        }
    }
}

/// Configuration parameters for a circuit breaker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the circuit
    pub failure_threshold: u32,
    /// Rejection window measured from the last recorded failure
    pub cooldown: Duration,
    /// Number of open/close transitions retained for diagnostics
    pub transition_history: usize,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            cooldown: Duration::from_secs(30),
            transition_history: 16,
        }
    }
}

/// Execution attempt rejected by an open circuit
#[derive(Debug, Error, Clone)]
#[error("circuit breaker is open for phase {phase_id}")]
pub struct CircuitBreakerError {
    pub phase_id: String,
}

/// One recorded state transition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitTransition {
    pub from: CircuitState,
    pub to: CircuitState,
    pub at: DateTime<Utc>,
}

/// Metrics snapshot for diagnostics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerMetrics {
    pub current_state: CircuitState,
    pub consecutive_failures: u32,
    pub total_calls: u64,
    pub failure_count: u64,
    pub success_count: u64,
    pub rejected_calls: u64,
    pub transitions: Vec<CircuitTransition>,
}

#[derive(Debug, Default)]
struct BreakerInner {
    consecutive_failures: u32,
    last_failure_at: Option<Instant>,
    total_calls: u64,
    failure_count: u64,
    success_count: u64,
    rejected_calls: u64,
    transitions: VecDeque<CircuitTransition>,
}

/// Per-phase circuit breaker with atomic state and mutex-guarded counters
#[derive(Debug)]
pub struct CircuitBreaker {
    phase_id: String,
    state: AtomicU8,
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(phase_id: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        let phase_id = phase_id.into();
        debug!(
            phase_id = %phase_id,
            failure_threshold = config.failure_threshold,
            cooldown_secs = config.cooldown.as_secs_f64(),
            "Circuit breaker initialized"
        );
        Self {
            phase_id,
            state: AtomicU8::new(CircuitState::Closed as u8),
            config,
            inner: Mutex::new(BreakerInner::default()),
        }
    }

    pub fn state(&self) -> CircuitState {
        CircuitState::from(self.state.load(Ordering::Acquire))
    }

    pub fn phase_id(&self) -> &str {
        &self.phase_id
    }

    /// Precheck before an execution attempt.
    ///
    /// Closed and half-open circuits admit the call. An open circuit rejects
    /// until the cooldown has elapsed since the last failure, at which point
    /// it transitions to half-open and admits a probe.
    pub fn try_acquire(&self) -> Result<(), CircuitBreakerError> {
        let mut inner = self.inner.lock();
        inner.total_calls += 1;

        match self.state() {
            CircuitState::Closed | CircuitState::HalfOpen => Ok(()),
            CircuitState::Open => {
                let cooled_down = inner
                    .last_failure_at
                    .map(|at| at.elapsed() >= self.config.cooldown)
                    .unwrap_or(true);
                if cooled_down {
                    self.transition(&mut inner, CircuitState::HalfOpen);
                    info!(phase_id = %self.phase_id, "Circuit breaker half-open, probing");
                    Ok(())
                } else {
                    inner.rejected_calls += 1;
                    debug!(phase_id = %self.phase_id, "Circuit breaker rejected call");
                    Err(CircuitBreakerError {
                        phase_id: self.phase_id.clone(),
                    })
                }
            }
        }
    }

    /// Record a successful execution. In half-open this closes the circuit
    /// and resets the failure counter.
    pub fn record_success(&self) {
        let mut inner = self.inner.lock();
        inner.success_count += 1;
        inner.consecutive_failures = 0;

        if self.state() == CircuitState::HalfOpen {
            self.transition(&mut inner, CircuitState::Closed);
            info!(phase_id = %self.phase_id, "Circuit breaker closed (recovered)");
        }
    }

    /// Record a failed execution. Opens the circuit when the consecutive
    /// failure count reaches the threshold, or immediately from half-open.
    pub fn record_failure(&self) {
        let mut inner = self.inner.lock();
        inner.failure_count += 1;
        inner.consecutive_failures += 1;
        inner.last_failure_at = Some(Instant::now());

        match self.state() {
            CircuitState::Closed => {
                if inner.consecutive_failures >= self.config.failure_threshold {
                    self.transition(&mut inner, CircuitState::Open);
                    warn!(
                        phase_id = %self.phase_id,
                        consecutive_failures = inner.consecutive_failures,
                        "Circuit breaker opened"
                    );
                }
            }
            CircuitState::HalfOpen => {
                self.transition(&mut inner, CircuitState::Open);
                warn!(phase_id = %self.phase_id, "Probe failed, circuit breaker re-opened");
            }
            CircuitState::Open => {}
        }
    }

    /// Metrics snapshot including the retained transition history
    pub fn metrics(&self) -> CircuitBreakerMetrics {
        let inner = self.inner.lock();
        CircuitBreakerMetrics {
            current_state: self.state(),
            consecutive_failures: inner.consecutive_failures,
            total_calls: inner.total_calls,
            failure_count: inner.failure_count,
            success_count: inner.success_count,
            rejected_calls: inner.rejected_calls,
            transitions: inner.transitions.iter().cloned().collect(),
        }
    }

    fn transition(&self, inner: &mut BreakerInner, to: CircuitState) {
        let from = self.state();
        self.state.store(to as u8, Ordering::Release);
        inner.transitions.push_back(CircuitTransition {
            from,
            to,
            at: Utc::now(),
        });
        while inner.transitions.len() > self.config.transition_history {
            inner.transitions.pop_front();
        }
    }
}
