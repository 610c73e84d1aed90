//! # Resilience
//!
//! Fault isolation for repeatedly failing phases. A per-phase circuit
//! breaker rejects execution attempts after a configured run of failures,
//! lets a single probe through once the cooldown elapses, and keeps a
//! bounded ring buffer of its open/close transitions for diagnostics.
//!
//! A breaker rejection is not an execution failure: the driver does not
//! charge it against the phase's retry budget.

pub mod circuit_breaker;

pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError, CircuitBreakerMetrics,
    CircuitState, CircuitTransition,
};
