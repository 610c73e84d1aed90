//! Crate-level error taxonomy.
//!
//! Structural and startup errors (dependency resolution, lifecycle, contract
//! violations) are fatal: they prevent a run from entering `Running`.
//! Per-phase runtime errors never surface here; the driver catches them at
//! its boundary and converts them into retry or block-propagation decisions.

use thiserror::Error;

/// Unified error type at the orchestrator boundary
#[derive(Debug, Error)]
pub enum OrchestrationError {
    /// Cycle or missing dependency detected at validate time
    #[error("dependency resolution failed: {0}")]
    DependencyResolution(#[from] crate::graph::GraphError),

    /// Illegal lifecycle transition
    #[error(transparent)]
    StateTransition(#[from] crate::state_machine::StateTransitionError),

    /// Internal scheduler invariant violation
    #[error(transparent)]
    Scheduling(#[from] crate::scheduler::SchedulingError),

    /// Required signal topic, capability, or handler missing at startup
    #[error("contract violation: {}", violations.join("; "))]
    ContractViolation { violations: Vec<String> },

    /// Phase execution error escaping through a synchronous API
    #[error(transparent)]
    PhaseExecution(#[from] crate::executor::ExecutionError),

    /// Execution attempt rejected by an open circuit
    #[error(transparent)]
    CircuitBreaker(#[from] crate::resilience::CircuitBreakerError),

    #[error(transparent)]
    Configuration(#[from] crate::config::ConfigurationError),
}

pub type Result<T> = std::result::Result<T, OrchestrationError>;
