//! # Resource-Aware Execution
//!
//! Wraps a single phase's execution with the full resource protocol:
//! precondition check, allocation, degradation injection, priority-scaled
//! timeout enforcement, and an unconditional completion report back to the
//! resource manager. Every exit path (success, failure, timeout) flows
//! through the same reporting point so the manager's adaptive feedback never
//! sees a missing sample.

pub mod context;

pub use context::ExecutionContext;

use crate::resource::{ResourceAllocation, ResourceManager};
use crate::signals::CompletionStatus;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, instrument, warn};

/// Per-phase execution errors
#[derive(Debug, Error)]
pub enum ExecutionError {
    /// Precondition check failed; no allocation was made
    #[error("resources unavailable for phase {phase_id}: {reason}")]
    ResourceUnavailable { phase_id: String, reason: String },

    /// Wall-clock timeout elapsed; maps to a `Timeout` completion status
    #[error("phase {phase_id} timed out after {timeout:?}")]
    Timeout { phase_id: String, timeout: Duration },

    /// The phase implementation reported a failure
    #[error("phase {phase_id} failed: {message}")]
    PhaseFailed { phase_id: String, message: String },

    /// A step inside an interruptible sequence failed
    #[error("step '{step}' failed: {message}")]
    StepFailed { step: String, message: String },
}

impl ExecutionError {
    /// Completion status the driver should report for this error
    pub fn completion_status(&self) -> CompletionStatus {
        match self {
            Self::Timeout { .. } => CompletionStatus::Timeout,
            Self::ResourceUnavailable { .. } => CompletionStatus::Deferred,
            _ => CompletionStatus::Failure,
        }
    }
}

/// Output of one phase execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseOutcome {
    pub status: CompletionStatus,
    pub output: serde_json::Value,
    /// Peak memory the phase reports having used, for the completion report
    pub memory_mb: u64,
    pub metadata: HashMap<String, serde_json::Value>,
}

impl PhaseOutcome {
    pub fn success(output: serde_json::Value) -> Self {
        Self {
            status: CompletionStatus::Success,
            output,
            memory_mb: 0,
            metadata: HashMap::new(),
        }
    }

    pub fn partial(output: serde_json::Value) -> Self {
        Self {
            status: CompletionStatus::Partial,
            output,
            memory_mb: 0,
            metadata: HashMap::new(),
        }
    }

    pub fn with_memory(mut self, memory_mb: u64) -> Self {
        self.memory_mb = memory_mb;
        self
    }
}

/// The external phase implementation boundary.
///
/// The orchestrator never calls this directly; workers spawned by the driver
/// invoke it through [`ResourceAwareExecutor`].
#[async_trait]
pub trait PhaseHandler: Send + Sync {
    async fn execute(&self, ctx: ExecutionContext) -> Result<PhaseOutcome, ExecutionError>;
}

/// Executes phases under the resource protocol
#[derive(Clone)]
pub struct ResourceAwareExecutor {
    resources: Arc<dyn ResourceManager>,
    base_timeout: Duration,
}

impl ResourceAwareExecutor {
    pub fn new(resources: Arc<dyn ResourceManager>, base_timeout: Duration) -> Self {
        Self {
            resources,
            base_timeout,
        }
    }

    /// Timeout allowance for a phase: higher priority earns a longer window.
    /// Priority 0 gets the base timeout; each priority point adds 25%, capped
    /// at 3x the base. Negative priorities get the base.
    pub fn timeout_for_priority(&self, priority: i32) -> Duration {
        let factor = 1.0 + 0.25 * priority.max(0) as f64;
        self.base_timeout.mul_f64(factor.min(3.0))
    }

    /// Run one phase under the full resource protocol.
    ///
    /// The completion report to the resource manager happens exactly once on
    /// every path that reaches allocation; the precondition rejection path
    /// makes no allocation and therefore reports nothing.
    #[instrument(skip(self, handler, ctx), fields(phase_id = %phase_id))]
    pub async fn execute_phase(
        &self,
        phase_id: &str,
        handler: &dyn PhaseHandler,
        mut ctx: ExecutionContext,
    ) -> Result<PhaseOutcome, ExecutionError> {
        let (allowed, reason) = self.resources.can_execute(phase_id).await;
        if !allowed {
            let reason = reason.unwrap_or_else(|| "unspecified".to_string());
            warn!(phase_id = %phase_id, reason = %reason, "Phase execution unavailable");
            return Err(ExecutionError::ResourceUnavailable {
                phase_id: phase_id.to_string(),
                reason,
            });
        }

        let allocation: ResourceAllocation = self.resources.start_execution(phase_id).await;
        let timeout = self.timeout_for_priority(ctx.priority);
        ctx.apply_allocation(&allocation);

        debug!(
            phase_id = %phase_id,
            priority = ctx.priority,
            timeout_secs = timeout.as_secs_f64(),
            degraded = allocation.degradation.is_degraded(),
            "Starting phase execution"
        );

        let started = Instant::now();
        let raced = tokio::time::timeout(timeout, handler.execute(ctx)).await;
        let duration = started.elapsed();

        // Single funnel for the completion report: every branch below feeds
        // through end_execution before the result leaves this function.
        let outcome = match raced {
            Ok(Ok(outcome)) => Ok(outcome),
            Ok(Err(err)) => Err(err),
            Err(_elapsed) => Err(ExecutionError::Timeout {
                phase_id: phase_id.to_string(),
                timeout,
            }),
        };

        let (success, memory_mb) = match &outcome {
            Ok(o) => (
                matches!(o.status, CompletionStatus::Success | CompletionStatus::Partial),
                o.memory_mb,
            ),
            Err(_) => (false, 0),
        };
        self.resources
            .end_execution(phase_id, success, duration, memory_mb)
            .await;

        outcome
    }
}
