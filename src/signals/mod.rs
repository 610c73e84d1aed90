//! # Orchestration Signals
//!
//! Typed pub/sub payloads exchanged at the orchestrator boundary. Each
//! signal kind gets its own broadcast topic, so handler signatures are
//! checked at compile time instead of dispatching on string-keyed payloads.
//! The transport behind the bus is an external concern; in-process
//! subscribers use tokio broadcast receivers directly.

use crate::executor::ExecutionContext;
use crate::graph::PhaseStatus;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tokio::sync::broadcast;
use uuid::Uuid;

/// Terminal status of one phase execution attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionStatus {
    Success,
    Failure,
    Partial,
    Timeout,
    /// Resources were unavailable before the attempt started; the phase
    /// re-enters the pool without consuming retry budget
    Deferred,
}

impl CompletionStatus {
    /// Does this attempt satisfy the phase's dependencies downstream?
    pub fn is_satisfying(&self) -> bool {
        matches!(self, Self::Success | Self::Partial)
    }
}

impl fmt::Display for CompletionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Failure => write!(f, "failure"),
            Self::Partial => write!(f, "partial"),
            Self::Timeout => write!(f, "timeout"),
            Self::Deferred => write!(f, "deferred"),
        }
    }
}

/// Instructs a worker to begin executing a phase
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseStartSignal {
    pub phase_id: String,
    pub run_id: Uuid,
    pub upstream_dependencies: Vec<String>,
    pub execution_context: ExecutionContext,
    pub timeout_seconds: u64,
}

/// Reports the outcome of a phase execution attempt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseCompleteSignal {
    pub phase_id: String,
    pub status: CompletionStatus,
    pub completion_metadata: HashMap<String, serde_json::Value>,
}

impl PhaseCompleteSignal {
    pub fn new(phase_id: impl Into<String>, status: CompletionStatus) -> Self {
        Self {
            phase_id: phase_id.into(),
            status,
            completion_metadata: HashMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: &str, value: serde_json::Value) -> Self {
        self.completion_metadata.insert(key.to_string(), value);
        self
    }
}

/// Kind of scheduling decision being audited
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionType {
    PhasesSelected,
    AllWaiting,
    RunTerminated,
}

/// Audit-only record of one scheduling decision
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestrationDecisionSignal {
    pub decision_type: DecisionType,
    pub rationale: String,
    pub phases_selected: Vec<String>,
    pub phases_waiting: Vec<String>,
    pub phases_blocked: Vec<String>,
    /// Status of every node at decision time
    pub dependency_state: HashMap<String, PhaseStatus>,
}

/// Announces a node status change and any phases it unblocked
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependencyGraphUpdatedSignal {
    pub updated_node: String,
    pub new_status: PhaseStatus,
    pub newly_unblocked_phases: Vec<String>,
}

/// One broadcast topic carrying a single signal type.
///
/// Publishing with no subscribers is not an error; audit topics are often
/// unobserved in production.
#[derive(Debug, Clone)]
pub struct Topic<T: Clone> {
    sender: broadcast::Sender<T>,
}

impl<T: Clone> Topic<T> {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish a signal, returning the number of receivers that saw it
    pub fn publish(&self, signal: T) -> usize {
        match self.sender.send(signal) {
            Ok(count) => count,
            Err(broadcast::error::SendError(_)) => 0,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<T> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

/// Topic names as seen by external transports and contract validation
pub mod topics {
    pub const PHASE_START: &str = "orchestration.phase_start";
    pub const PHASE_COMPLETE: &str = "orchestration.phase_complete";
    pub const DECISION: &str = "orchestration.decision";
    pub const GRAPH_UPDATED: &str = "orchestration.graph_updated";

    pub const ALL: &[&str] = &[PHASE_START, PHASE_COMPLETE, DECISION, GRAPH_UPDATED];
}

/// The orchestrator's signal boundary: one typed topic per signal kind
#[derive(Debug, Clone)]
pub struct SignalBus {
    pub phase_start: Topic<PhaseStartSignal>,
    pub phase_complete: Topic<PhaseCompleteSignal>,
    pub decisions: Topic<OrchestrationDecisionSignal>,
    pub graph_updates: Topic<DependencyGraphUpdatedSignal>,
}

impl SignalBus {
    pub fn new(capacity: usize) -> Self {
        Self {
            phase_start: Topic::new(capacity),
            phase_complete: Topic::new(capacity),
            decisions: Topic::new(capacity),
            graph_updates: Topic::new(capacity),
        }
    }
}

impl Default for SignalBus {
    fn default() -> Self {
        Self::new(256)
    }
}
