use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Phase lifecycle status definitions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseStatus {
    /// Initial state when the phase node is created
    NotStarted,
    /// Phase is known to the scheduler but not yet ready
    Pending,
    /// Phase failed and is awaiting a retry attempt
    PendingRetry,
    /// All hard dependencies satisfied, phase may start
    Ready,
    /// Phase is currently executing
    Running,
    /// Phase completed successfully
    Completed,
    /// Phase completed with partial results
    Partial,
    /// Phase failed permanently (retries exhausted)
    Failed,
    /// Phase can never run because an upstream dependency failed
    Blocked,
}

impl PhaseStatus {
    /// Check if this is a terminal status (no further transitions expected)
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Partial | Self::Failed | Self::Blocked
        )
    }

    /// Check if a phase in this status may be offered to the scheduler
    pub fn can_start(&self) -> bool {
        matches!(
            self,
            Self::NotStarted | Self::Pending | Self::PendingRetry | Self::Ready
        )
    }

    /// Check if this status satisfies a hard dependency edge for downstream phases
    pub fn satisfies_dependencies(&self) -> bool {
        matches!(self, Self::Completed | Self::Partial)
    }

    /// Check if this status counts as a failure for block propagation
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed)
    }
}

impl Default for PhaseStatus {
    fn default() -> Self {
        Self::NotStarted
    }
}

impl fmt::Display for PhaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotStarted => write!(f, "not_started"),
            Self::Pending => write!(f, "pending"),
            Self::PendingRetry => write!(f, "pending_retry"),
            Self::Ready => write!(f, "ready"),
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Partial => write!(f, "partial"),
            Self::Failed => write!(f, "failed"),
            Self::Blocked => write!(f, "blocked"),
        }
    }
}

impl std::str::FromStr for PhaseStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "not_started" => Ok(Self::NotStarted),
            "pending" => Ok(Self::Pending),
            "pending_retry" => Ok(Self::PendingRetry),
            "ready" => Ok(Self::Ready),
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "partial" => Ok(Self::Partial),
            "failed" => Ok(Self::Failed),
            "blocked" => Ok(Self::Blocked),
            _ => Err(format!("Invalid phase status: {s}")),
        }
    }
}

/// A unit of pipeline work tracked by the dependency graph.
///
/// Nodes are created at graph-build time and never destroyed during a run.
/// The `config` map is opaque to the orchestrator and owned by the external
/// phase implementation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseNode {
    pub phase_id: String,
    pub name: String,
    pub status: PhaseStatus,
    pub config: HashMap<String, serde_json::Value>,
    /// Signal topics this phase expects to be available on the bus
    pub expected_signals: Vec<String>,
    /// Capabilities the resource manager must advertise for this phase
    pub required_capabilities: Vec<String>,
    /// Scheduling priority, higher runs first under priority strategies
    pub priority: i32,
    /// Insertion order assigned by the builder, used as a scheduling tie-break
    pub insertion_index: usize,
}

impl PhaseNode {
    /// Create a new phase node in the default status
    pub fn new(phase_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            phase_id: phase_id.into(),
            name: name.into(),
            status: PhaseStatus::default(),
            config: HashMap::new(),
            expected_signals: Vec::new(),
            required_capabilities: Vec::new(),
            priority: 0,
            insertion_index: 0,
        }
    }

    /// Set the scheduling priority
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Attach opaque phase configuration
    pub fn with_config(mut self, config: HashMap<String, serde_json::Value>) -> Self {
        self.config = config;
        self
    }

    /// Declare signal topics this phase expects at startup validation
    pub fn with_expected_signals(mut self, signals: Vec<String>) -> Self {
        self.expected_signals = signals;
        self
    }

    /// Declare capabilities the resource manager must provide
    pub fn with_required_capabilities(mut self, capabilities: Vec<String>) -> Self {
        self.required_capabilities = capabilities;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_terminal_check() {
        assert!(PhaseStatus::Completed.is_terminal());
        assert!(PhaseStatus::Partial.is_terminal());
        assert!(PhaseStatus::Failed.is_terminal());
        assert!(PhaseStatus::Blocked.is_terminal());
        assert!(!PhaseStatus::NotStarted.is_terminal());
        assert!(!PhaseStatus::Running.is_terminal());
        assert!(!PhaseStatus::PendingRetry.is_terminal());
    }

    #[test]
    fn test_status_dependency_satisfaction() {
        assert!(PhaseStatus::Completed.satisfies_dependencies());
        assert!(PhaseStatus::Partial.satisfies_dependencies());
        assert!(!PhaseStatus::Running.satisfies_dependencies());
        assert!(!PhaseStatus::Failed.satisfies_dependencies());
        assert!(!PhaseStatus::Blocked.satisfies_dependencies());
    }

    #[test]
    fn test_status_string_conversion() {
        assert_eq!(PhaseStatus::PendingRetry.to_string(), "pending_retry");
        assert_eq!(
            "blocked".parse::<PhaseStatus>().unwrap(),
            PhaseStatus::Blocked
        );
        assert!("bogus".parse::<PhaseStatus>().is_err());
    }

    #[test]
    fn test_status_serde() {
        let json = serde_json::to_string(&PhaseStatus::Partial).unwrap();
        assert_eq!(json, "\"partial\"");
        let parsed: PhaseStatus = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, PhaseStatus::Partial);
    }

    #[test]
    fn test_node_builder_helpers() {
        let node = PhaseNode::new("ingestion", "Document Ingestion")
            .with_priority(5)
            .with_required_capabilities(vec!["nlp".to_string()]);

        assert_eq!(node.phase_id, "ingestion");
        assert_eq!(node.priority, 5);
        assert_eq!(node.status, PhaseStatus::NotStarted);
        assert_eq!(node.required_capabilities, vec!["nlp".to_string()]);
    }
}
