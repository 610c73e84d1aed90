use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};

/// Edge semantics between two phases
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeType {
    /// Gates readiness: the target may not start until the source completes
    Hard,
    /// Advisory only: never blocks readiness
    Soft,
}

impl fmt::Display for EdgeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Hard => write!(f, "hard"),
            Self::Soft => write!(f, "soft"),
        }
    }
}

/// A directed dependency between two phases.
///
/// Identity is the `(source, target)` pair: two edges with the same endpoints
/// are the same edge regardless of type, so an edge set holds at most one
/// edge per phase pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependencyEdge {
    pub source: String,
    pub target: String,
    pub edge_type: EdgeType,
}

impl DependencyEdge {
    pub fn new(source: impl Into<String>, target: impl Into<String>, edge_type: EdgeType) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            edge_type,
        }
    }

    pub fn hard(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self::new(source, target, EdgeType::Hard)
    }

    pub fn soft(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self::new(source, target, EdgeType::Soft)
    }
}

impl PartialEq for DependencyEdge {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source && self.target == other.target
    }
}

impl Eq for DependencyEdge {}

impl Hash for DependencyEdge {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.source.hash(state);
        self.target.hash(state);
    }
}
