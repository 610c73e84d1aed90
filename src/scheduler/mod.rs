//! # Phase Scheduler
//!
//! Pure selection logic: given the graph's current readiness and the sets of
//! completed, failed, and active phases, produce a [`SchedulingDecision`]
//! bounded by the parallelism limit. The scheduler never mutates the graph;
//! the driver owns all state changes.

use crate::graph::DependencyGraph;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use thiserror::Error;
use tracing::debug;

/// Candidate ordering and parallelism policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulingStrategy {
    /// One phase at a time, insertion order
    Sequential,
    /// Up to the configured bound, insertion order
    Parallel,
    /// Configured bound with priority ordering
    Hybrid,
    /// Alias of Hybrid kept for configs that name the policy directly
    Priority,
}

impl SchedulingStrategy {
    fn uses_priority(&self) -> bool {
        matches!(self, Self::Hybrid | Self::Priority)
    }

    fn effective_bound(&self, max_parallel: usize) -> usize {
        match self {
            Self::Sequential => 1,
            _ => max_parallel,
        }
    }
}

impl fmt::Display for SchedulingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sequential => write!(f, "sequential"),
            Self::Parallel => write!(f, "parallel"),
            Self::Hybrid => write!(f, "hybrid"),
            Self::Priority => write!(f, "priority"),
        }
    }
}

/// Internal scheduler invariant violation. Always a bug, never recoverable.
#[derive(Debug, Error)]
#[error("scheduling invariant violated: {message}")]
pub struct SchedulingError {
    pub message: String,
}

/// Immutable output of one scheduling pass, consumed by the driver for both
/// execution and audit signaling
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulingDecision {
    /// Phases to start now, in start order
    pub phases_to_start: Vec<String>,
    /// Ready or pending phases held back this pass
    pub phases_waiting: Vec<String>,
    /// Phases that can never run in this run
    pub phases_blocked: Vec<String>,
    pub rationale: String,
}

/// Selects the next phases to start under a parallelism bound
#[derive(Debug, Clone)]
pub struct PhaseScheduler {
    strategy: SchedulingStrategy,
}

impl PhaseScheduler {
    pub fn new(strategy: SchedulingStrategy) -> Self {
        Self { strategy }
    }

    pub fn strategy(&self) -> SchedulingStrategy {
        self.strategy
    }

    /// One scheduling pass.
    ///
    /// Candidates are the graph's ready set minus active phases, ordered by
    /// priority descending (priority strategies) with insertion order as the
    /// tie-break, truncated to `max_parallel - |active|`.
    pub fn select_phases(
        &self,
        graph: &DependencyGraph,
        completed: &HashSet<String>,
        failed: &HashSet<String>,
        active: &HashSet<String>,
        max_parallel: usize,
    ) -> Result<SchedulingDecision, SchedulingError> {
        let mut candidates = graph.get_ready_phases(completed, failed, active);

        // The ready set must be disjoint from everything already settled.
        for id in &candidates {
            if active.contains(id) || completed.contains(id) || failed.contains(id) {
                return Err(SchedulingError {
                    message: format!("ready set contains settled phase '{id}'"),
                });
            }
        }

        if self.strategy.uses_priority() {
            candidates.sort_by(|a, b| {
                let na = graph.node(a).expect("ready phase exists");
                let nb = graph.node(b).expect("ready phase exists");
                nb.priority
                    .cmp(&na.priority)
                    .then(na.insertion_index.cmp(&nb.insertion_index))
            });
        }

        let bound = self.strategy.effective_bound(max_parallel);
        let slots = bound.saturating_sub(active.len());
        let phases_to_start: Vec<String> = candidates.iter().take(slots).cloned().collect();
        let held_back: Vec<String> = candidates.iter().skip(slots).cloned().collect();

        let phases_blocked: Vec<String> = graph.get_permanently_blocked().into_iter().collect();

        // Waiting = ready-but-held-back plus startable phases whose hard
        // dependencies are not yet satisfied.
        let mut phases_waiting = held_back;
        for node in graph.nodes() {
            if node.status.can_start()
                && !candidates.contains(&node.phase_id)
                && !active.contains(&node.phase_id)
                && !phases_blocked.contains(&node.phase_id)
            {
                phases_waiting.push(node.phase_id.clone());
            }
        }

        let rationale = format!(
            "strategy={} ready={} active={} slots={} starting={}",
            self.strategy,
            candidates.len(),
            active.len(),
            slots,
            phases_to_start.len()
        );
        debug!(
            strategy = %self.strategy,
            starting = ?phases_to_start,
            waiting = phases_waiting.len(),
            blocked = phases_blocked.len(),
            "Scheduling decision"
        );

        Ok(SchedulingDecision {
            phases_to_start,
            phases_waiting,
            phases_blocked,
            rationale,
        })
    }
}
