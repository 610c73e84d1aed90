//! The frozen, validated dependency graph.
//!
//! Structure (nodes and edges) is immutable once built; only node status may
//! change, and only through [`DependencyGraph::update_node_status`]. Failure
//! of a phase propagates `Blocked` status through its downstream transitive
//! closure from inside that single mutator.

use super::edge::{DependencyEdge, EdgeType};
use super::builder::GraphError;
use super::node::{PhaseNode, PhaseStatus};
use std::collections::{BTreeSet, HashMap, HashSet};
use tracing::{debug, info};

/// Validated phase dependency graph with frozen structure
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    nodes: HashMap<String, PhaseNode>,
    edges: HashSet<DependencyEdge>,
    /// target -> (source, edge_type)
    upstream: HashMap<String, Vec<(String, EdgeType)>>,
    /// source -> (target, edge_type)
    downstream: HashMap<String, Vec<(String, EdgeType)>>,
    order: Vec<String>,
}

impl DependencyGraph {
    /// Assemble a frozen graph from validated builder parts. Only the builder
    /// calls this; the indices are rebuilt from the edge set here.
    pub(super) fn from_parts(
        nodes: HashMap<String, PhaseNode>,
        edges: HashSet<DependencyEdge>,
        order: Vec<String>,
    ) -> Self {
        let mut upstream: HashMap<String, Vec<(String, EdgeType)>> = HashMap::new();
        let mut downstream: HashMap<String, Vec<(String, EdgeType)>> = HashMap::new();
        for id in &order {
            upstream.entry(id.clone()).or_default();
            downstream.entry(id.clone()).or_default();
        }
        for edge in &edges {
            upstream
                .entry(edge.target.clone())
                .or_default()
                .push((edge.source.clone(), edge.edge_type));
            downstream
                .entry(edge.source.clone())
                .or_default()
                .push((edge.target.clone(), edge.edge_type));
        }
        Self {
            nodes,
            edges,
            upstream,
            downstream,
            order,
        }
    }

    pub fn node(&self, phase_id: &str) -> Option<&PhaseNode> {
        self.nodes.get(phase_id)
    }

    /// Nodes in insertion order
    pub fn nodes(&self) -> impl Iterator<Item = &PhaseNode> {
        self.order.iter().filter_map(|id| self.nodes.get(id))
    }

    pub fn phase_ids(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn edges(&self) -> impl Iterator<Item = &DependencyEdge> {
        self.edges.iter()
    }

    /// Hard upstream dependencies of a phase
    pub fn hard_upstream(&self, phase_id: &str) -> impl Iterator<Item = &str> {
        self.upstream
            .get(phase_id)
            .into_iter()
            .flatten()
            .filter(|(_, t)| *t == EdgeType::Hard)
            .map(|(id, _)| id.as_str())
    }

    /// All downstream neighbors regardless of edge type
    pub fn downstream_of(&self, phase_id: &str) -> impl Iterator<Item = &str> {
        self.downstream
            .get(phase_id)
            .into_iter()
            .flatten()
            .map(|(id, _)| id.as_str())
    }

    /// Snapshot of every node's current status, keyed by phase id
    pub fn status_map(&self) -> HashMap<String, PhaseStatus> {
        self.nodes
            .iter()
            .map(|(id, node)| (id.clone(), node.status))
            .collect()
    }

    /// The single mutation entry point for node status.
    ///
    /// Setting `Failed` propagates `Blocked` through the downstream
    /// transitive closure, skipping nodes that already reached
    /// `Completed`/`Failed`/`Partial`. Returns the ids newly marked blocked.
    /// Never changes the edge set.
    pub fn update_node_status(
        &mut self,
        phase_id: &str,
        new_status: PhaseStatus,
    ) -> Result<Vec<String>, GraphError> {
        let node = self
            .nodes
            .get_mut(phase_id)
            .ok_or_else(|| GraphError::UnknownPhase {
                phase_id: phase_id.to_string(),
            })?;

        let previous = node.status;
        node.status = new_status;
        debug!(
            phase_id = %phase_id,
            from = %previous,
            to = %new_status,
            "Phase status updated"
        );

        if new_status.is_failure() {
            let blocked = self.propagate_blocks(phase_id);
            if !blocked.is_empty() {
                info!(
                    failed_phase = %phase_id,
                    blocked = ?blocked,
                    "Failure propagated to downstream phases"
                );
            }
            return Ok(blocked);
        }
        Ok(Vec::new())
    }

    fn propagate_blocks(&mut self, failed_id: &str) -> Vec<String> {
        let closure = self.downstream_closure(failed_id);
        let mut newly_blocked = Vec::new();
        // Insertion order keeps block reporting deterministic
        for id in self.order.clone() {
            if !closure.contains(id.as_str()) {
                continue;
            }
            let node = self.nodes.get_mut(&id).expect("closure node exists");
            if matches!(
                node.status,
                PhaseStatus::Completed | PhaseStatus::Failed | PhaseStatus::Partial
            ) {
                continue;
            }
            if node.status != PhaseStatus::Blocked {
                node.status = PhaseStatus::Blocked;
                newly_blocked.push(id);
            }
        }
        newly_blocked
    }

    /// Downstream transitive closure of a phase (the phase itself excluded)
    pub fn downstream_closure(&self, phase_id: &str) -> HashSet<String> {
        let mut closure = HashSet::new();
        let mut stack: Vec<&str> = self.downstream_of(phase_id).collect();
        while let Some(id) = stack.pop() {
            if closure.insert(id.to_string()) {
                stack.extend(self.downstream_of(id));
            }
        }
        closure
    }

    /// Phases eligible to start right now.
    ///
    /// A phase is ready iff its status allows starting, it is not blocked or
    /// listed in `completed`/`failed`/`active`, and every hard upstream
    /// dependency has reached a satisfying status. Soft edges never block.
    pub fn get_ready_phases(
        &self,
        completed: &HashSet<String>,
        failed: &HashSet<String>,
        active: &HashSet<String>,
    ) -> Vec<String> {
        self.order
            .iter()
            .filter(|id| {
                let node = &self.nodes[id.as_str()];
                node.status.can_start()
                    && !completed.contains(id.as_str())
                    && !failed.contains(id.as_str())
                    && !active.contains(id.as_str())
                    && self.hard_dependencies_satisfied(id, completed)
            })
            .cloned()
            .collect()
    }

    fn hard_dependencies_satisfied(&self, phase_id: &str, completed: &HashSet<String>) -> bool {
        self.hard_upstream(phase_id).all(|dep| {
            completed.contains(dep)
                || self
                    .nodes
                    .get(dep)
                    .map(|n| n.status.satisfies_dependencies())
                    .unwrap_or(false)
        })
    }

    /// Downstream phases whose hard upstream set just became fully satisfied
    /// by `completed_id` finishing. Drives audit signals, not scheduling.
    /// Soft-edge neighbors are excluded: they were never gated on
    /// `completed_id`, so its completion cannot unblock them.
    pub fn get_newly_unblocked(&self, completed_id: &str) -> Vec<String> {
        let empty = HashSet::new();
        self.downstream
            .get(completed_id)
            .into_iter()
            .flatten()
            .filter(|(_, edge_type)| *edge_type == EdgeType::Hard)
            .filter(|(id, _)| {
                let node = &self.nodes[id];
                node.status.can_start() && self.hard_dependencies_satisfied(id, &empty)
            })
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Union of explicitly blocked nodes and the downstream closure of every
    /// failed node. Sorted for deterministic reporting.
    pub fn get_permanently_blocked(&self) -> BTreeSet<String> {
        let mut blocked: BTreeSet<String> = self
            .nodes
            .values()
            .filter(|n| n.status == PhaseStatus::Blocked)
            .map(|n| n.phase_id.clone())
            .collect();
        for node in self.nodes.values() {
            if node.status.is_failure() {
                // Settled nodes stay out of the report even when a late
                // failure appears upstream of them.
                blocked.extend(
                    self.downstream_closure(&node.phase_id)
                        .into_iter()
                        .filter(|id| {
                            let status = self.nodes[id.as_str()].status;
                            !status.satisfies_dependencies() && !status.is_failure()
                        }),
                );
            }
        }
        blocked
    }
}
