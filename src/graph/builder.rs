//! Mutable graph builder with structural validation.
//!
//! The builder accumulates nodes and edges, then `build()` validates and
//! returns a [`DependencyGraph`] whose structure can no longer change. The
//! frozen type exposes no `add_node`/`add_edge`, so post-validation mutation
//! is impossible rather than merely checked.

use super::edge::{DependencyEdge, EdgeType};
use super::frozen::DependencyGraph;
use super::node::PhaseNode;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use thiserror::Error;
use tracing::{debug, warn};

/// Structural errors raised while building or validating the graph
#[derive(Debug, Error)]
pub enum GraphError {
    #[error("phase '{phase_id}' is already defined")]
    DuplicateNode { phase_id: String },

    #[error("edge {edge_source} -> {target} references unknown phase '{missing}'")]
    MissingNode {
        edge_source: String,
        target: String,
        missing: String,
    },

    #[error("edge {edge_source} -> {target} is already defined")]
    DuplicateEdge { edge_source: String, target: String },

    #[error("dependency graph is invalid: {}", errors.join("; "))]
    InvalidGraph {
        errors: Vec<String>,
        cycles: Vec<Vec<String>>,
    },

    #[error("unknown phase '{phase_id}'")]
    UnknownPhase { phase_id: String },
}

/// Outcome of structural validation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    pub is_valid: bool,
    pub errors: Vec<String>,
    /// Each entry lists only the node ids on the detected cycle, in order
    pub cycles_detected: Vec<Vec<String>>,
    /// Nodes with no upstream and no downstream that are not designated roots
    /// (a warning, not an error)
    pub orphan_nodes: Vec<String>,
    /// Edge endpoints that do not resolve to a known node
    pub missing_dependencies: Vec<String>,
}

/// DFS coloring used by cycle detection
#[derive(Clone, Copy, PartialEq)]
enum Color {
    White,
    Gray,
    Black,
}

/// Mutable accumulator for phase nodes and dependency edges
#[derive(Debug, Default)]
pub struct DependencyGraphBuilder {
    nodes: HashMap<String, PhaseNode>,
    edges: HashSet<DependencyEdge>,
    order: Vec<String>,
    roots: HashSet<String>,
}

impl DependencyGraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a phase node. Fails if a node with the same id already exists.
    pub fn add_node(&mut self, mut node: PhaseNode) -> Result<&mut Self, GraphError> {
        if self.nodes.contains_key(&node.phase_id) {
            return Err(GraphError::DuplicateNode {
                phase_id: node.phase_id,
            });
        }
        node.insertion_index = self.order.len();
        self.order.push(node.phase_id.clone());
        debug!(phase_id = %node.phase_id, "Added phase node");
        self.nodes.insert(node.phase_id.clone(), node);
        Ok(self)
    }

    /// Add a dependency edge. Both endpoints must already exist.
    pub fn add_edge(
        &mut self,
        source: impl Into<String>,
        target: impl Into<String>,
        edge_type: EdgeType,
    ) -> Result<&mut Self, GraphError> {
        let source = source.into();
        let target = target.into();

        let missing = [source.as_str(), target.as_str()]
            .into_iter()
            .find(|endpoint| !self.nodes.contains_key(*endpoint))
            .map(str::to_string);
        if let Some(missing) = missing {
            return Err(GraphError::MissingNode {
                edge_source: source,
                target,
                missing,
            });
        }

        let edge = DependencyEdge::new(source.clone(), target.clone(), edge_type);
        if !self.edges.insert(edge) {
            return Err(GraphError::DuplicateEdge {
                edge_source: source,
                target,
            });
        }
        debug!(source = %source, target = %target, edge_type = %edge_type, "Added dependency edge");
        Ok(self)
    }

    /// Designate a node as an intentional root, exempting it from orphan warnings
    pub fn mark_root(&mut self, phase_id: impl Into<String>) -> Result<&mut Self, GraphError> {
        let phase_id = phase_id.into();
        if !self.nodes.contains_key(&phase_id) {
            return Err(GraphError::UnknownPhase { phase_id });
        }
        self.roots.insert(phase_id);
        Ok(self)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Run structural validation without consuming the builder.
    ///
    /// Cycle detection is three-color DFS: a back edge to a gray node yields
    /// a reported cycle trimmed to the nodes on the cycle path. O(V+E).
    pub fn validate(&self) -> ValidationReport {
        let mut errors = Vec::new();
        let mut missing_dependencies = Vec::new();

        // Endpoint resolution. The builder already rejects dangling edges,
        // so this only fires for graphs deserialized or assembled externally.
        for edge in &self.edges {
            for endpoint in [&edge.source, &edge.target] {
                if !self.nodes.contains_key(endpoint.as_str()) {
                    errors.push(format!(
                        "edge {} -> {} references unknown phase '{}'",
                        edge.source, edge.target, endpoint
                    ));
                    missing_dependencies.push(endpoint.clone());
                }
            }
        }

        let cycles_detected = self.detect_cycles();
        for cycle in &cycles_detected {
            errors.push(format!("dependency cycle: {}", cycle.join(" -> ")));
        }

        let orphan_nodes = self.find_orphans();
        if !orphan_nodes.is_empty() {
            warn!(
                orphans = ?orphan_nodes,
                "Graph contains unconnected phases that are not designated roots"
            );
        }

        ValidationReport {
            is_valid: errors.is_empty(),
            errors,
            cycles_detected,
            orphan_nodes,
            missing_dependencies,
        }
    }

    /// Validate and freeze. On success the returned [`DependencyGraph`] owns
    /// the structure; no structural mutation is possible afterwards.
    pub fn build(self) -> Result<DependencyGraph, GraphError> {
        let report = self.validate();
        if !report.is_valid {
            return Err(GraphError::InvalidGraph {
                errors: report.errors,
                cycles: report.cycles_detected,
            });
        }
        Ok(DependencyGraph::from_parts(
            self.nodes, self.edges, self.order,
        ))
    }

    fn adjacency(&self) -> HashMap<&str, Vec<&str>> {
        let mut adj: HashMap<&str, Vec<&str>> = HashMap::new();
        for id in &self.order {
            adj.entry(id.as_str()).or_default();
        }
        for edge in &self.edges {
            adj.entry(edge.source.as_str())
                .or_default()
                .push(edge.target.as_str());
        }
        // Deterministic traversal order for reproducible cycle reports
        for targets in adj.values_mut() {
            targets.sort_unstable();
        }
        adj
    }

    fn detect_cycles(&self) -> Vec<Vec<String>> {
        let adj = self.adjacency();
        let mut colors: HashMap<&str, Color> =
            self.order.iter().map(|id| (id.as_str(), Color::White)).collect();
        let mut cycles = Vec::new();
        let mut path: Vec<&str> = Vec::new();

        for id in &self.order {
            if colors[id.as_str()] == Color::White {
                Self::dfs_visit(id.as_str(), &adj, &mut colors, &mut path, &mut cycles);
            }
        }
        cycles
    }

    fn dfs_visit<'a>(
        node: &'a str,
        adj: &HashMap<&'a str, Vec<&'a str>>,
        colors: &mut HashMap<&'a str, Color>,
        path: &mut Vec<&'a str>,
        cycles: &mut Vec<Vec<String>>,
    ) {
        colors.insert(node, Color::Gray);
        path.push(node);

        if let Some(targets) = adj.get(node) {
            for &next in targets {
                match colors.get(next).copied().unwrap_or(Color::White) {
                    Color::Gray => {
                        // Back edge: trim the current path to the cycle itself
                        if let Some(start) = path.iter().position(|&n| n == next) {
                            cycles.push(path[start..].iter().map(|s| s.to_string()).collect());
                        }
                    }
                    Color::White => Self::dfs_visit(next, adj, colors, path, cycles),
                    Color::Black => {}
                }
            }
        }

        path.pop();
        colors.insert(node, Color::Black);
    }

    fn find_orphans(&self) -> Vec<String> {
        let mut connected: HashSet<&str> = HashSet::new();
        for edge in &self.edges {
            connected.insert(edge.source.as_str());
            connected.insert(edge.target.as_str());
        }
        self.order
            .iter()
            .filter(|id| !connected.contains(id.as_str()) && !self.roots.contains(id.as_str()))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builder_with(ids: &[&str]) -> DependencyGraphBuilder {
        let mut builder = DependencyGraphBuilder::new();
        for id in ids {
            builder.add_node(PhaseNode::new(*id, *id)).unwrap();
        }
        builder
    }

    #[test]
    fn test_duplicate_node_rejected() {
        let mut builder = builder_with(&["a"]);
        let err = builder.add_node(PhaseNode::new("a", "again")).unwrap_err();
        assert!(matches!(err, GraphError::DuplicateNode { .. }));
    }

    #[test]
    fn test_edge_to_missing_node_rejected() {
        let mut builder = builder_with(&["a"]);
        let err = builder.add_edge("a", "ghost", EdgeType::Hard).unwrap_err();
        assert!(matches!(err, GraphError::MissingNode { .. }));
        assert_eq!(builder.edge_count(), 0);
    }

    #[test]
    fn test_valid_chain() {
        let mut builder = builder_with(&["a", "b", "c"]);
        builder.add_edge("a", "b", EdgeType::Hard).unwrap();
        builder.add_edge("b", "c", EdgeType::Hard).unwrap();

        let report = builder.validate();
        assert!(report.is_valid);
        assert!(report.cycles_detected.is_empty());
        assert!(report.orphan_nodes.is_empty());

        let graph = builder.build().unwrap();
        assert_eq!(graph.node_count(), 3);
        assert_eq!(graph.edge_count(), 2);
    }

    #[test]
    fn test_cycle_detection_reports_cycle_members() {
        let mut builder = builder_with(&["a", "b", "c"]);
        builder.add_edge("a", "b", EdgeType::Hard).unwrap();
        builder.add_edge("b", "c", EdgeType::Hard).unwrap();
        builder.add_edge("c", "a", EdgeType::Hard).unwrap();

        let report = builder.validate();
        assert!(!report.is_valid);
        assert_eq!(report.cycles_detected.len(), 1);

        let cycle = &report.cycles_detected[0];
        assert_eq!(cycle.len(), 3);
        for id in ["a", "b", "c"] {
            assert!(cycle.contains(&id.to_string()));
        }

        assert!(matches!(
            builder.build(),
            Err(GraphError::InvalidGraph { .. })
        ));
    }

    #[test]
    fn test_cycle_trimmed_to_cycle_path() {
        // d -> a -> b -> a: the reported cycle must not contain d
        let mut builder = builder_with(&["d", "a", "b"]);
        builder.add_edge("d", "a", EdgeType::Hard).unwrap();
        builder.add_edge("a", "b", EdgeType::Hard).unwrap();
        builder.add_edge("b", "a", EdgeType::Hard).unwrap();

        let report = builder.validate();
        assert!(!report.is_valid);
        let cycle = &report.cycles_detected[0];
        assert!(!cycle.contains(&"d".to_string()));
        assert!(cycle.contains(&"a".to_string()));
        assert!(cycle.contains(&"b".to_string()));
    }

    #[test]
    fn test_self_loop_detected() {
        let mut builder = builder_with(&["a"]);
        builder.add_edge("a", "a", EdgeType::Hard).unwrap();
        let report = builder.validate();
        assert!(!report.is_valid);
        assert_eq!(report.cycles_detected[0], vec!["a".to_string()]);
    }

    #[test]
    fn test_orphan_is_warning_not_error() {
        let mut builder = builder_with(&["a", "b", "lonely"]);
        builder.add_edge("a", "b", EdgeType::Hard).unwrap();

        let report = builder.validate();
        assert!(report.is_valid);
        assert_eq!(report.orphan_nodes, vec!["lonely".to_string()]);
    }

    #[test]
    fn test_designated_root_not_flagged_as_orphan() {
        let mut builder = builder_with(&["a", "b", "standalone"]);
        builder.add_edge("a", "b", EdgeType::Hard).unwrap();
        builder.mark_root("standalone").unwrap();

        let report = builder.validate();
        assert!(report.orphan_nodes.is_empty());
    }

    #[test]
    fn test_soft_edges_participate_in_cycle_detection() {
        let mut builder = builder_with(&["a", "b"]);
        builder.add_edge("a", "b", EdgeType::Soft).unwrap();
        builder.add_edge("b", "a", EdgeType::Soft).unwrap();
        assert!(!builder.validate().is_valid);
    }
}
