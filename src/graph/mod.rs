//! # Dependency Graph
//!
//! Phase dependency management for the orchestration core. A mutable
//! [`DependencyGraphBuilder`] accumulates phase nodes and typed edges, and an
//! explicit [`DependencyGraphBuilder::build`] step validates the structure
//! (cycle detection, endpoint checks, orphan analysis) and returns an
//! immutable-structure [`DependencyGraph`]. After the build step only node
//! status may change, through a single mutation entry point that also
//! performs failure-block propagation.
//!
//! ## Key Components
//!
//! - **PhaseNode / PhaseStatus**: phase identity and lifecycle status
//! - **DependencyEdge**: typed (hard/soft) edge, identified by its endpoints
//! - **DependencyGraphBuilder**: mutable accumulator with validation
//! - **DependencyGraph**: frozen structure with readiness and propagation queries

pub mod builder;
pub mod edge;
pub mod frozen;
pub mod node;

pub use builder::{DependencyGraphBuilder, GraphError, ValidationReport};
pub use edge::{DependencyEdge, EdgeType};
pub use frozen::DependencyGraph;
pub use node::{PhaseNode, PhaseStatus};
