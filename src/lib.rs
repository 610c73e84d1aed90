#![allow(clippy::doc_markdown)] // Allow technical terms like TOML, NLP in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Docpipe Core
//!
//! Orchestration engine for multi-phase document-analysis pipelines.
//!
//! ## Overview
//!
//! Docpipe Core coordinates pipelines whose phases (extraction, entity
//! analysis, relationship mapping, scoring, reporting) depend on each other's
//! outputs. A validated, frozen dependency graph defines what may run; an
//! event-driven driver decides when, under explicit resource budgets and
//! per-phase failure isolation.
//!
//! ## Architecture
//!
//! The driver is the only task that mutates the graph. Workers execute phase
//! handlers through the resource-aware executor and report back over a single
//! completion queue; everything else observes the run through typed broadcast
//! signals.
//!
//! ## Key Features
//!
//! - **Validated dependency graphs**: cycle detection at build time, frozen
//!   topology afterwards, failure propagation through the downstream closure
//! - **Adaptive execution**: resource allocations scale limits and timeouts,
//!   degradation profiles follow system pressure
//! - **Failure isolation**: per-phase circuit breakers, exponential-backoff
//!   retries, downstream blocking instead of run abortion
//! - **Cooperative interruption**: checkpointed step execution with partial
//!   results that later runs resume from
//!
//! ## Module Organization
//!
//! - [`graph`] - Dependency graph construction, validation, and status tracking
//! - [`state_machine`] - Orchestration lifecycle management
//! - [`scheduler`] - Phase selection strategies
//! - [`executor`] - Resource-aware phase execution
//! - [`resource`] - Resource management and degradation profiles
//! - [`resilience`] - Circuit breaker protection
//! - [`interrupt`] - Cooperative interruption and partial-result resumption
//! - [`signals`] - Typed signal topics and the broadcast bus
//! - [`orchestrator`] - The driver loop tying the subsystems together
//! - [`config`] - Layered configuration loading
//! - [`logging`] - Tracing subscriber setup for embedding applications
//! - [`error`] - Structured error handling
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use docpipe_core::config::OrchestratorConfig;
//! use docpipe_core::graph::{DependencyGraphBuilder, EdgeType, PhaseNode};
//! use docpipe_core::orchestrator::Orchestrator;
//! use docpipe_core::resource::AdaptiveResourceManager;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut builder = DependencyGraphBuilder::new();
//! builder.add_node(PhaseNode::new("extract", "Document Extraction"))?;
//! builder.add_node(PhaseNode::new("analyze", "Entity Analysis"))?;
//! builder.add_edge("extract", "analyze", EdgeType::Hard)?;
//! let graph = builder.build()?;
//!
//! let resources = Arc::new(AdaptiveResourceManager::default());
//! let mut orchestrator = Orchestrator::new(OrchestratorConfig::default(), graph, resources);
//! // orchestrator.register_handler("extract", ...);
//! let summary = orchestrator.run().await?;
//! println!("run {} finished as {}", summary.run_id, summary.final_state);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod executor;
pub mod graph;
pub mod interrupt;
pub mod logging;
pub mod orchestrator;
pub mod resilience;
pub mod resource;
pub mod scheduler;
pub mod signals;
pub mod state_machine;

pub use config::OrchestratorConfig;
pub use error::{OrchestrationError, Result};
pub use executor::{ExecutionContext, PhaseHandler, PhaseOutcome, ResourceAwareExecutor};
pub use graph::{DependencyGraph, DependencyGraphBuilder, EdgeType, PhaseNode, PhaseStatus};
pub use orchestrator::{ExecutionSummary, Orchestrator};
pub use resource::{AdaptiveResourceManager, ResourceManager};
pub use signals::{CompletionStatus, SignalBus};
pub use state_machine::OrchestrationState;
