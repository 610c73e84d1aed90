//! # Orchestrator
//!
//! Event-driven driver that runs a validated dependency graph to completion.
//!
//! The driver composes the subsystems rather than reimplementing them:
//! the scheduler decides which phases may start, circuit breakers gate the
//! actual launches, the resource-aware executor runs each phase under its
//! allocation, and completions flow back over a single queue that the
//! driver is the sole consumer of. Graph mutation happens only in the
//! driver task, so no lock is held across an await point.

mod backoff;
mod driver;

pub use backoff::BackoffPolicy;
pub use driver::{ExecutionSummary, Orchestrator};
