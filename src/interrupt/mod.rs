//! # Cooperative Interruption
//!
//! Mid-execution cancellation with partial-progress resumption. Cancellation
//! is cooperative, not preemptive: the [`InterruptibleExecutor`] observes the
//! shared [`InterruptController`] only at step boundaries, persists a
//! [`PartialExecutionResult`] for whatever completed, and a later
//! `resume_execution` call picks up exactly where the sequence stopped.
//!
//! A background [`ResourceMonitor`] polls the resource manager's pressure
//! level and signals or clears the controller, so workers and the monitor
//! never coordinate directly.

pub mod controller;
pub mod executor;
pub mod monitor;

pub use controller::{InterruptController, InterruptState};
pub use executor::{ExecutionStep, InterruptibleExecutor, PartialExecutionResult};
pub use monitor::ResourceMonitor;
