//! # Resource Management Boundary
//!
//! The orchestrator treats resource management as an external collaborator
//! behind the [`ResourceManager`] trait: a precondition check, an allocation
//! per phase start, and a mandatory completion report that feeds adaptive
//! behavior. This module also defines the pressure levels and degradation
//! profiles shared by the executor and the resource monitor.
//!
//! [`AdaptiveResourceManager`] is the in-process default implementation used
//! by tests and single-node deployments.

pub mod adaptive;

pub use adaptive::{AdaptiveResourceConfig, AdaptiveResourceManager};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// System pressure level reported by the resource manager
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PressureLevel {
    /// Normal headroom, no degradation
    Normal,
    /// Resources are tight, degrade advisory limits
    Elevated,
    /// Emergency: interrupt in-flight work cooperatively
    Critical,
}

impl fmt::Display for PressureLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Normal => write!(f, "normal"),
            Self::Elevated => write!(f, "elevated"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

/// Advisory execution hints injected into a phase's context under pressure.
///
/// Phases may honor or ignore these; the orchestrator only guarantees they
/// are present in the execution context before the phase starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DegradationProfile {
    /// Factor applied to entity/result limits (1.0 = no reduction)
    pub limit_scale: f64,
    /// Skip expensive computations entirely
    pub disable_expensive: bool,
    /// Prefer simplified analysis methods
    pub simplified_methods: bool,
    /// Reduced embedding dimensionality, when set
    pub embedding_dimensions: Option<u32>,
}

impl DegradationProfile {
    /// No degradation: full limits, full methods
    pub fn none() -> Self {
        Self {
            limit_scale: 1.0,
            disable_expensive: false,
            simplified_methods: false,
            embedding_dimensions: None,
        }
    }

    /// Map a pressure level to its degradation profile
    pub fn for_pressure(level: PressureLevel) -> Self {
        match level {
            PressureLevel::Normal => Self::none(),
            PressureLevel::Elevated => Self {
                limit_scale: 0.5,
                disable_expensive: true,
                simplified_methods: false,
                embedding_dimensions: Some(256),
            },
            PressureLevel::Critical => Self {
                limit_scale: 0.2,
                disable_expensive: true,
                simplified_methods: true,
                embedding_dimensions: Some(64),
            },
        }
    }

    pub fn is_degraded(&self) -> bool {
        *self != Self::none()
    }
}

impl Default for DegradationProfile {
    fn default() -> Self {
        Self::none()
    }
}

/// Resources granted to a single phase execution.
///
/// Returned by [`ResourceManager::start_execution`]; consumed, not owned, by
/// the executor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceAllocation {
    pub max_memory_mb: u64,
    pub max_workers: u32,
    pub degradation: DegradationProfile,
}

impl Default for ResourceAllocation {
    fn default() -> Self {
        Self {
            max_memory_mb: 1024,
            max_workers: 4,
            degradation: DegradationProfile::none(),
        }
    }
}

/// External collaborator boundary for resource accounting.
///
/// `end_execution` must be called exactly once per `start_execution`,
/// regardless of how the phase finished; the executor enforces that.
#[async_trait]
pub trait ResourceManager: Send + Sync {
    /// Precondition check: may this phase execute right now?
    async fn can_execute(&self, phase_id: &str) -> (bool, Option<String>);

    /// Allocate resources for a phase that passed the precondition check
    async fn start_execution(&self, phase_id: &str) -> ResourceAllocation;

    /// Completion report for adaptive feedback. Runs on every exit path.
    async fn end_execution(&self, phase_id: &str, success: bool, duration: Duration, memory_mb: u64);

    /// Capabilities advertised for startup contract validation
    fn capabilities(&self) -> Vec<String>;

    /// Current pressure level, polled by the resource monitor
    async fn pressure(&self) -> PressureLevel;
}
