//! Execution context handed to phase implementations.
//!
//! Carries the run identity, opaque phase parameters, and the advisory
//! degradation hints derived from the resource allocation. The orchestrator
//! fills it in; phases read it.

use crate::resource::{DegradationProfile, ResourceAllocation};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Context for one phase execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionContext {
    pub run_id: Uuid,
    pub phase_id: String,
    /// Opaque parameters owned by the phase implementation
    pub params: HashMap<String, serde_json::Value>,
    /// Scheduling priority of the phase; scales the timeout allowance
    pub priority: i32,
    /// Advisory degradation hints; phases may honor or ignore them
    pub degradation: DegradationProfile,
    /// Entity processing ceiling after degradation scaling, when configured
    pub entity_limit: Option<u64>,
    /// Result set ceiling after degradation scaling, when configured
    pub result_limit: Option<u64>,
    /// Worker budget granted by the allocation
    pub max_workers: u32,
    /// Memory budget granted by the allocation
    pub max_memory_mb: u64,
}

impl ExecutionContext {
    pub fn new(phase_id: impl Into<String>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            phase_id: phase_id.into(),
            params: HashMap::new(),
            priority: 0,
            degradation: DegradationProfile::none(),
            entity_limit: None,
            result_limit: None,
            max_workers: 1,
            max_memory_mb: 0,
        }
    }

    pub fn for_run(run_id: Uuid, phase_id: impl Into<String>) -> Self {
        Self {
            run_id,
            ..Self::new(phase_id)
        }
    }

    pub fn with_params(mut self, params: HashMap<String, serde_json::Value>) -> Self {
        self.params = params;
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Baseline processing limits before degradation scaling
    pub fn with_limits(mut self, entity_limit: Option<u64>, result_limit: Option<u64>) -> Self {
        self.entity_limit = entity_limit;
        self.result_limit = result_limit;
        self
    }

    /// Inject the allocation's budgets and degradation hints, scaling any
    /// configured limits by the degradation factor.
    pub fn apply_allocation(&mut self, allocation: &ResourceAllocation) {
        self.max_workers = allocation.max_workers;
        self.max_memory_mb = allocation.max_memory_mb;
        self.degradation = allocation.degradation.clone();

        let scale = allocation.degradation.limit_scale;
        self.entity_limit = self
            .entity_limit
            .map(|limit| ((limit as f64 * scale) as u64).max(1));
        self.result_limit = self
            .result_limit
            .map(|limit| ((limit as f64 * scale) as u64).max(1));
    }
}
