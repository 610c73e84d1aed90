//! In-process resource manager with adaptive feedback.
//!
//! Tracks a bounded window of recent phase outcomes and concurrent load.
//! Repeated failures or long durations raise the reported pressure level and
//! shrink subsequent allocations, which in turn injects degradation hints
//! into later phases.

use super::{DegradationProfile, PressureLevel, ResourceAllocation, ResourceManager};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::Duration;
use tracing::{debug, warn};

const OUTCOME_WINDOW: usize = 32;

/// Tuning knobs for [`AdaptiveResourceManager`]
#[derive(Debug, Clone)]
pub struct AdaptiveResourceConfig {
    /// Memory budget shared by concurrent phases
    pub total_memory_mb: u64,
    /// Worker budget shared by concurrent phases
    pub total_workers: u32,
    /// Concurrent executions above this report elevated pressure
    pub elevated_load: usize,
    /// Concurrent executions above this report critical pressure
    pub critical_load: usize,
    /// Failure rate over the outcome window that forces elevated pressure
    pub failure_rate_threshold: f64,
    /// Capabilities advertised for contract validation
    pub capabilities: Vec<String>,
}

impl Default for AdaptiveResourceConfig {
    fn default() -> Self {
        Self {
            total_memory_mb: 8192,
            total_workers: 16,
            elevated_load: 4,
            critical_load: 8,
            failure_rate_threshold: 0.5,
            capabilities: vec![
                "document_store".to_string(),
                "nlp".to_string(),
                "scoring".to_string(),
            ],
        }
    }
}

#[derive(Debug, Default)]
struct AdaptiveState {
    in_flight: usize,
    /// Success/failure of the most recent executions, oldest first
    outcomes: VecDeque<bool>,
    forced_pressure: Option<PressureLevel>,
}

/// Default [`ResourceManager`] implementation
#[derive(Debug)]
pub struct AdaptiveResourceManager {
    config: AdaptiveResourceConfig,
    state: Mutex<AdaptiveState>,
}

impl AdaptiveResourceManager {
    pub fn new(config: AdaptiveResourceConfig) -> Self {
        Self {
            config,
            state: Mutex::new(AdaptiveState::default()),
        }
    }

    /// Pin the reported pressure level, overriding load heuristics. Tests and
    /// operator tooling use this to drive degradation deterministically.
    pub fn force_pressure(&self, level: Option<PressureLevel>) {
        self.state.lock().forced_pressure = level;
    }

    pub fn in_flight(&self) -> usize {
        self.state.lock().in_flight
    }

    fn current_pressure(&self, state: &AdaptiveState) -> PressureLevel {
        if let Some(forced) = state.forced_pressure {
            return forced;
        }
        if state.in_flight >= self.config.critical_load {
            return PressureLevel::Critical;
        }
        let window = state.outcomes.len();
        if window >= 4 {
            let failures = state.outcomes.iter().filter(|ok| !**ok).count();
            if failures as f64 / window as f64 >= self.config.failure_rate_threshold {
                return PressureLevel::Elevated;
            }
        }
        if state.in_flight >= self.config.elevated_load {
            PressureLevel::Elevated
        } else {
            PressureLevel::Normal
        }
    }
}

impl Default for AdaptiveResourceManager {
    fn default() -> Self {
        Self::new(AdaptiveResourceConfig::default())
    }
}

#[async_trait]
impl ResourceManager for AdaptiveResourceManager {
    async fn can_execute(&self, phase_id: &str) -> (bool, Option<String>) {
        let state = self.state.lock();
        if self.current_pressure(&state) == PressureLevel::Critical {
            warn!(phase_id = %phase_id, "Rejecting execution under critical pressure");
            return (
                false,
                Some("resource pressure is critical".to_string()),
            );
        }
        if state.in_flight as u32 >= self.config.total_workers {
            return (
                false,
                Some(format!(
                    "worker budget exhausted ({} in flight)",
                    state.in_flight
                )),
            );
        }
        (true, None)
    }

    async fn start_execution(&self, phase_id: &str) -> ResourceAllocation {
        let mut state = self.state.lock();
        state.in_flight += 1;

        let pressure = self.current_pressure(&state);
        let share = (state.in_flight as u64).max(1);
        let allocation = ResourceAllocation {
            max_memory_mb: self.config.total_memory_mb / share,
            max_workers: (self.config.total_workers / share as u32).max(1),
            degradation: DegradationProfile::for_pressure(pressure),
        };
        debug!(
            phase_id = %phase_id,
            in_flight = state.in_flight,
            pressure = %pressure,
            max_memory_mb = allocation.max_memory_mb,
            max_workers = allocation.max_workers,
            "Allocated phase resources"
        );
        allocation
    }

    async fn end_execution(
        &self,
        phase_id: &str,
        success: bool,
        duration: Duration,
        memory_mb: u64,
    ) {
        let mut state = self.state.lock();
        state.in_flight = state.in_flight.saturating_sub(1);
        state.outcomes.push_back(success);
        while state.outcomes.len() > OUTCOME_WINDOW {
            state.outcomes.pop_front();
        }
        debug!(
            phase_id = %phase_id,
            success,
            duration_ms = duration.as_millis() as u64,
            memory_mb,
            in_flight = state.in_flight,
            "Recorded execution outcome"
        );
    }

    fn capabilities(&self) -> Vec<String> {
        self.config.capabilities.clone()
    }

    async fn pressure(&self) -> PressureLevel {
        let state = self.state.lock();
        self.current_pressure(&state)
    }
}
