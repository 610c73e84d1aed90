//! # Orchestrator Configuration
//!
//! Layered configuration loading: compiled defaults, then an optional TOML
//! file, then `DOCPIPE_`-prefixed environment overrides. Loading is explicit
//! and validated; there are no silent fallbacks for nonsensical values.
//!
//! ```rust,no_run
//! use docpipe_core::config::OrchestratorConfig;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = OrchestratorConfig::load(None)?;
//! println!("max parallel phases: {}", config.max_parallel_phases);
//! # Ok(())
//! # }
//! ```

use crate::scheduler::SchedulingStrategy;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Configuration loading and validation errors
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid configuration: {field}: {message}")]
    Invalid { field: String, message: String },
}

/// Execution mode recognized in configuration files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    Sequential,
    Parallel,
    Hybrid,
}

impl ExecutionMode {
    /// Scheduling strategy implied by this mode
    pub fn strategy(&self) -> SchedulingStrategy {
        match self {
            Self::Sequential => SchedulingStrategy::Sequential,
            Self::Parallel => SchedulingStrategy::Parallel,
            Self::Hybrid => SchedulingStrategy::Hybrid,
        }
    }
}

/// Retry backoff settings (exponential with optional jitter)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackoffSettings {
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub multiplier: f64,
    pub jitter_enabled: bool,
    /// Maximum jitter as a fraction of the computed delay (0.0 to 1.0)
    pub max_jitter: f64,
}

impl Default for BackoffSettings {
    fn default() -> Self {
        Self {
            base_delay_ms: 500,
            max_delay_ms: 60_000,
            multiplier: 2.0,
            jitter_enabled: true,
            max_jitter: 0.1,
        }
    }
}

/// Circuit breaker settings applied per phase
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerSettings {
    pub failure_threshold: u32,
    pub cooldown_seconds: u64,
    pub transition_history: usize,
}

impl Default for CircuitBreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            cooldown_seconds: 30,
            transition_history: 16,
        }
    }
}

impl CircuitBreakerSettings {
    pub fn to_breaker_config(&self) -> crate::resilience::CircuitBreakerConfig {
        crate::resilience::CircuitBreakerConfig {
            failure_threshold: self.failure_threshold,
            cooldown: Duration::from_secs(self.cooldown_seconds),
            transition_history: self.transition_history,
        }
    }
}

/// Root orchestrator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    pub mode: ExecutionMode,
    pub max_parallel_phases: usize,
    pub phase_timeout_seconds: u64,
    pub retry_failed_phases: bool,
    pub max_retries_per_phase: u32,
    pub emit_decision_signals: bool,
    pub validate_contracts_on_startup: bool,
    pub fail_fast_on_contract_violation: bool,
    /// Pressure poll interval for the resource monitor
    pub monitor_interval_ms: u64,
    pub backoff: BackoffSettings,
    pub circuit_breaker: CircuitBreakerSettings,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            mode: ExecutionMode::Hybrid,
            max_parallel_phases: 4,
            phase_timeout_seconds: 300,
            retry_failed_phases: true,
            max_retries_per_phase: 2,
            emit_decision_signals: true,
            validate_contracts_on_startup: true,
            fail_fast_on_contract_violation: true,
            monitor_interval_ms: 1_000,
            backoff: BackoffSettings::default(),
            circuit_breaker: CircuitBreakerSettings::default(),
        }
    }
}

impl OrchestratorConfig {
    /// Load configuration: defaults, then the given TOML file (when present),
    /// then `DOCPIPE_`-prefixed environment variables (`DOCPIPE_MODE`,
    /// `DOCPIPE_MAX_PARALLEL_PHASES`, nested fields via `__`).
    pub fn load(file: Option<&Path>) -> Result<Self, ConfigurationError> {
        let mut builder =
            config::Config::builder().add_source(config::Config::try_from(&Self::default())?);

        if let Some(path) = file {
            debug!(path = %path.display(), "Layering configuration file");
            builder = builder.add_source(config::File::from(path).required(false));
        }

        let settings = builder
            .add_source(
                config::Environment::with_prefix("DOCPIPE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let loaded: Self = settings.try_deserialize()?;
        loaded.validate()?;
        Ok(loaded)
    }

    /// Reject values the driver loop cannot operate with
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.max_parallel_phases == 0 {
            return Err(ConfigurationError::Invalid {
                field: "max_parallel_phases".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.phase_timeout_seconds == 0 {
            return Err(ConfigurationError::Invalid {
                field: "phase_timeout_seconds".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.backoff.multiplier < 1.0 {
            return Err(ConfigurationError::Invalid {
                field: "backoff.multiplier".to_string(),
                message: "must be >= 1.0".to_string(),
            });
        }
        if !(0.0..=1.0).contains(&self.backoff.max_jitter) {
            return Err(ConfigurationError::Invalid {
                field: "backoff.max_jitter".to_string(),
                message: "must be within [0.0, 1.0]".to_string(),
            });
        }
        if self.circuit_breaker.failure_threshold == 0 {
            return Err(ConfigurationError::Invalid {
                field: "circuit_breaker.failure_threshold".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    pub fn phase_timeout(&self) -> Duration {
        Duration::from_secs(self.phase_timeout_seconds)
    }

    pub fn monitor_interval(&self) -> Duration {
        Duration::from_millis(self.monitor_interval_ms)
    }

    /// Configuration tuned for fast test runs
    pub fn for_testing() -> Self {
        Self {
            phase_timeout_seconds: 2,
            monitor_interval_ms: 20,
            backoff: BackoffSettings {
                base_delay_ms: 10,
                max_delay_ms: 100,
                jitter_enabled: false,
                ..BackoffSettings::default()
            },
            ..Self::default()
        }
    }
}
