//! # Orchestration Lifecycle State Machine
//!
//! Enforces the legal run lifecycle transitions and keeps an append-only
//! audit log of every transition. One state machine instance exists per run
//! and is owned by the orchestrator driver.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use tracing::info;

/// Lifecycle states for a single orchestration run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrchestrationState {
    /// Run object exists but nothing has happened yet
    Idle,
    /// Graph validation and contract checks in progress
    Initializing,
    /// Driver loop is scheduling and executing phases
    Running,
    /// Stop requested, draining active phases
    Stopping,
    /// Run was stopped before completion
    Stopped,
    /// Every phase completed successfully
    Completed,
    /// Run finished but some phases failed or were blocked
    CompletedWithErrors,
}

impl OrchestrationState {
    /// Check if this is a terminal state (no further transitions allowed)
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::CompletedWithErrors | Self::Stopped
        )
    }

    /// Check if the driver loop is allowed to schedule work
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Running)
    }
}

impl Default for OrchestrationState {
    fn default() -> Self {
        Self::Idle
    }
}

impl fmt::Display for OrchestrationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Initializing => write!(f, "initializing"),
            Self::Running => write!(f, "running"),
            Self::Stopping => write!(f, "stopping"),
            Self::Stopped => write!(f, "stopped"),
            Self::Completed => write!(f, "completed"),
            Self::CompletedWithErrors => write!(f, "completed_with_errors"),
        }
    }
}

impl std::str::FromStr for OrchestrationState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "idle" => Ok(Self::Idle),
            "initializing" => Ok(Self::Initializing),
            "running" => Ok(Self::Running),
            "stopping" => Ok(Self::Stopping),
            "stopped" => Ok(Self::Stopped),
            "completed" => Ok(Self::Completed),
            "completed_with_errors" => Ok(Self::CompletedWithErrors),
            _ => Err(format!("Invalid orchestration state: {s}")),
        }
    }
}

/// Illegal lifecycle transition
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("illegal orchestration transition {from} -> {to}")]
pub struct StateTransitionError {
    pub from: OrchestrationState,
    pub to: OrchestrationState,
}

/// One entry of the append-only transition audit log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub from: OrchestrationState,
    pub to: OrchestrationState,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
}

/// Finite state machine over [`OrchestrationState`] with transition auditing
#[derive(Debug, Default)]
pub struct OrchestrationStateMachine {
    state: OrchestrationState,
    history: Vec<TransitionRecord>,
}

impl OrchestrationStateMachine {
    /// Create a new state machine in the initial `Idle` state
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> OrchestrationState {
        self.state
    }

    /// The audit log, oldest first
    pub fn history(&self) -> &[TransitionRecord] {
        &self.history
    }

    /// Attempt a lifecycle transition, rejecting pairs absent from the
    /// transition table and recording accepted ones in the audit log.
    pub fn transition_to(
        &mut self,
        new_state: OrchestrationState,
        reason: impl Into<String>,
    ) -> Result<OrchestrationState, StateTransitionError> {
        if !Self::is_legal(self.state, new_state) {
            return Err(StateTransitionError {
                from: self.state,
                to: new_state,
            });
        }

        let reason = reason.into();
        info!(
            from = %self.state,
            to = %new_state,
            reason = %reason,
            "Orchestration lifecycle transition"
        );
        self.history.push(TransitionRecord {
            from: self.state,
            to: new_state,
            reason,
            timestamp: Utc::now(),
        });
        self.state = new_state;
        Ok(new_state)
    }

    /// The transition table
    fn is_legal(from: OrchestrationState, to: OrchestrationState) -> bool {
        use OrchestrationState::*;
        matches!(
            (from, to),
            (Idle, Initializing)
                | (Initializing, Running)
                | (Initializing, Stopped)
                | (Running, Stopping)
                | (Running, Completed)
                | (Running, CompletedWithErrors)
                | (Stopping, Stopped)
        )
    }
}
