//! Shared interrupt flag with reason and timestamp.
//!
//! Signal and check are each a single mutex acquisition, so the resource
//! monitor and any number of workers can use one controller without further
//! coordination.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Snapshot of the interrupt flag
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InterruptState {
    pub is_set: bool,
    pub reason: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
}

/// Thread-safe cooperative interruption flag
#[derive(Debug, Default)]
pub struct InterruptController {
    state: Mutex<InterruptState>,
}

impl InterruptController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the interrupt flag. Subsequent `should_interrupt` calls return
    /// true until the flag is cleared. Re-signaling refreshes the reason.
    pub fn signal_interrupt(&self, reason: impl Into<String>) {
        let reason = reason.into();
        warn!(reason = %reason, "Emergency interrupt signaled");
        let mut state = self.state.lock();
        state.is_set = true;
        state.reason = Some(reason);
        state.timestamp = Some(Utc::now());
    }

    /// Lower the interrupt flag
    pub fn clear_interrupt(&self) {
        let mut state = self.state.lock();
        if state.is_set {
            info!("Interrupt cleared");
        }
        *state = InterruptState::default();
    }

    pub fn should_interrupt(&self) -> bool {
        self.state.lock().is_set
    }

    pub fn state(&self) -> InterruptState {
        self.state.lock().clone()
    }
}
