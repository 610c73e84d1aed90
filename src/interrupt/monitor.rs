//! Background pressure monitor.
//!
//! A dedicated tokio task polls the resource manager at a fixed interval and
//! drives the shared [`InterruptController`]: critical pressure raises the
//! emergency interrupt, a return to normal clears it. Workers only ever read
//! the controller, so the monitor is the single writer of the flag.

use super::controller::InterruptController;
use crate::resource::{PressureLevel, ResourceManager};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Polls pressure and signals/clears the interrupt controller
pub struct ResourceMonitor {
    resources: Arc<dyn ResourceManager>,
    controller: Arc<InterruptController>,
    poll_interval: Duration,
    running: Arc<AtomicBool>,
}

impl ResourceMonitor {
    pub fn new(
        resources: Arc<dyn ResourceManager>,
        controller: Arc<InterruptController>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            resources,
            controller,
            poll_interval,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Spawn the polling loop. Stop it with [`ResourceMonitor::stop`]; the
    /// returned handle resolves once the loop exits.
    pub fn start(&self) -> JoinHandle<()> {
        self.running.store(true, Ordering::Release);

        let resources = Arc::clone(&self.resources);
        let controller = Arc::clone(&self.controller);
        let running = Arc::clone(&self.running);
        let poll_interval = self.poll_interval;

        tokio::spawn(async move {
            info!(
                poll_interval_ms = poll_interval.as_millis() as u64,
                "Resource monitor started"
            );
            let mut ticker = tokio::time::interval(poll_interval);
            // The first tick fires immediately; that initial poll is wanted.
            while running.load(Ordering::Acquire) {
                ticker.tick().await;
                let level = resources.pressure().await;
                debug!(pressure = %level, "Pressure poll");
                match level {
                    PressureLevel::Critical => {
                        if !controller.should_interrupt() {
                            controller
                                .signal_interrupt(format!("resource pressure {level}"));
                        }
                    }
                    PressureLevel::Normal => controller.clear_interrupt(),
                    PressureLevel::Elevated => {
                        // Degradation hints handle elevated pressure; no
                        // interrupt until it becomes critical.
                    }
                }
            }
            info!("Resource monitor stopped");
        })
    }

    /// Request the polling loop to exit after its current tick
    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
    }
}
