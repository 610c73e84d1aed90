//! Step-sequence execution with checkpoint-aligned interruption.
//!
//! Work between checkpoints is neither rolled back nor guaranteed
//! consistent; only results from fully completed steps are retained. The
//! partial-result store outlives individual attempts and is keyed by task
//! id until explicitly cleared.

use super::controller::InterruptController;
use crate::executor::{ExecutionContext, ExecutionError};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// One unit of interruptible work inside a phase
#[async_trait]
pub trait ExecutionStep: Send + Sync {
    fn name(&self) -> &str;

    async fn run(&self, ctx: &ExecutionContext) -> Result<serde_json::Value, ExecutionError>;
}

/// Progress retained across an interrupted step sequence
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct PartialExecutionResult {
    pub task_id: String,
    pub completed_steps: usize,
    pub total_steps: usize,
    /// Outputs of completed steps, in original step order
    pub partial_results: Vec<serde_json::Value>,
    pub interrupt_reason: Option<String>,
    pub resumable: bool,
}

impl PartialExecutionResult {
    pub fn is_complete(&self) -> bool {
        self.completed_steps == self.total_steps
    }
}

/// Runs step sequences with a checkpoint before every step
pub struct InterruptibleExecutor {
    controller: Arc<InterruptController>,
    partials: DashMap<String, PartialExecutionResult>,
}

impl InterruptibleExecutor {
    pub fn new(controller: Arc<InterruptController>) -> Self {
        Self {
            controller,
            partials: DashMap::new(),
        }
    }

    pub fn controller(&self) -> &Arc<InterruptController> {
        &self.controller
    }

    /// Execute a step sequence from the beginning.
    ///
    /// On interrupt, the emergency signal is absorbed here: progress so far
    /// is persisted and returned as a resumable partial result instead of an
    /// error. Step failures propagate as [`ExecutionError`].
    pub async fn execute_steps(
        &self,
        task_id: &str,
        steps: &[Arc<dyn ExecutionStep>],
        ctx: &ExecutionContext,
    ) -> Result<PartialExecutionResult, ExecutionError> {
        self.run_from(task_id, steps, ctx, 0, Vec::new()).await
    }

    /// Resume a previously interrupted sequence, skipping completed steps.
    /// Merged results preserve the original step ordering.
    pub async fn resume_execution(
        &self,
        task_id: &str,
        steps: &[Arc<dyn ExecutionStep>],
        ctx: &ExecutionContext,
    ) -> Result<PartialExecutionResult, ExecutionError> {
        let saved = match self.partials.get(task_id) {
            Some(entry) => entry.clone(),
            None => {
                warn!(task_id = %task_id, "Resume requested but no partial result saved");
                return self.execute_steps(task_id, steps, ctx).await;
            }
        };

        if !saved.resumable {
            warn!(task_id = %task_id, "Saved result is not resumable, restarting");
            return self.execute_steps(task_id, steps, ctx).await;
        }

        info!(
            task_id = %task_id,
            completed = saved.completed_steps,
            total = steps.len(),
            "Resuming interrupted step sequence"
        );
        self.run_from(
            task_id,
            steps,
            ctx,
            saved.completed_steps,
            saved.partial_results,
        )
        .await
    }

    /// Look up the saved partial result for a task
    pub fn partial_result(&self, task_id: &str) -> Option<PartialExecutionResult> {
        self.partials.get(task_id).map(|entry| entry.clone())
    }

    /// Drop the saved partial result once the caller is done with it
    pub fn clear_partial(&self, task_id: &str) -> Option<PartialExecutionResult> {
        self.partials.remove(task_id).map(|(_, result)| result)
    }

    async fn run_from(
        &self,
        task_id: &str,
        steps: &[Arc<dyn ExecutionStep>],
        ctx: &ExecutionContext,
        start_at: usize,
        mut results: Vec<serde_json::Value>,
    ) -> Result<PartialExecutionResult, ExecutionError> {
        let total = steps.len();

        for (index, step) in steps.iter().enumerate().skip(start_at) {
            // Checkpoint: interruption is observed only here.
            if self.controller.should_interrupt() {
                let reason = self.controller.state().reason;
                let partial = PartialExecutionResult {
                    task_id: task_id.to_string(),
                    completed_steps: index,
                    total_steps: total,
                    partial_results: results,
                    interrupt_reason: reason.clone(),
                    resumable: true,
                };
                warn!(
                    task_id = %task_id,
                    completed = index,
                    total,
                    reason = reason.as_deref().unwrap_or("unspecified"),
                    "Step sequence interrupted, partial result persisted"
                );
                self.partials.insert(task_id.to_string(), partial.clone());
                return Ok(partial);
            }

            debug!(task_id = %task_id, step = step.name(), index, "Running step");
            let output = step.run(ctx).await?;
            results.push(output);
        }

        let complete = PartialExecutionResult {
            task_id: task_id.to_string(),
            completed_steps: total,
            total_steps: total,
            partial_results: results,
            interrupt_reason: None,
            resumable: false,
        };
        self.partials.insert(task_id.to_string(), complete.clone());
        Ok(complete)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingStep {
        name: String,
        runs: Arc<AtomicUsize>,
        interrupt_after: Option<Arc<InterruptController>>,
    }

    impl CountingStep {
        fn new(name: &str, runs: Arc<AtomicUsize>) -> Arc<dyn ExecutionStep> {
            Arc::new(Self {
                name: name.to_string(),
                runs,
                interrupt_after: None,
            })
        }

        /// Signals the controller after this step completes, so the next
        /// checkpoint observes it.
        fn interrupting(
            name: &str,
            runs: Arc<AtomicUsize>,
            controller: Arc<InterruptController>,
        ) -> Arc<dyn ExecutionStep> {
            Arc::new(Self {
                name: name.to_string(),
                runs,
                interrupt_after: Some(controller),
            })
        }
    }

    #[async_trait]
    impl ExecutionStep for CountingStep {
        fn name(&self) -> &str {
            &self.name
        }

        async fn run(&self, _ctx: &ExecutionContext) -> Result<serde_json::Value, ExecutionError> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            if let Some(controller) = &self.interrupt_after {
                controller.signal_interrupt("pressure spike");
            }
            Ok(serde_json::json!({ "step": self.name }))
        }
    }

    fn five_steps(
        runs: &Arc<AtomicUsize>,
        controller: &Arc<InterruptController>,
    ) -> Vec<Arc<dyn ExecutionStep>> {
        vec![
            CountingStep::new("load", runs.clone()),
            CountingStep::interrupting("parse", runs.clone(), controller.clone()),
            CountingStep::new("enrich", runs.clone()),
            CountingStep::new("score", runs.clone()),
            CountingStep::new("persist", runs.clone()),
        ]
    }

    #[tokio::test]
    async fn test_uninterrupted_sequence_completes() {
        let controller = Arc::new(InterruptController::new());
        let executor = InterruptibleExecutor::new(controller.clone());
        let runs = Arc::new(AtomicUsize::new(0));
        let steps = vec![
            CountingStep::new("a", runs.clone()),
            CountingStep::new("b", runs.clone()),
        ];

        let result = executor
            .execute_steps("task-1", &steps, &ExecutionContext::new("phase"))
            .await
            .unwrap();

        assert!(result.is_complete());
        assert_eq!(result.completed_steps, 2);
        assert!(!result.resumable);
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_interrupt_after_step_two_then_resume() {
        let controller = Arc::new(InterruptController::new());
        let executor = InterruptibleExecutor::new(controller.clone());
        let runs = Arc::new(AtomicUsize::new(0));
        let steps = five_steps(&runs, &controller);
        let ctx = ExecutionContext::new("enrichment");

        let partial = executor
            .execute_steps("task-9", &steps, &ctx)
            .await
            .unwrap();

        // Interrupt was signaled during step 2, observed at the checkpoint
        // before step 3.
        assert_eq!(partial.completed_steps, 2);
        assert_eq!(partial.total_steps, 5);
        assert!(partial.resumable);
        assert_eq!(partial.interrupt_reason.as_deref(), Some("pressure spike"));
        assert_eq!(runs.load(Ordering::SeqCst), 2);

        controller.clear_interrupt();
        let resumed = executor
            .resume_execution("task-9", &steps, &ctx)
            .await
            .unwrap();

        // Exactly steps 3-5 ran on resume
        assert_eq!(resumed.completed_steps, 5);
        assert!(resumed.is_complete());
        assert_eq!(runs.load(Ordering::SeqCst), 5);

        // Merged results preserve original ordering
        let names: Vec<&str> = resumed
            .partial_results
            .iter()
            .map(|v| v["step"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["load", "parse", "enrich", "score", "persist"]);
    }

    #[tokio::test]
    async fn test_resume_without_saved_state_restarts() {
        let controller = Arc::new(InterruptController::new());
        let executor = InterruptibleExecutor::new(controller);
        let runs = Arc::new(AtomicUsize::new(0));
        let steps = vec![CountingStep::new("only", runs.clone())];

        let result = executor
            .resume_execution("never-seen", &steps, &ExecutionContext::new("phase"))
            .await
            .unwrap();
        assert!(result.is_complete());
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_partial_persists_until_cleared() {
        let controller = Arc::new(InterruptController::new());
        let executor = InterruptibleExecutor::new(controller.clone());
        let runs = Arc::new(AtomicUsize::new(0));
        let steps = five_steps(&runs, &controller);

        executor
            .execute_steps("sticky", &steps, &ExecutionContext::new("phase"))
            .await
            .unwrap();

        assert!(executor.partial_result("sticky").is_some());
        let cleared = executor.clear_partial("sticky").unwrap();
        assert_eq!(cleared.completed_steps, 2);
        assert!(executor.partial_result("sticky").is_none());
    }

    #[tokio::test]
    async fn test_interrupt_before_first_step() {
        let controller = Arc::new(InterruptController::new());
        controller.signal_interrupt("preemptive");
        let executor = InterruptibleExecutor::new(controller);
        let runs = Arc::new(AtomicUsize::new(0));
        let steps = vec![CountingStep::new("a", runs.clone())];

        let partial = executor
            .execute_steps("task-0", &steps, &ExecutionContext::new("phase"))
            .await
            .unwrap();
        assert_eq!(partial.completed_steps, 0);
        assert!(partial.resumable);
        assert_eq!(runs.load(Ordering::SeqCst), 0);
    }
}
