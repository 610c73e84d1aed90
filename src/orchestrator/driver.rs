//! Driver loop running a dependency graph to a terminal lifecycle state.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::OrchestratorConfig;
use crate::error::{OrchestrationError, Result};
use crate::executor::{ExecutionContext, PhaseHandler, ResourceAwareExecutor};
use crate::graph::{DependencyGraph, PhaseStatus};
use crate::interrupt::{InterruptController, ResourceMonitor};
use crate::resilience::CircuitBreaker;
use crate::resource::ResourceManager;
use crate::scheduler::PhaseScheduler;
use crate::signals::{
    topics, CompletionStatus, DecisionType, DependencyGraphUpdatedSignal,
    OrchestrationDecisionSignal, PhaseCompleteSignal, PhaseStartSignal, SignalBus,
};
use crate::state_machine::{OrchestrationState, OrchestrationStateMachine};

use super::BackoffPolicy;

/// Final report of one orchestration run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionSummary {
    pub run_id: Uuid,
    pub final_state: OrchestrationState,
    pub completed: Vec<String>,
    pub failed: Vec<String>,
    pub blocked: Vec<String>,
    /// Retry attempts consumed per phase (phases never retried are absent)
    pub retries: HashMap<String, u32>,
    pub duration: Duration,
}

/// Per-run bookkeeping the loop threads through completion handling
struct RunState {
    active: HashSet<String>,
    retry_counts: HashMap<String, u32>,
    /// Earliest instant a failed phase may be offered to the scheduler again
    retry_not_before: HashMap<String, Instant>,
}

/// Event-driven orchestration driver.
///
/// Owns the graph for the duration of a run and is the only task that
/// mutates it; workers report back over an mpsc completion queue the driver
/// alone consumes. Signals on the bus are an observation surface, not the
/// control path.
pub struct Orchestrator {
    config: OrchestratorConfig,
    graph: DependencyGraph,
    scheduler: PhaseScheduler,
    lifecycle: OrchestrationStateMachine,
    bus: SignalBus,
    resources: Arc<dyn ResourceManager>,
    executor: ResourceAwareExecutor,
    handlers: HashMap<String, Arc<dyn PhaseHandler>>,
    breakers: HashMap<String, Arc<CircuitBreaker>>,
    backoff: BackoffPolicy,
    interrupts: Arc<InterruptController>,
    run_id: Uuid,
    stop_requested: Arc<AtomicBool>,
}

impl Orchestrator {
    pub fn new(
        config: OrchestratorConfig,
        graph: DependencyGraph,
        resources: Arc<dyn ResourceManager>,
    ) -> Self {
        let executor = ResourceAwareExecutor::new(Arc::clone(&resources), config.phase_timeout());
        let breaker_config = config.circuit_breaker.to_breaker_config();
        let breakers = graph
            .phase_ids()
            .map(|id| {
                (
                    id.to_string(),
                    Arc::new(CircuitBreaker::new(id, breaker_config.clone())),
                )
            })
            .collect();
        Self {
            scheduler: PhaseScheduler::new(config.mode.strategy()),
            backoff: BackoffPolicy::new(config.backoff.clone()),
            config,
            graph,
            lifecycle: OrchestrationStateMachine::new(),
            bus: SignalBus::default(),
            resources,
            executor,
            handlers: HashMap::new(),
            breakers,
            interrupts: Arc::new(InterruptController::new()),
            run_id: Uuid::new_v4(),
            stop_requested: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn register_handler(&mut self, phase_id: impl Into<String>, handler: Arc<dyn PhaseHandler>) {
        self.handlers.insert(phase_id.into(), handler);
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn state(&self) -> OrchestrationState {
        self.lifecycle.state()
    }

    pub fn bus(&self) -> &SignalBus {
        &self.bus
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    /// Controller that cooperative handlers should observe for interruption
    pub fn interrupt_controller(&self) -> Arc<InterruptController> {
        Arc::clone(&self.interrupts)
    }

    pub fn breaker(&self, phase_id: &str) -> Option<&Arc<CircuitBreaker>> {
        self.breakers.get(phase_id)
    }

    /// Handle for requesting a graceful stop from another task. The run
    /// drains in-flight phases, then settles in `Stopped`.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop_requested)
    }

    /// Check every phase's declared needs against what the runtime provides:
    /// expected signal topics must exist on the bus, required capabilities
    /// must be advertised by the resource manager, and a handler must be
    /// registered.
    pub fn validate_contracts(&self) -> Result<()> {
        let capabilities: HashSet<String> = self.resources.capabilities().into_iter().collect();
        let mut violations = Vec::new();

        for node in self.graph.nodes() {
            for topic in &node.expected_signals {
                if !topics::ALL.contains(&topic.as_str()) {
                    violations.push(format!(
                        "phase '{}' expects unknown signal topic '{}'",
                        node.phase_id, topic
                    ));
                }
            }
            for capability in &node.required_capabilities {
                if !capabilities.contains(capability) {
                    violations.push(format!(
                        "phase '{}' requires capability '{}' the resource manager does not provide",
                        node.phase_id, capability
                    ));
                }
            }
            if !self.handlers.contains_key(&node.phase_id) {
                violations.push(format!("phase '{}' has no registered handler", node.phase_id));
            }
        }

        if violations.is_empty() {
            Ok(())
        } else {
            Err(OrchestrationError::ContractViolation { violations })
        }
    }

    /// Drive the graph to a terminal state and return the run report.
    ///
    /// Lifecycle: `Idle -> Initializing -> Running -> {Completed,
    /// CompletedWithErrors}`, or `Running -> Stopping -> Stopped` on a stop
    /// request, or `Initializing -> Stopped` on a fatal contract violation.
    pub async fn run(&mut self) -> Result<ExecutionSummary> {
        let run_started = Instant::now();
        self.lifecycle
            .transition_to(OrchestrationState::Initializing, "run started")?;
        info!(run_id = %self.run_id, phases = self.graph.node_count(), "Orchestration run starting");

        if self.config.validate_contracts_on_startup {
            if let Err(err) = self.validate_contracts() {
                if self.config.fail_fast_on_contract_violation {
                    self.lifecycle
                        .transition_to(OrchestrationState::Stopped, "contract violation")?;
                    return Err(err);
                }
                warn!(error = %err, "Continuing despite contract violations");
            }
        }

        self.lifecycle
            .transition_to(OrchestrationState::Running, "initialization complete")?;

        let monitor = ResourceMonitor::new(
            Arc::clone(&self.resources),
            Arc::clone(&self.interrupts),
            self.config.monitor_interval(),
        );
        let monitor_handle = monitor.start();

        let result = self.drive(run_started).await;

        monitor.stop();
        monitor_handle.abort();
        result
    }

    async fn drive(&mut self, run_started: Instant) -> Result<ExecutionSummary> {
        let (completion_tx, mut completion_rx) =
            mpsc::channel::<PhaseCompleteSignal>(self.graph.node_count().max(16));
        let mut run = RunState {
            active: HashSet::new(),
            retry_counts: HashMap::new(),
            retry_not_before: HashMap::new(),
        };

        loop {
            if self.stop_requested.load(Ordering::SeqCst)
                && self.lifecycle.state() == OrchestrationState::Running
            {
                self.lifecycle
                    .transition_to(OrchestrationState::Stopping, "stop requested")?;
            }

            if self.lifecycle.state() == OrchestrationState::Stopping {
                while !run.active.is_empty() {
                    if let Some(signal) = completion_rx.recv().await {
                        self.handle_completion(signal, &mut run)?;
                    } else {
                        break;
                    }
                }
                self.lifecycle
                    .transition_to(OrchestrationState::Stopped, "in-flight phases drained")?;
                return Ok(self.summarize(run_started, &run));
            }

            if run.active.is_empty() && self.all_settled() {
                break;
            }

            let started_count = self.schedule_pass(&mut run, &completion_tx)?;

            if !run.active.is_empty() {
                // Block until the next completion. A pending retry gate also
                // counts as a wakeup source, since its expiry can make a
                // phase startable before anything finishes.
                if run.retry_not_before.is_empty() {
                    if let Some(signal) = completion_rx.recv().await {
                        self.handle_completion(signal, &mut run)?;
                    }
                } else {
                    tokio::select! {
                        signal = completion_rx.recv() => {
                            if let Some(signal) = signal {
                                self.handle_completion(signal, &mut run)?;
                            }
                        }
                        _ = tokio::time::sleep(self.next_wakeup(&run)) => {}
                    }
                }
            } else if started_count == 0 {
                // Nothing running and nothing startable: a retry delay or a
                // breaker cooldown has to elapse before progress resumes.
                tokio::time::sleep(self.next_wakeup(&run)).await;
            }
        }

        let blocked = self.graph.get_permanently_blocked();
        let failed: Vec<String> = self.statuses_matching(PhaseStatus::is_failure);
        let (final_state, reason) = if failed.is_empty() && blocked.is_empty() {
            (OrchestrationState::Completed, "all phases completed")
        } else {
            (
                OrchestrationState::CompletedWithErrors,
                "run finished with failed or blocked phases",
            )
        };
        self.lifecycle.transition_to(final_state, reason)?;

        let summary = self.summarize(run_started, &run);
        info!(
            run_id = %self.run_id,
            final_state = %summary.final_state,
            completed = summary.completed.len(),
            failed = summary.failed.len(),
            blocked = summary.blocked.len(),
            "Orchestration run finished"
        );
        Ok(summary)
    }

    /// One scheduling pass: consult the scheduler, gate each selection
    /// through backoff timers and its circuit breaker, and launch the
    /// survivors. Returns how many phases were actually started.
    fn schedule_pass(
        &mut self,
        run: &mut RunState,
        completion_tx: &mpsc::Sender<PhaseCompleteSignal>,
    ) -> Result<usize> {
        let (completed, failed) = self.settled_sets();
        let decision = self.scheduler.select_phases(
            &self.graph,
            &completed,
            &failed,
            &run.active,
            self.config.max_parallel_phases,
        )?;

        if self.config.emit_decision_signals {
            let decision_type = if decision.phases_to_start.is_empty() {
                DecisionType::AllWaiting
            } else {
                DecisionType::PhasesSelected
            };
            self.bus.decisions.publish(OrchestrationDecisionSignal {
                decision_type,
                rationale: decision.rationale.clone(),
                phases_selected: decision.phases_to_start.clone(),
                phases_waiting: decision.phases_waiting.clone(),
                phases_blocked: decision.phases_blocked.clone(),
                dependency_state: self.graph.status_map(),
            });
        }

        let now = Instant::now();
        let mut started = 0usize;
        for phase_id in decision.phases_to_start {
            if run
                .retry_not_before
                .get(&phase_id)
                .is_some_and(|at| *at > now)
            {
                continue;
            }

            let breaker = self
                .breakers
                .get(&phase_id)
                .expect("breaker exists for every graph phase");
            // An open circuit skips the attempt entirely; no retry budget is
            // consumed and the phase stays eligible for later passes.
            if breaker.try_acquire().is_err() {
                debug!(phase_id = %phase_id, "Circuit open, deferring phase");
                continue;
            }

            let Some(handler) = self.handlers.get(&phase_id).cloned() else {
                // Only reachable when contract validation was skipped or
                // downgraded to warnings.
                warn!(phase_id = %phase_id, "No handler registered, failing phase");
                self.settle_failure(&phase_id, run)?;
                continue;
            };

            self.launch_phase(&phase_id, handler, run, completion_tx)?;
            started += 1;
        }
        Ok(started)
    }

    fn launch_phase(
        &mut self,
        phase_id: &str,
        handler: Arc<dyn PhaseHandler>,
        run: &mut RunState,
        completion_tx: &mpsc::Sender<PhaseCompleteSignal>,
    ) -> Result<()> {
        let node = self
            .graph
            .node(phase_id)
            .expect("scheduler only selects known phases");
        let priority = node.priority;
        let ctx = ExecutionContext::for_run(self.run_id, phase_id)
            .with_params(node.config.clone())
            .with_priority(priority);
        let upstream: Vec<String> = self
            .graph
            .hard_upstream(phase_id)
            .map(str::to_string)
            .collect();

        self.graph.update_node_status(phase_id, PhaseStatus::Running)?;
        run.active.insert(phase_id.to_string());
        run.retry_not_before.remove(phase_id);

        self.bus.phase_start.publish(PhaseStartSignal {
            phase_id: phase_id.to_string(),
            run_id: self.run_id,
            upstream_dependencies: upstream,
            execution_context: ctx.clone(),
            // The enforced window, not the configured base: priority scaling
            // happens in the executor and the audit trail must match it.
            timeout_seconds: self.executor.timeout_for_priority(priority).as_secs(),
        });

        let executor = self.executor.clone();
        let tx = completion_tx.clone();
        let id = phase_id.to_string();
        tokio::spawn(async move {
            let started = Instant::now();
            let signal = match executor.execute_phase(&id, handler.as_ref(), ctx).await {
                Ok(outcome) => {
                    let mut signal = PhaseCompleteSignal::new(&id, outcome.status)
                        .with_metadata("output", outcome.output)
                        .with_metadata(
                            "duration_ms",
                            serde_json::json!(started.elapsed().as_millis() as u64),
                        );
                    for (key, value) in outcome.metadata {
                        signal.completion_metadata.insert(key, value);
                    }
                    signal
                }
                Err(err) => PhaseCompleteSignal::new(&id, err.completion_status())
                    .with_metadata("error", serde_json::json!(err.to_string())),
            };
            // The driver outliving its workers is the normal shutdown order;
            // a closed channel here means the run already settled.
            let _ = tx.send(signal).await;
        });
        Ok(())
    }

    fn handle_completion(&mut self, signal: PhaseCompleteSignal, run: &mut RunState) -> Result<()> {
        run.active.remove(&signal.phase_id);
        let breaker = self
            .breakers
            .get(&signal.phase_id)
            .expect("breaker exists for every graph phase")
            .clone();

        match signal.status {
            CompletionStatus::Success | CompletionStatus::Partial => {
                breaker.record_success();
                let status = if signal.status == CompletionStatus::Success {
                    PhaseStatus::Completed
                } else {
                    PhaseStatus::Partial
                };
                self.graph.update_node_status(&signal.phase_id, status)?;
                let unblocked = self.graph.get_newly_unblocked(&signal.phase_id);
                self.bus.graph_updates.publish(DependencyGraphUpdatedSignal {
                    updated_node: signal.phase_id.clone(),
                    new_status: status,
                    newly_unblocked_phases: unblocked,
                });
            }
            CompletionStatus::Deferred => {
                // Precheck rejection is back-pressure, not a phase failure:
                // like an open circuit it consumes no retry budget and feeds
                // no breaker sample. The phase waits out a short gate.
                debug!(phase_id = %signal.phase_id, "Resources unavailable, deferring phase");
                self.graph
                    .update_node_status(&signal.phase_id, PhaseStatus::PendingRetry)?;
                run.retry_not_before.insert(
                    signal.phase_id.clone(),
                    Instant::now() + Duration::from_millis(self.config.backoff.base_delay_ms),
                );
            }
            CompletionStatus::Failure | CompletionStatus::Timeout => {
                breaker.record_failure();
                let attempts = run
                    .retry_counts
                    .entry(signal.phase_id.clone())
                    .and_modify(|n| *n += 1)
                    .or_insert(1);

                if self.config.retry_failed_phases && *attempts <= self.config.max_retries_per_phase
                {
                    let delay = self.backoff.delay_for_attempt(*attempts);
                    info!(
                        phase_id = %signal.phase_id,
                        attempt = *attempts,
                        delay_ms = delay.as_millis() as u64,
                        "Phase failed, scheduling retry"
                    );
                    self.graph
                        .update_node_status(&signal.phase_id, PhaseStatus::PendingRetry)?;
                    run.retry_not_before
                        .insert(signal.phase_id.clone(), Instant::now() + delay);
                } else {
                    self.settle_failure(&signal.phase_id, run)?;
                }
            }
        }

        self.bus.phase_complete.publish(signal);
        Ok(())
    }

    /// Mark a phase permanently failed and announce the block propagation.
    fn settle_failure(&mut self, phase_id: &str, run: &mut RunState) -> Result<()> {
        run.retry_not_before.remove(phase_id);
        let newly_blocked = self
            .graph
            .update_node_status(phase_id, PhaseStatus::Failed)?;
        warn!(
            phase_id = %phase_id,
            blocked = newly_blocked.len(),
            "Phase exhausted its retries"
        );
        self.bus.graph_updates.publish(DependencyGraphUpdatedSignal {
            updated_node: phase_id.to_string(),
            new_status: PhaseStatus::Failed,
            newly_unblocked_phases: Vec::new(),
        });
        Ok(())
    }

    /// How long to sleep when no completion can arrive: until the nearest
    /// retry gate opens, falling back to a short poll for breaker cooldowns.
    fn next_wakeup(&self, run: &RunState) -> Duration {
        let now = Instant::now();
        run.retry_not_before
            .values()
            .filter(|at| **at > now)
            .map(|at| *at - now)
            .min()
            .unwrap_or(Duration::from_millis(50))
    }

    fn settled_sets(&self) -> (HashSet<String>, HashSet<String>) {
        let mut completed = HashSet::new();
        let mut failed = HashSet::new();
        for node in self.graph.nodes() {
            if node.status.satisfies_dependencies() {
                completed.insert(node.phase_id.clone());
            } else if node.status.is_failure() {
                failed.insert(node.phase_id.clone());
            }
        }
        (completed, failed)
    }

    fn all_settled(&self) -> bool {
        self.graph.nodes().all(|n| n.status.is_terminal())
    }

    fn statuses_matching(&self, predicate: fn(&PhaseStatus) -> bool) -> Vec<String> {
        self.graph
            .nodes()
            .filter(|n| predicate(&n.status))
            .map(|n| n.phase_id.clone())
            .collect()
    }

    fn summarize(&self, run_started: Instant, run: &RunState) -> ExecutionSummary {
        let blocked: BTreeSet<String> = self.graph.get_permanently_blocked();
        ExecutionSummary {
            run_id: self.run_id,
            final_state: self.lifecycle.state(),
            completed: self.statuses_matching(|s| s.satisfies_dependencies()),
            failed: self.statuses_matching(PhaseStatus::is_failure),
            blocked: blocked.into_iter().collect(),
            retries: run.retry_counts.clone(),
            duration: run_started.elapsed(),
        }
    }
}
