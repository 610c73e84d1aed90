//! End-to-end orchestration runs over realistic pipeline graphs.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use docpipe_core::config::{ExecutionMode, OrchestratorConfig};
use docpipe_core::executor::{
    ExecutionContext, ExecutionError, PhaseHandler, PhaseOutcome, ResourceAwareExecutor,
};
use docpipe_core::graph::{DependencyGraph, DependencyGraphBuilder, EdgeType, PhaseNode};
use docpipe_core::orchestrator::Orchestrator;
use docpipe_core::resource::AdaptiveResourceManager;
use docpipe_core::signals::CompletionStatus;
use docpipe_core::state_machine::OrchestrationState;

/// Handler that records invocation order and optionally fails its first
/// `fail_first` calls or sleeps to simulate work.
struct RecordingHandler {
    log: Arc<Mutex<Vec<String>>>,
    calls: AtomicU32,
    fail_first: u32,
    delay: Duration,
    partial: bool,
}

impl RecordingHandler {
    fn new(log: Arc<Mutex<Vec<String>>>) -> Arc<Self> {
        Arc::new(Self {
            log,
            calls: AtomicU32::new(0),
            fail_first: 0,
            delay: Duration::ZERO,
            partial: false,
        })
    }

    fn flaky(log: Arc<Mutex<Vec<String>>>, fail_first: u32) -> Arc<Self> {
        Arc::new(Self {
            log,
            calls: AtomicU32::new(0),
            fail_first,
            delay: Duration::ZERO,
            partial: false,
        })
    }

    fn slow(log: Arc<Mutex<Vec<String>>>, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            log,
            calls: AtomicU32::new(0),
            fail_first: 0,
            delay,
            partial: false,
        })
    }

    fn partial(log: Arc<Mutex<Vec<String>>>) -> Arc<Self> {
        Arc::new(Self {
            log,
            calls: AtomicU32::new(0),
            fail_first: 0,
            delay: Duration::ZERO,
            partial: true,
        })
    }
}

#[async_trait]
impl PhaseHandler for RecordingHandler {
    async fn execute(&self, ctx: ExecutionContext) -> Result<PhaseOutcome, ExecutionError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call <= self.fail_first {
            return Err(ExecutionError::PhaseFailed {
                phase_id: ctx.phase_id,
                message: "transient failure".to_string(),
            });
        }
        self.log.lock().push(ctx.phase_id.clone());
        let output = serde_json::json!({ "phase": ctx.phase_id, "call": call });
        Ok(if self.partial {
            PhaseOutcome::partial(output)
        } else {
            PhaseOutcome::success(output)
        })
    }
}

/// The five-phase document pipeline: extraction feeds entity analysis, which
/// feeds relationship mapping and scoring in parallel, both feeding a report.
fn document_pipeline() -> DependencyGraph {
    let mut builder = DependencyGraphBuilder::new();
    builder
        .add_node(PhaseNode::new("extraction", "Document Extraction"))
        .unwrap();
    builder
        .add_node(PhaseNode::new("entity_analysis", "Entity Analysis"))
        .unwrap();
    builder
        .add_node(PhaseNode::new("relationship_mapping", "Relationship Mapping"))
        .unwrap();
    builder
        .add_node(PhaseNode::new("scoring", "Relevance Scoring").with_priority(5))
        .unwrap();
    builder
        .add_node(PhaseNode::new("report", "Report Generation"))
        .unwrap();
    builder
        .add_edge("extraction", "entity_analysis", EdgeType::Hard)
        .unwrap();
    builder
        .add_edge("entity_analysis", "relationship_mapping", EdgeType::Hard)
        .unwrap();
    builder
        .add_edge("entity_analysis", "scoring", EdgeType::Hard)
        .unwrap();
    builder
        .add_edge("relationship_mapping", "report", EdgeType::Hard)
        .unwrap();
    builder
        .add_edge("scoring", "report", EdgeType::Hard)
        .unwrap();
    builder.build().unwrap()
}

fn orchestrator_with(
    config: OrchestratorConfig,
    graph: DependencyGraph,
) -> (Orchestrator, Arc<Mutex<Vec<String>>>) {
    let log = Arc::new(Mutex::new(Vec::new()));
    let resources = Arc::new(AdaptiveResourceManager::default());
    let mut orchestrator = Orchestrator::new(config, graph, resources);
    let ids: Vec<String> = orchestrator
        .graph()
        .phase_ids()
        .map(str::to_string)
        .collect();
    for id in ids {
        orchestrator.register_handler(id, RecordingHandler::new(Arc::clone(&log)));
    }
    (orchestrator, log)
}

#[tokio::test]
async fn full_pipeline_completes_in_dependency_order() {
    let (mut orchestrator, log) =
        orchestrator_with(OrchestratorConfig::for_testing(), document_pipeline());

    let summary = orchestrator.run().await.unwrap();

    assert_eq!(summary.final_state, OrchestrationState::Completed);
    assert_eq!(summary.completed.len(), 5);
    assert!(summary.failed.is_empty());
    assert!(summary.blocked.is_empty());

    let order = log.lock().clone();
    let position = |id: &str| order.iter().position(|p| p == id).unwrap();
    assert!(position("extraction") < position("entity_analysis"));
    assert!(position("entity_analysis") < position("relationship_mapping"));
    assert!(position("entity_analysis") < position("scoring"));
    assert!(position("relationship_mapping") < position("report"));
    assert!(position("scoring") < position("report"));
}

#[tokio::test]
async fn sequential_mode_runs_one_phase_at_a_time() {
    let mut config = OrchestratorConfig::for_testing();
    config.mode = ExecutionMode::Sequential;
    let (mut orchestrator, log) = orchestrator_with(config, document_pipeline());

    // A run in sequential mode still completes the whole graph; the order
    // log then has exactly one entry per phase.
    let summary = orchestrator.run().await.unwrap();
    assert_eq!(summary.final_state, OrchestrationState::Completed);
    assert_eq!(log.lock().len(), 5);
}

#[tokio::test]
async fn parallelism_never_exceeds_the_configured_bound() {
    struct GaugeHandler {
        current: Arc<AtomicU32>,
        peak: Arc<AtomicU32>,
    }

    #[async_trait]
    impl PhaseHandler for GaugeHandler {
        async fn execute(&self, ctx: ExecutionContext) -> Result<PhaseOutcome, ExecutionError> {
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(30)).await;
            self.current.fetch_sub(1, Ordering::SeqCst);
            Ok(PhaseOutcome::success(serde_json::json!({ "phase": ctx.phase_id })))
        }
    }

    // Six independent phases, bound of two.
    let mut builder = DependencyGraphBuilder::new();
    for i in 0..6 {
        let id = format!("phase_{i}");
        builder.add_node(PhaseNode::new(&id, &id)).unwrap();
        builder.mark_root(&id).unwrap();
    }
    let graph = builder.build().unwrap();

    let mut config = OrchestratorConfig::for_testing();
    config.max_parallel_phases = 2;
    let resources = Arc::new(AdaptiveResourceManager::default());
    let mut orchestrator = Orchestrator::new(config, graph, resources);

    let current = Arc::new(AtomicU32::new(0));
    let peak = Arc::new(AtomicU32::new(0));
    for i in 0..6 {
        orchestrator.register_handler(
            format!("phase_{i}"),
            Arc::new(GaugeHandler {
                current: Arc::clone(&current),
                peak: Arc::clone(&peak),
            }),
        );
    }

    let summary = orchestrator.run().await.unwrap();
    assert_eq!(summary.final_state, OrchestrationState::Completed);
    assert!(peak.load(Ordering::SeqCst) <= 2, "bound was exceeded");
}

#[tokio::test]
async fn transient_failure_retries_and_still_completes() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let resources = Arc::new(AdaptiveResourceManager::default());
    let mut orchestrator = Orchestrator::new(
        OrchestratorConfig::for_testing(),
        document_pipeline(),
        resources,
    );

    let flaky = RecordingHandler::flaky(Arc::clone(&log), 1);
    orchestrator.register_handler("extraction", Arc::clone(&flaky) as Arc<dyn PhaseHandler>);
    for id in ["entity_analysis", "relationship_mapping", "scoring", "report"] {
        orchestrator.register_handler(id, RecordingHandler::new(Arc::clone(&log)));
    }

    let summary = orchestrator.run().await.unwrap();
    assert_eq!(summary.final_state, OrchestrationState::Completed);
    assert_eq!(summary.retries.get("extraction"), Some(&1));
    assert_eq!(flaky.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn exhausted_retries_block_downstream_but_spare_siblings() {
    // extraction -> entity_analysis, plus an independent audit phase.
    let mut builder = DependencyGraphBuilder::new();
    builder
        .add_node(PhaseNode::new("extraction", "Document Extraction"))
        .unwrap();
    builder
        .add_node(PhaseNode::new("entity_analysis", "Entity Analysis"))
        .unwrap();
    builder.add_node(PhaseNode::new("audit", "Audit Log")).unwrap();
    builder
        .add_edge("extraction", "entity_analysis", EdgeType::Hard)
        .unwrap();
    builder.mark_root("audit").unwrap();
    let graph = builder.build().unwrap();

    let log = Arc::new(Mutex::new(Vec::new()));
    let resources = Arc::new(AdaptiveResourceManager::default());
    let mut orchestrator =
        Orchestrator::new(OrchestratorConfig::for_testing(), graph, resources);
    orchestrator.register_handler("extraction", RecordingHandler::flaky(Arc::clone(&log), u32::MAX));
    orchestrator.register_handler("entity_analysis", RecordingHandler::new(Arc::clone(&log)));
    orchestrator.register_handler("audit", RecordingHandler::new(Arc::clone(&log)));

    let summary = orchestrator.run().await.unwrap();
    assert_eq!(summary.final_state, OrchestrationState::CompletedWithErrors);
    assert_eq!(summary.failed, vec!["extraction".to_string()]);
    assert_eq!(summary.blocked, vec!["entity_analysis".to_string()]);
    assert_eq!(summary.completed, vec!["audit".to_string()]);
    // Both retries were consumed before the failure settled.
    assert_eq!(
        summary.retries.get("extraction"),
        Some(&(OrchestratorConfig::for_testing().max_retries_per_phase + 1))
    );
}

#[tokio::test]
async fn soft_dependency_never_gates_readiness() {
    // enrichment is a soft input to the report; extraction is a hard one.
    // The report starts as soon as extraction finishes, even while the
    // slow enrichment is still running.
    let mut builder = DependencyGraphBuilder::new();
    builder
        .add_node(PhaseNode::new("extraction", "Document Extraction"))
        .unwrap();
    builder
        .add_node(PhaseNode::new("enrichment", "Optional Enrichment"))
        .unwrap();
    builder.add_node(PhaseNode::new("report", "Report")).unwrap();
    builder
        .add_edge("extraction", "report", EdgeType::Hard)
        .unwrap();
    builder
        .add_edge("enrichment", "report", EdgeType::Soft)
        .unwrap();
    let graph = builder.build().unwrap();

    let log = Arc::new(Mutex::new(Vec::new()));
    let resources = Arc::new(AdaptiveResourceManager::default());
    let mut orchestrator =
        Orchestrator::new(OrchestratorConfig::for_testing(), graph, resources);
    orchestrator.register_handler("extraction", RecordingHandler::new(Arc::clone(&log)));
    orchestrator.register_handler(
        "enrichment",
        RecordingHandler::slow(Arc::clone(&log), Duration::from_millis(150)),
    );
    orchestrator.register_handler("report", RecordingHandler::new(Arc::clone(&log)));

    let summary = orchestrator.run().await.unwrap();
    assert_eq!(summary.final_state, OrchestrationState::Completed);

    let order = log.lock().clone();
    // Report ran after extraction but before the slow soft dependency.
    let position = |id: &str| order.iter().position(|p| p == id).unwrap();
    assert!(position("extraction") < position("report"));
    assert!(position("report") < position("enrichment"));
}

#[tokio::test]
async fn partial_outcome_satisfies_downstream_dependencies() {
    let mut builder = DependencyGraphBuilder::new();
    builder
        .add_node(PhaseNode::new("extraction", "Document Extraction"))
        .unwrap();
    builder.add_node(PhaseNode::new("report", "Report")).unwrap();
    builder
        .add_edge("extraction", "report", EdgeType::Hard)
        .unwrap();
    let graph = builder.build().unwrap();

    let log = Arc::new(Mutex::new(Vec::new()));
    let resources = Arc::new(AdaptiveResourceManager::default());
    let mut orchestrator =
        Orchestrator::new(OrchestratorConfig::for_testing(), graph, resources);
    orchestrator.register_handler("extraction", RecordingHandler::partial(Arc::clone(&log)));
    orchestrator.register_handler("report", RecordingHandler::new(Arc::clone(&log)));

    let summary = orchestrator.run().await.unwrap();
    // A partial extraction still unblocks the report, and the run counts
    // both phases as completed work.
    assert_eq!(summary.final_state, OrchestrationState::Completed);
    assert_eq!(summary.completed.len(), 2);
}

#[tokio::test]
async fn timeout_consumes_a_retry_and_reports_timeout_status() {
    let mut config = OrchestratorConfig::for_testing();
    config.phase_timeout_seconds = 1;
    config.max_retries_per_phase = 0;

    let mut builder = DependencyGraphBuilder::new();
    builder.add_node(PhaseNode::new("extraction", "Extraction")).unwrap();
    builder.mark_root("extraction").unwrap();
    let graph = builder.build().unwrap();

    let log = Arc::new(Mutex::new(Vec::new()));
    let resources = Arc::new(AdaptiveResourceManager::default());
    let mut orchestrator = Orchestrator::new(config, graph, resources);
    orchestrator.register_handler(
        "extraction",
        RecordingHandler::slow(Arc::clone(&log), Duration::from_secs(5)),
    );

    let mut completions = orchestrator.bus().phase_complete.subscribe();
    let summary = orchestrator.run().await.unwrap();

    assert_eq!(summary.final_state, OrchestrationState::CompletedWithErrors);
    assert_eq!(summary.failed, vec!["extraction".to_string()]);
    let signal = completions.recv().await.unwrap();
    assert_eq!(signal.status, CompletionStatus::Timeout);
}

#[tokio::test]
async fn decision_signals_carry_the_dependency_state() {
    let (mut orchestrator, _log) =
        orchestrator_with(OrchestratorConfig::for_testing(), document_pipeline());
    let mut decisions = orchestrator.bus().decisions.subscribe();

    let summary = orchestrator.run().await.unwrap();
    assert_eq!(summary.final_state, OrchestrationState::Completed);

    let first = decisions.recv().await.unwrap();
    assert_eq!(first.phases_selected, vec!["extraction".to_string()]);
    assert_eq!(first.dependency_state.len(), 5);
    assert!(first
        .phases_waiting
        .contains(&"entity_analysis".to_string()));
}

#[tokio::test]
async fn decision_signals_stay_silent_when_disabled() {
    let mut config = OrchestratorConfig::for_testing();
    config.emit_decision_signals = false;

    let (mut orchestrator, _log) = orchestrator_with(config, document_pipeline());
    let mut decisions = orchestrator.bus().decisions.subscribe();

    let summary = orchestrator.run().await.unwrap();
    assert_eq!(summary.final_state, OrchestrationState::Completed);
    assert!(decisions.try_recv().is_err());
}

#[tokio::test]
async fn phase_start_reports_the_priority_scaled_timeout() {
    let config = OrchestratorConfig::for_testing();
    let executor = ResourceAwareExecutor::new(
        Arc::new(AdaptiveResourceManager::default()),
        config.phase_timeout(),
    );
    let base_window = executor.timeout_for_priority(0).as_secs();
    let scoring_window = executor.timeout_for_priority(5).as_secs();

    let (mut orchestrator, _log) = orchestrator_with(config, document_pipeline());
    let mut starts = orchestrator.bus().phase_start.subscribe();

    let summary = orchestrator.run().await.unwrap();
    assert_eq!(summary.final_state, OrchestrationState::Completed);

    let mut windows = HashMap::new();
    while let Ok(signal) = starts.try_recv() {
        windows.insert(signal.phase_id.clone(), signal.timeout_seconds);
    }
    assert_eq!(windows["extraction"], base_window);
    assert_eq!(windows["scoring"], scoring_window);
    assert!(scoring_window > base_window);
}

#[tokio::test]
async fn stop_request_drains_and_settles_in_stopped() {
    // Slow phases so the stop lands while work is in flight.
    let mut builder = DependencyGraphBuilder::new();
    builder.add_node(PhaseNode::new("extraction", "Extraction")).unwrap();
    builder.add_node(PhaseNode::new("report", "Report")).unwrap();
    builder
        .add_edge("extraction", "report", EdgeType::Hard)
        .unwrap();
    let graph = builder.build().unwrap();

    let log = Arc::new(Mutex::new(Vec::new()));
    let resources = Arc::new(AdaptiveResourceManager::default());
    let mut orchestrator =
        Orchestrator::new(OrchestratorConfig::for_testing(), graph, resources);
    orchestrator.register_handler(
        "extraction",
        RecordingHandler::slow(Arc::clone(&log), Duration::from_millis(200)),
    );
    orchestrator.register_handler("report", RecordingHandler::new(Arc::clone(&log)));

    let stop = orchestrator.stop_handle();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        stop.store(true, std::sync::atomic::Ordering::SeqCst);
    });

    let summary = orchestrator.run().await.unwrap();
    assert_eq!(summary.final_state, OrchestrationState::Stopped);
    // The in-flight extraction finished during the drain; the report never
    // started.
    assert!(summary.completed.contains(&"extraction".to_string()));
    assert!(!log.lock().contains(&"report".to_string()));
}

#[tokio::test]
async fn phase_parameters_reach_the_handler() {
    struct ParamEcho {
        seen: Arc<Mutex<HashMap<String, serde_json::Value>>>,
    }

    #[async_trait]
    impl PhaseHandler for ParamEcho {
        async fn execute(&self, ctx: ExecutionContext) -> Result<PhaseOutcome, ExecutionError> {
            *self.seen.lock() = ctx.params.clone();
            Ok(PhaseOutcome::success(serde_json::Value::Null))
        }
    }

    let mut params = HashMap::new();
    params.insert("language".to_string(), serde_json::json!("en"));
    params.insert("chunk_size".to_string(), serde_json::json!(512));

    let mut builder = DependencyGraphBuilder::new();
    builder
        .add_node(PhaseNode::new("extraction", "Extraction").with_config(params.clone()))
        .unwrap();
    builder.mark_root("extraction").unwrap();
    let graph = builder.build().unwrap();

    let resources = Arc::new(AdaptiveResourceManager::default());
    let mut orchestrator =
        Orchestrator::new(OrchestratorConfig::for_testing(), graph, resources);
    let seen = Arc::new(Mutex::new(HashMap::new()));
    orchestrator.register_handler(
        "extraction",
        Arc::new(ParamEcho {
            seen: Arc::clone(&seen),
        }),
    );

    let summary = orchestrator.run().await.unwrap();
    assert_eq!(summary.final_state, OrchestrationState::Completed);
    assert_eq!(*seen.lock(), params);
}
