//! Run / suspend / resume behaviour of the executor

use async_trait::async_trait;
use gategraph_checkpoint::{CheckpointSaver, CheckpointSource, CheckpointStatus, InMemoryCheckpointSaver};
use gategraph_core::{
    CompiledGraph, Executor, FieldKind, GraphError, Node, NodeContext, NodeOutcome, Result,
    RunOutcome, StateGraph, StateRecord, StateSchema, StateUpdate,
};
use futures::StreamExt;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

fn schema() -> StateSchema {
    StateSchema::from_fields([
        ("clause", FieldKind::Overwrite),
        ("log", FieldKind::Append),
        ("approval", FieldKind::Overwrite),
        ("second_approval", FieldKind::Overwrite),
    ])
    .unwrap()
}

/// Appends its own name to the log
struct Step;

#[async_trait]
impl Node for Step {
    async fn execute(&self, _state: StateRecord, ctx: NodeContext) -> Result<NodeOutcome> {
        Ok(StateUpdate::new().append_one("log", ctx.node()).into())
    }
}

/// Suspends for approval and records the decision in `field`
struct Gate {
    field: &'static str,
    lookups: Arc<AtomicUsize>,
}

impl Gate {
    fn new(field: &'static str) -> Self {
        Self {
            field,
            lookups: Arc::new(AtomicUsize::new(0)),
        }
    }
}

#[async_trait]
impl Node for Gate {
    async fn execute(&self, state: StateRecord, ctx: NodeContext) -> Result<NodeOutcome> {
        // read-only lookup before the suspend call
        self.lookups.fetch_add(1, Ordering::SeqCst);
        let context = state.get("log").cloned().unwrap_or_else(|| json!([]));

        let answer = match ctx.suspend(json!({"type": "approval_required", "context": context})) {
            Ok(answer) => answer,
            Err(suspension) => return Ok(suspension.into()),
        };

        let status = answer
            .get("status")
            .and_then(Value::as_str)
            .ok_or_else(|| GraphError::node_execution(ctx.node(), "resume value has no status"))?;

        Ok(StateUpdate::new()
            .set(self.field, status)
            .append_one("log", format!("{}:{}", ctx.node(), status))
            .into())
    }
}

/// Fails every time it runs
struct Broken;

#[async_trait]
impl Node for Broken {
    async fn execute(&self, _state: StateRecord, _ctx: NodeContext) -> Result<NodeOutcome> {
        Err(GraphError::Generation("provider unavailable".to_string()))
    }
}

fn single_gate_graph(gate: Gate) -> CompiledGraph {
    let mut graph = StateGraph::new();
    graph
        .add_node("prepare", Step)
        .add_node("gate", gate)
        .add_node("finish", Step)
        .set_entry("prepare")
        .add_edge("prepare", "gate")
        .add_edge("gate", "finish");
    graph.compile(schema()).unwrap()
}

fn executor(graph: CompiledGraph) -> (Executor, Arc<InMemoryCheckpointSaver>) {
    let saver = Arc::new(InMemoryCheckpointSaver::new());
    (Executor::new(graph, saver.clone()), saver)
}

fn completed_state(outcome: RunOutcome) -> StateRecord {
    match outcome {
        RunOutcome::Completed { state, .. } => state,
        RunOutcome::Paused { node, .. } => panic!("unexpected pause at {node}"),
    }
}

#[tokio::test]
async fn test_suspend_resume_round_trip() {
    let (executor, saver) = executor(single_gate_graph(Gate::new("approval")));

    let paused = executor.run("t1", json!({"clause": "Net 90"})).await.unwrap();
    match &paused {
        RunOutcome::Paused { node, payload, .. } => {
            assert_eq!(node, "gate");
            assert_eq!(payload["type"], "approval_required");
            assert_eq!(payload["context"], json!(["prepare"]));
        }
        other => panic!("expected pause, got {other:?}"),
    }

    let snapshot = executor.inspect("t1").await.unwrap().unwrap();
    assert_eq!(snapshot.status, CheckpointStatus::Suspended);
    assert_eq!(snapshot.next_node.as_deref(), Some("gate"));
    assert!(snapshot.pending_interrupt.is_some());

    let state = completed_state(executor.resume("t1", json!({"status": "APPROVED"})).await.unwrap());
    assert_eq!(state.get_str("approval"), Some("APPROVED"));
    assert_eq!(state.get("log"), Some(&json!(["prepare", "gate:APPROVED", "finish"])));
    assert_eq!(state.get_str("clause"), Some("Net 90"));

    let latest = saver.get("t1").await.unwrap().unwrap();
    assert_eq!(latest.status, CheckpointStatus::Complete);
    assert!(latest.next_node.is_none());
    assert!(latest.pending_interrupt.is_none());
}

#[tokio::test]
async fn test_checkpoint_versions_and_sources() {
    let (executor, saver) = executor(single_gate_graph(Gate::new("approval")));
    executor.run("t1", json!({})).await.unwrap();
    executor.resume("t1", json!({"status": "REJECTED"})).await.unwrap();

    let history: Vec<_> = saver
        .list("t1", None)
        .await
        .unwrap()
        .map(|r| r.unwrap())
        .collect()
        .await;
    let versions: Vec<u64> = history.iter().rev().map(|t| t.checkpoint.version).collect();
    assert_eq!(versions, vec![1, 2, 3, 4, 5]);

    let sources: Vec<_> = history.iter().rev().map(|t| t.metadata.source).collect();
    assert_eq!(
        sources,
        vec![
            Some(CheckpointSource::Input),
            Some(CheckpointSource::Loop),   // prepare
            Some(CheckpointSource::Loop),   // gate suspended
            Some(CheckpointSource::Resume), // gate resumed
            Some(CheckpointSource::Loop),   // finish
        ]
    );
}

#[tokio::test]
async fn test_resume_after_complete_is_not_paused() {
    let (executor, _) = executor(single_gate_graph(Gate::new("approval")));
    executor.run("t1", json!({})).await.unwrap();
    executor.resume("t1", json!({"status": "APPROVED"})).await.unwrap();

    let err = executor.resume("t1", json!({"status": "APPROVED"})).await.unwrap_err();
    assert!(matches!(err, GraphError::NotPaused { ref status, .. } if status == "complete"));
    assert!(err.is_protocol_misuse());
}

#[tokio::test]
async fn test_resume_unknown_thread_is_not_paused() {
    let (executor, _) = executor(single_gate_graph(Gate::new("approval")));
    let err = executor.resume("ghost", json!({})).await.unwrap_err();
    assert!(matches!(err, GraphError::NotPaused { ref status, .. } if status == "absent"));
}

#[tokio::test]
async fn test_run_while_paused_is_rejected_without_mutation() {
    let (executor, saver) = executor(single_gate_graph(Gate::new("approval")));
    executor.run("t1", json!({"clause": "first"})).await.unwrap();
    let before = saver.get("t1").await.unwrap().unwrap();

    let err = executor.run("t1", json!({"clause": "second"})).await.unwrap_err();
    assert!(matches!(err, GraphError::AlreadyPaused { .. }));

    let after = saver.get("t1").await.unwrap().unwrap();
    assert_eq!(before, after);
}

#[tokio::test]
async fn test_multiple_sequential_pauses() {
    let mut graph = StateGraph::new();
    graph
        .add_node("first_gate", Gate::new("approval"))
        .add_node("middle", Step)
        .add_node("second_gate", Gate::new("second_approval"))
        .set_entry("first_gate")
        .add_edge("first_gate", "middle")
        .add_edge("middle", "second_gate");
    let (executor, _) = executor(graph.compile(schema()).unwrap());

    assert!(executor.run("t1", json!({})).await.unwrap().is_paused());

    match executor.resume("t1", json!({"status": "APPROVED"})).await.unwrap() {
        RunOutcome::Paused { node, payload, .. } => {
            assert_eq!(node, "second_gate");
            assert_eq!(payload["context"], json!(["first_gate:APPROVED", "middle"]));
        }
        other => panic!("expected second pause, got {other:?}"),
    }

    let state = completed_state(executor.resume("t1", json!({"status": "REJECTED"})).await.unwrap());
    assert_eq!(state.get_str("approval"), Some("APPROVED"));
    assert_eq!(state.get_str("second_approval"), Some("REJECTED"));
}

#[tokio::test]
async fn test_exclusive_branch_configuration_error() {
    let mut graph = StateGraph::new();
    graph
        .add_node("classify", Step)
        .add_node("left", Step)
        .add_node("right", Step)
        .set_entry("classify")
        .add_conditional_edge("classify", "is_left", "left", |s: &StateRecord| {
            s.get_str("clause") == Some("left")
        })
        .add_conditional_edge("classify", "is_right", "right", |s: &StateRecord| {
            s.get_str("clause") == Some("right")
        });
    let (executor, saver) = executor(graph.compile(schema()).unwrap());

    let state = completed_state(executor.run("ok", json!({"clause": "left"})).await.unwrap());
    assert_eq!(state.get("log"), Some(&json!(["classify", "left"])));

    let err = executor.run("bad", json!({"clause": "neither"})).await.unwrap_err();
    assert!(matches!(err, GraphError::Configuration(_)));
    assert!(!err.is_retryable());

    // The routing failure does not commit the node's update
    let failed = saver.get("bad").await.unwrap().unwrap();
    assert_eq!(failed.status, CheckpointStatus::Failed);
    assert_eq!(failed.next_node.as_deref(), Some("classify"));
    assert!(failed.values.get("log").is_none());
}

#[tokio::test]
async fn test_failure_preserves_last_committed_checkpoint() {
    let mut graph = StateGraph::new();
    graph
        .add_node("prepare", Step)
        .add_node("broken", Broken)
        .set_entry("prepare")
        .add_edge("prepare", "broken");
    let (executor, saver) = executor(graph.compile(schema()).unwrap());

    let err = executor.run("t1", json!({"clause": "x"})).await.unwrap_err();
    match &err {
        GraphError::NodeExecutionFailed { node, cause } => {
            assert_eq!(node, "broken");
            assert!(cause.contains("provider unavailable"));
        }
        other => panic!("unexpected error {other:?}"),
    }

    let failed = saver.get("t1").await.unwrap().unwrap();
    assert_eq!(failed.status, CheckpointStatus::Failed);
    assert_eq!(failed.next_node.as_deref(), Some("broken"));
    assert_eq!(failed.values["log"], json!(["prepare"]));
    assert!(failed.error.unwrap().contains("provider unavailable"));

    // A failed thread can be run again from scratch
    let err = executor.run("t1", json!({"clause": "x"})).await.unwrap_err();
    assert!(matches!(err, GraphError::NodeExecutionFailed { .. }));
}

#[tokio::test]
async fn test_bad_resume_value_keeps_thread_suspended() {
    let (executor, saver) = executor(single_gate_graph(Gate::new("approval")));
    executor.run("t1", json!({})).await.unwrap();
    let suspended = saver.get("t1").await.unwrap().unwrap();

    let err = executor.resume("t1", json!({"nonsense": true})).await.unwrap_err();
    assert!(matches!(err, GraphError::NodeExecutionFailed { ref node, .. } if node == "gate"));
    assert_eq!(saver.get("t1").await.unwrap().unwrap(), suspended);

    let state = completed_state(executor.resume("t1", json!({"status": "APPROVED"})).await.unwrap());
    assert_eq!(state.get_str("approval"), Some("APPROVED"));
}

#[tokio::test]
async fn test_second_suspend_in_one_attempt_fails_node() {
    let mut graph = StateGraph::new();
    graph
        .add_fn_node("greedy", |_state: StateRecord, ctx: NodeContext| async move {
            let first = match ctx.suspend(json!("first")) {
                Ok(value) => value,
                Err(suspension) => return Ok::<_, GraphError>(NodeOutcome::from(suspension)),
            };
            let outcome = match ctx.suspend(json!("second")) {
                Ok(_) => NodeOutcome::from(StateUpdate::new().set("approval", first)),
                Err(suspension) => NodeOutcome::from(suspension),
            };
            Ok(outcome)
        })
        .set_entry("greedy");
    let (executor, saver) = executor(graph.compile(schema()).unwrap());

    assert!(executor.run("t1", json!({})).await.unwrap().is_paused());
    let err = executor.resume("t1", json!("yes")).await.unwrap_err();
    assert!(matches!(err, GraphError::NodeExecutionFailed { ref cause, .. } if cause.contains("more than once")));
    assert!(saver.get("t1").await.unwrap().unwrap().is_suspended());
}

#[tokio::test]
async fn test_resume_value_must_be_consumed() {
    let ask = Arc::new(std::sync::atomic::AtomicBool::new(true));
    let node_ask = ask.clone();
    let mut graph = StateGraph::new();
    graph
        .add_fn_node("fickle", move |_state: StateRecord, ctx: NodeContext| {
            let ask = node_ask.load(Ordering::SeqCst);
            async move {
                if !ask {
                    return Ok::<_, GraphError>(NodeOutcome::from(
                        StateUpdate::new().set("approval", "AUTO"),
                    ));
                }
                let outcome = match ctx.suspend(json!("approve?")) {
                    Ok(answer) => NodeOutcome::from(StateUpdate::new().set("approval", answer)),
                    Err(suspension) => NodeOutcome::from(suspension),
                };
                Ok(outcome)
            }
        })
        .set_entry("fickle");
    let (executor, saver) = executor(graph.compile(schema()).unwrap());

    assert!(executor.run("t1", json!({})).await.unwrap().is_paused());
    ask.store(false, Ordering::SeqCst);

    let err = executor.resume("t1", json!("REJECTED")).await.unwrap_err();
    assert!(matches!(err, GraphError::NodeExecutionFailed { ref cause, .. } if cause.contains("resume value")));
    assert!(saver.get("t1").await.unwrap().unwrap().is_suspended());

    ask.store(true, Ordering::SeqCst);
    let state = completed_state(executor.resume("t1", json!("REJECTED")).await.unwrap());
    assert_eq!(state.get_str("approval"), Some("REJECTED"));
}

#[tokio::test]
async fn test_reentry_is_idempotent() {
    let gate = Gate::new("approval");
    let lookups = gate.lookups.clone();
    let (executor, _) = executor(single_gate_graph(gate));

    let mut finals = Vec::new();
    for thread_id in ["a", "b"] {
        executor.run(thread_id, json!({"clause": "Net 90"})).await.unwrap();
        let state = completed_state(
            executor
                .resume(thread_id, json!({"status": "APPROVED"}))
                .await
                .unwrap(),
        );
        finals.push(state);
    }

    // Entered once to suspend and once to resume, per thread
    assert_eq!(lookups.load(Ordering::SeqCst), 4);
    assert_eq!(finals[0], finals[1]);
}

#[tokio::test]
async fn test_append_history_never_truncated_across_runs() {
    let mut graph = StateGraph::new();
    graph.add_node("only", Step).set_entry("only");
    let (executor, _) = executor(graph.compile(schema()).unwrap());

    completed_state(executor.run("t1", json!({"clause": "a", "log": ["input-1"]})).await.unwrap());
    let state = completed_state(executor.run("t1", json!({"clause": "b", "log": ["input-2"]})).await.unwrap());

    assert_eq!(state.get_str("clause"), Some("b"));
    assert_eq!(state.get("log"), Some(&json!(["input-1", "only", "input-2", "only"])));
}

/// Blocks until released so a walk stays in flight
struct Blocking {
    entered: Arc<Notify>,
    release: Arc<Notify>,
}

#[async_trait]
impl Node for Blocking {
    async fn execute(&self, _state: StateRecord, _ctx: NodeContext) -> Result<NodeOutcome> {
        self.entered.notify_one();
        self.release.notified().await;
        Ok(NodeOutcome::unchanged())
    }
}

#[tokio::test]
async fn test_concurrent_access_rejected() {
    let entered = Arc::new(Notify::new());
    let release = Arc::new(Notify::new());
    let mut graph = StateGraph::new();
    graph
        .add_node(
            "slow",
            Blocking {
                entered: entered.clone(),
                release: release.clone(),
            },
        )
        .set_entry("slow");
    let (executor, _) = executor(graph.compile(schema()).unwrap());

    let background = executor.clone();
    let handle = tokio::spawn(async move { background.run("busy", json!({})).await });
    entered.notified().await;

    let err = executor.run("busy", json!({})).await.unwrap_err();
    assert!(matches!(err, GraphError::ConcurrentAccess { .. }));
    let err = executor.resume("busy", json!({})).await.unwrap_err();
    assert!(matches!(err, GraphError::ConcurrentAccess { .. }));

    release.notify_one();
    assert!(!handle.await.unwrap().unwrap().is_paused());

    // Guard is released once the walk finishes
    release.notify_one();
    assert!(executor.run("busy", json!({})).await.is_ok());
}

#[tokio::test]
async fn test_distinct_threads_run_concurrently() {
    let (executor, saver) = executor(single_gate_graph(Gate::new("approval")));

    let mut handles = Vec::new();
    for i in 0..10 {
        let executor = executor.clone();
        handles.push(tokio::spawn(async move {
            let thread_id = format!("thread-{i}");
            executor.run(&thread_id, json!({"clause": i})).await.unwrap();
            executor
                .resume(&thread_id, json!({"status": "APPROVED"}))
                .await
                .unwrap()
        }));
    }

    for handle in handles {
        assert!(!handle.await.unwrap().is_paused());
    }
    assert_eq!(saver.thread_count().await, 10);
    let state = saver.get("thread-3").await.unwrap().unwrap();
    assert_eq!(state.values["clause"], json!(3));
}
