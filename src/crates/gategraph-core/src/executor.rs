//! Graph executor with durable checkpoints and interrupt/resume
//!
//! The [`Executor`] walks a [`CompiledGraph`] for one thread id at a time and
//! writes a checkpoint after every step, so a walk can stop at a suspension
//! point and continue later, in another process, from the same node.
//!
//! # Thread lifecycle
//!
//! ```text
//!            run                 suspend               resume
//!  (none) ─────────► RUNNING ─────────────► SUSPENDED ─────────► RUNNING ─► ...
//!                       │                                          │
//!                       ├── last node done ──► COMPLETE ◄──────────┘
//!                       └── node raised ─────► FAILED
//! ```
//!
//! | Call | Allowed when | Otherwise |
//! |------|--------------|-----------|
//! | `run` | no checkpoint, or not `suspended` | `AlreadyPaused` |
//! | `resume` | checkpoint is `suspended` | `NotPaused` |
//!
//! # Checkpoint writes
//!
//! | When | Source | Status |
//! |------|--------|--------|
//! | Start of a `run` walk | `input` | `running` |
//! | After a node completes | `loop` (`resume` for the re-entered node) | `running` / `complete` |
//! | A node suspends | `loop` | `suspended` |
//! | A node fails | `failure` | `failed` |
//!
//! A failed node never advances the checkpoint: the failure checkpoint keeps
//! the last committed values and points at the failing node. When the failing
//! node is the one being resumed, nothing is written and the thread stays
//! `suspended`, so the caller can answer the interrupt again.

use crate::error::{GraphError, Result};
use crate::graph::CompiledGraph;
use crate::node::{NodeContext, NodeOutcome};
use crate::state::{merge, StateRecord};
use gategraph_checkpoint::{
    Checkpoint, CheckpointMetadata, CheckpointSaver, CheckpointSource, CheckpointStatus,
    PendingInterrupt,
};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::Instrument;

/// Default upper bound on nodes executed by a single walk
pub const DEFAULT_MAX_STEPS: u32 = 64;

/// Result of a `run` or `resume` call that did not fail
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunOutcome {
    /// The walk reached the end of the graph
    Completed {
        thread_id: String,
        state: StateRecord,
        version: u64,
    },
    /// A node suspended; call `resume` with a value it understands
    Paused {
        thread_id: String,
        node: String,
        interrupt_id: String,
        payload: Value,
        version: u64,
    },
}

impl RunOutcome {
    pub fn thread_id(&self) -> &str {
        match self {
            RunOutcome::Completed { thread_id, .. } | RunOutcome::Paused { thread_id, .. } => {
                thread_id
            }
        }
    }

    pub fn version(&self) -> u64 {
        match self {
            RunOutcome::Completed { version, .. } | RunOutcome::Paused { version, .. } => *version,
        }
    }

    pub fn is_paused(&self) -> bool {
        matches!(self, RunOutcome::Paused { .. })
    }
}

/// Current position of a thread as returned by [`Executor::inspect`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StateSnapshot {
    pub thread_id: String,
    pub status: CheckpointStatus,
    pub next_node: Option<String>,
    pub values: Map<String, Value>,
    pub pending_interrupt: Option<PendingInterrupt>,
    pub version: u64,
    pub error: Option<String>,
}

impl From<Checkpoint> for StateSnapshot {
    fn from(checkpoint: Checkpoint) -> Self {
        Self {
            thread_id: checkpoint.thread_id,
            status: checkpoint.status,
            next_node: checkpoint.next_node,
            values: checkpoint.values,
            pending_interrupt: checkpoint.pending_interrupt,
            version: checkpoint.version,
            error: checkpoint.error,
        }
    }
}

/// Marks a thread id busy for the lifetime of one `run`/`resume` call
struct ThreadGuard {
    active: Arc<Mutex<HashSet<String>>>,
    thread_id: String,
}

impl ThreadGuard {
    fn acquire(active: &Arc<Mutex<HashSet<String>>>, thread_id: &str) -> Result<Self> {
        if !active.lock().insert(thread_id.to_string()) {
            return Err(GraphError::ConcurrentAccess {
                thread_id: thread_id.to_string(),
            });
        }
        Ok(Self {
            active: active.clone(),
            thread_id: thread_id.to_string(),
        })
    }
}

impl Drop for ThreadGuard {
    fn drop(&mut self) {
        self.active.lock().remove(&self.thread_id);
    }
}

/// Runs a compiled graph against a checkpoint saver
///
/// Cloning shares the graph, the saver and the set of busy thread ids.
#[derive(Clone)]
pub struct Executor {
    graph: CompiledGraph,
    saver: Arc<dyn CheckpointSaver>,
    max_steps: u32,
    active: Arc<Mutex<HashSet<String>>>,
}

impl Executor {
    pub fn new(graph: CompiledGraph, saver: Arc<dyn CheckpointSaver>) -> Self {
        Self {
            graph,
            saver,
            max_steps: DEFAULT_MAX_STEPS,
            active: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Limit the number of nodes a single walk may execute
    pub fn with_max_steps(mut self, max_steps: u32) -> Self {
        self.max_steps = max_steps.max(1);
        self
    }

    pub fn graph(&self) -> &CompiledGraph {
        &self.graph
    }

    pub fn saver(&self) -> &Arc<dyn CheckpointSaver> {
        &self.saver
    }

    /// Start a walk for `thread_id` from the entry node
    ///
    /// `input` initialises the state record. When the thread already ran to
    /// completion (or failed), overwrite fields are reset from `input` while
    /// append fields keep their history with `input` appended.
    #[tracing::instrument(skip_all, fields(thread_id = %thread_id))]
    pub async fn run(&self, thread_id: &str, input: Value) -> Result<RunOutcome> {
        if thread_id.is_empty() {
            return Err(GraphError::Execution("thread_id must not be empty".to_string()));
        }
        let _guard = ThreadGuard::acquire(&self.active, thread_id)?;

        let existing = self.saver.get(thread_id).await?;
        if let Some(previous) = &existing {
            if previous.is_suspended() {
                return Err(GraphError::AlreadyPaused {
                    thread_id: thread_id.to_string(),
                });
            }
        }

        let schema = self.graph.schema().clone();
        let mut state = StateRecord::from_input(schema.clone(), input)?;
        let entry = self.graph.entry().to_string();

        let checkpoint = match existing {
            Some(previous) => {
                let prior = StateRecord::from_values(schema, previous.values.clone())?;
                state.carry_history(&prior)?;
                tracing::debug!(previous = %previous.status, "restarting finished thread");

                let mut next = previous.successor();
                next.status = CheckpointStatus::Running;
                next.next_node = Some(entry);
                next.values = state.values().clone();
                next.pending_interrupt = None;
                next.error = None;
                next
            }
            None => Checkpoint::new(thread_id, entry, state.values().clone()),
        };

        let metadata = CheckpointMetadata::new()
            .with_source(CheckpointSource::Input)
            .with_step(0);
        self.saver.put(thread_id, checkpoint.clone(), metadata).await?;

        tracing::info!("Starting graph execution");
        self.walk(checkpoint, state, None).await
    }

    /// Continue a suspended thread, injecting `value` into the suspended node
    #[tracing::instrument(skip_all, fields(thread_id = %thread_id))]
    pub async fn resume(&self, thread_id: &str, value: Value) -> Result<RunOutcome> {
        let _guard = ThreadGuard::acquire(&self.active, thread_id)?;

        let checkpoint = match self.saver.get(thread_id).await? {
            Some(checkpoint) if checkpoint.is_suspended() => checkpoint,
            Some(checkpoint) => {
                return Err(GraphError::NotPaused {
                    thread_id: thread_id.to_string(),
                    status: checkpoint.status.to_string(),
                })
            }
            None => {
                return Err(GraphError::NotPaused {
                    thread_id: thread_id.to_string(),
                    status: "absent".to_string(),
                })
            }
        };

        let Some(interrupt) = &checkpoint.pending_interrupt else {
            return Err(GraphError::Execution(format!(
                "suspended checkpoint v{} of thread '{}' has no pending interrupt",
                checkpoint.version, thread_id
            )));
        };
        if checkpoint.next_node.as_deref() != Some(interrupt.node.as_str()) {
            return Err(GraphError::Execution(format!(
                "suspended checkpoint points at {:?} but the interrupt belongs to '{}'",
                checkpoint.next_node, interrupt.node
            )));
        }

        let state = StateRecord::from_values(self.graph.schema().clone(), checkpoint.values.clone())?;
        tracing::info!(node = %interrupt.node, interrupt_id = %interrupt.id, "Resuming graph execution");
        self.walk(checkpoint, state, Some(value)).await
    }

    /// Latest snapshot of a thread, `None` if it never ran
    pub async fn inspect(&self, thread_id: &str) -> Result<Option<StateSnapshot>> {
        Ok(self.saver.get(thread_id).await?.map(StateSnapshot::from))
    }

    /// Execute nodes starting at `checkpoint.next_node`
    ///
    /// `checkpoint` is always the latest stored version.
    async fn walk(
        &self,
        mut checkpoint: Checkpoint,
        mut state: StateRecord,
        mut resume_value: Option<Value>,
    ) -> Result<RunOutcome> {
        let thread_id = checkpoint.thread_id.clone();
        let mut steps: u32 = 0;

        loop {
            let Some(node_name) = checkpoint.next_node.clone() else {
                // Only reachable for a checkpoint already marked complete
                return Ok(RunOutcome::Completed {
                    thread_id,
                    state,
                    version: checkpoint.version,
                });
            };

            let resuming = resume_value.is_some();
            if steps >= self.max_steps {
                let err = GraphError::Execution(format!(
                    "recursion limit of {} steps reached at node '{}'",
                    self.max_steps, node_name
                ));
                return Err(self.fail(&checkpoint, &node_name, resuming, err, steps).await);
            }

            let Some(node) = self.graph.node(&node_name) else {
                let err = GraphError::Execution(format!("node '{}' is not in the graph", node_name));
                return Err(self.fail(&checkpoint, &node_name, resuming, err, steps).await);
            };

            let mut ctx = NodeContext::new(thread_id.as_str(), node_name.as_str(), steps);
            if let Some(value) = resume_value.take() {
                ctx = ctx.with_resume_value(value);
            }

            let span = tracing::info_span!("node", node = %node_name, step = steps, resuming);
            let result = node.execute(state.clone(), ctx.clone()).instrument(span).await;
            steps += 1;

            let result = match result {
                Ok(_) if ctx.suspend_calls() > 1 => Err(GraphError::node_execution(
                    &node_name,
                    "suspend was called more than once in one attempt",
                )),
                Ok(_) if resuming && ctx.suspend_calls() == 0 => Err(GraphError::node_execution(
                    &node_name,
                    "resumed node finished without consuming the resume value",
                )),
                Ok(outcome) => Ok(outcome),
                Err(err @ (GraphError::NodeExecutionFailed { .. } | GraphError::Configuration(_))) => {
                    Err(err)
                }
                Err(err) => Err(GraphError::node_execution(&node_name, err)),
            };

            let update = match result {
                Err(err) => return Err(self.fail(&checkpoint, &node_name, resuming, err, steps).await),
                Ok(NodeOutcome::Suspended(payload)) => {
                    let interrupt = PendingInterrupt::new(node_name.as_str(), payload);
                    let mut next = checkpoint.successor();
                    next.status = CheckpointStatus::Suspended;
                    next.next_node = Some(node_name.clone());
                    next.values = state.values().clone();
                    next.pending_interrupt = Some(interrupt.clone());
                    next.error = None;

                    let metadata = CheckpointMetadata::new()
                        .with_source(CheckpointSource::Loop)
                        .with_step(steps)
                        .with_node(node_name.as_str());
                    let version = self.saver.put(&thread_id, next, metadata).await?;

                    tracing::info!(node = %node_name, version, "Graph execution paused");
                    return Ok(RunOutcome::Paused {
                        thread_id,
                        node: node_name,
                        interrupt_id: interrupt.id,
                        payload: interrupt.payload,
                        version,
                    });
                }
                Ok(NodeOutcome::Completed(update)) => update,
            };

            let routed = merge(&state, update)
                .map_err(|e| GraphError::node_execution(&node_name, e))
                .and_then(|merged| {
                    let next_node = self.graph.route(&node_name, &merged)?;
                    Ok((merged, next_node))
                });
            let (merged, next_node) = match routed {
                Ok(routed) => routed,
                Err(err) => return Err(self.fail(&checkpoint, &node_name, resuming, err, steps).await),
            };
            state = merged;

            let mut next = checkpoint.successor();
            next.status = if next_node.is_some() {
                CheckpointStatus::Running
            } else {
                CheckpointStatus::Complete
            };
            next.next_node = next_node;
            next.values = state.values().clone();
            next.pending_interrupt = None;
            next.error = None;

            let source = if resuming {
                CheckpointSource::Resume
            } else {
                CheckpointSource::Loop
            };
            let metadata = CheckpointMetadata::new()
                .with_source(source)
                .with_step(steps)
                .with_node(node_name.as_str());
            self.saver.put(&thread_id, next.clone(), metadata).await?;
            tracing::debug!(node = %node_name, version = next.version, "committed node");

            if next.status == CheckpointStatus::Complete {
                tracing::info!(version = next.version, steps, "Graph execution completed");
                return Ok(RunOutcome::Completed {
                    thread_id,
                    state,
                    version: next.version,
                });
            }
            checkpoint = next;
        }
    }

    /// Record a failed node and hand back the error to report
    async fn fail(
        &self,
        checkpoint: &Checkpoint,
        node: &str,
        resuming: bool,
        err: GraphError,
        steps: u32,
    ) -> GraphError {
        if resuming && checkpoint.is_suspended() {
            tracing::warn!(node, error = %err, "resumed node failed; thread stays suspended");
            return err;
        }

        tracing::warn!(node, error = %err, "Graph execution failed");
        let mut failed = checkpoint.successor();
        failed.status = CheckpointStatus::Failed;
        failed.pending_interrupt = None;
        failed.error = Some(err.to_string());

        let metadata = CheckpointMetadata::new()
            .with_source(CheckpointSource::Failure)
            .with_step(steps)
            .with_node(node);
        if let Err(write_err) = self.saver.put(&checkpoint.thread_id, failed, metadata).await {
            tracing::error!(error = %write_err, "failed to record failure checkpoint");
        }
        err
    }
}

impl std::fmt::Debug for Executor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Executor")
            .field("graph", &self.graph)
            .field("max_steps", &self.max_steps)
            .finish()
    }
}
