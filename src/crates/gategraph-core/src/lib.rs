//! # gategraph-core - Human-in-the-Loop Workflow Execution
//!
//! **A directed-graph executor over a shared state record**, with durable
//! checkpointing and an interrupt/resume protocol for human approval gates.
//! Any node may pause the walk pending an external decision; the walk later
//! resumes exactly where it stopped, possibly days later and in another
//! process.
//!
//! ## Core Concepts
//!
//! - [`StateSchema`] / [`StateRecord`] - declared fields, each
//!   [`FieldKind::Overwrite`] or [`FieldKind::Append`], merged by [`merge`]
//! - [`Node`] - `execute(state, ctx)` returning a [`NodeOutcome`]
//!   (completed with an update, or suspended with a payload) or an error
//! - [`StateGraph`] - builder producing a validated [`CompiledGraph`]
//! - [`Executor`] - `run`, `resume` and `inspect` against a
//!   [`CheckpointSaver`](gategraph_checkpoint::CheckpointSaver)
//!
//! ## Quick Start
//!
//! ```rust
//! use gategraph_checkpoint::InMemoryCheckpointSaver;
//! use gategraph_core::{
//!     Executor, FieldKind, GraphError, NodeContext, NodeOutcome, RunOutcome, StateGraph,
//!     StateRecord, StateSchema, StateUpdate,
//! };
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let schema = StateSchema::from_fields([
//!     ("draft", FieldKind::Overwrite),
//!     ("approval", FieldKind::Overwrite),
//! ])?;
//!
//! let mut graph = StateGraph::new();
//! graph
//!     .add_fn_node("write", |_state: StateRecord, _ctx: NodeContext| async {
//!         Ok::<_, GraphError>(NodeOutcome::from(StateUpdate::new().set("draft", "v1")))
//!     })
//!     .add_fn_node("approve", |_state: StateRecord, ctx: NodeContext| async move {
//!         let answer = match ctx.suspend(json!({"type": "approval_required"})) {
//!             Ok(answer) => answer,
//!             Err(suspension) => return Ok::<_, GraphError>(suspension.into()),
//!         };
//!         Ok(NodeOutcome::from(StateUpdate::new().set("approval", answer["status"].clone())))
//!     })
//!     .set_entry("write")
//!     .add_edge("write", "approve");
//!
//! let executor = Executor::new(graph.compile(schema)?, Arc::new(InMemoryCheckpointSaver::new()));
//!
//! let paused = executor.run("thread-1", json!({})).await?;
//! assert!(paused.is_paused());
//!
//! match executor.resume("thread-1", json!({"status": "APPROVED"})).await? {
//!     RunOutcome::Completed { state, .. } => assert_eq!(state.get_str("approval"), Some("APPROVED")),
//!     RunOutcome::Paused { .. } => unreachable!(),
//! }
//! # Ok(())
//! # }
//! ```

pub mod builder;
pub mod error;
pub mod executor;
pub mod graph;
pub mod node;
pub mod state;

pub use builder::StateGraph;
pub use error::{GraphError, Result};
pub use executor::{Executor, RunOutcome, StateSnapshot, DEFAULT_MAX_STEPS};
pub use graph::{CompiledGraph, Condition, Edge, Graph, NodeId, END, START};
pub use node::{FnNode, Node, NodeContext, NodeOutcome, Suspension};
pub use state::{merge, FieldKind, FieldSpec, StateError, StateRecord, StateSchema, StateUpdate};
