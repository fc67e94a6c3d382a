//! Nodes and the suspend primitive
//!
//! A node receives a snapshot of the state record and a [`NodeContext`] and
//! returns one of three results:
//!
//! | Result | Meaning |
//! |--------|---------|
//! | `Ok(NodeOutcome::Completed(update))` | merge `update`, follow edges |
//! | `Ok(NodeOutcome::Suspended(payload))` | stop the walk, surface `payload` |
//! | `Err(GraphError)` | abort the walk, keep the last committed checkpoint |
//!
//! # Suspending
//!
//! [`NodeContext::suspend`] is how a node asks for a human decision. On the
//! first attempt it returns `Err(Suspension)`, which the node converts into
//! its outcome with `?`-like early return. When the thread is resumed the same
//! node runs again from the top and the same `suspend` call now returns the
//! caller's resume value.
//!
//! ```rust
//! use gategraph_core::error::GraphError;
//! use gategraph_core::node::{FnNode, NodeContext, NodeOutcome};
//! use gategraph_core::state::{StateRecord, StateUpdate};
//! use serde_json::json;
//!
//! let gate = FnNode::new(|_state: StateRecord, ctx: NodeContext| async move {
//!     let answer = match ctx.suspend(json!({"type": "approval_required"})) {
//!         Ok(value) => value,
//!         Err(suspension) => return Ok::<_, GraphError>(suspension.into()),
//!     };
//!     Ok(NodeOutcome::Completed(
//!         StateUpdate::new().set("approval", answer["status"].clone()),
//!     ))
//! });
//! # let _ = gate;
//! ```
//!
//! Work performed before `suspend` runs again on re-entry, so it must be a
//! read-only lookup or naturally idempotent. Side effects belong after the
//! call returns.

use crate::error::Result;
use crate::state::{StateRecord, StateUpdate};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;

/// Result of a node that did not fail
#[derive(Debug, Clone, PartialEq)]
pub enum NodeOutcome {
    /// Merge the update and continue along the graph's edges
    Completed(StateUpdate),
    /// Halt the walk and hand the payload to the caller
    Suspended(Value),
}

impl NodeOutcome {
    /// Completed without changing any field
    pub fn unchanged() -> Self {
        NodeOutcome::Completed(StateUpdate::new())
    }

    pub fn is_suspended(&self) -> bool {
        matches!(self, NodeOutcome::Suspended(_))
    }
}

impl From<StateUpdate> for NodeOutcome {
    fn from(update: StateUpdate) -> Self {
        NodeOutcome::Completed(update)
    }
}

impl From<Suspension> for NodeOutcome {
    fn from(suspension: Suspension) -> Self {
        NodeOutcome::Suspended(suspension.payload)
    }
}

/// A pending request to halt the walk, returned by [`NodeContext::suspend`]
#[derive(Debug, Clone, PartialEq)]
#[must_use = "a suspension must be returned as the node outcome"]
pub struct Suspension {
    payload: Value,
}

impl Suspension {
    pub fn payload(&self) -> &Value {
        &self.payload
    }

    pub fn into_payload(self) -> Value {
        self.payload
    }
}

#[derive(Debug, Default)]
struct SuspendSlot {
    resume_value: Option<Value>,
    suspend_calls: u32,
}

/// Per-execution context handed to a node
///
/// Cloning shares the suspend bookkeeping, so a clone moved into a closure
/// still counts toward the single suspend allowed per attempt.
#[derive(Debug, Clone)]
pub struct NodeContext {
    thread_id: Arc<str>,
    node: Arc<str>,
    step: u32,
    slot: Arc<Mutex<SuspendSlot>>,
}

impl NodeContext {
    /// Context for a fresh attempt
    pub fn new(thread_id: impl Into<Arc<str>>, node: impl Into<Arc<str>>, step: u32) -> Self {
        Self {
            thread_id: thread_id.into(),
            node: node.into(),
            step,
            slot: Arc::new(Mutex::new(SuspendSlot::default())),
        }
    }

    /// Inject the value that the next `suspend` call returns
    pub fn with_resume_value(self, value: Value) -> Self {
        self.slot.lock().resume_value = Some(value);
        self
    }

    pub fn thread_id(&self) -> &str {
        &self.thread_id
    }

    pub fn node(&self) -> &str {
        &self.node
    }

    /// Number of nodes already executed in this walk
    pub fn step(&self) -> u32 {
        self.step
    }

    /// Whether this attempt re-enters a suspended node
    pub fn is_resuming(&self) -> bool {
        self.slot.lock().resume_value.is_some()
    }

    /// Ask the caller for a decision
    ///
    /// Returns the resume value when the node is being re-entered, otherwise
    /// a [`Suspension`] carrying `payload` that the node must return. Only
    /// one call is allowed per attempt; the executor fails the node when it
    /// sees a second one.
    pub fn suspend(&self, payload: Value) -> std::result::Result<Value, Suspension> {
        let mut slot = self.slot.lock();
        slot.suspend_calls += 1;
        if slot.suspend_calls == 1 {
            if let Some(value) = slot.resume_value.take() {
                return Ok(value);
            }
        }
        Err(Suspension { payload })
    }

    pub(crate) fn suspend_calls(&self) -> u32 {
        self.slot.lock().suspend_calls
    }
}

/// A unit of computation in a graph
#[async_trait]
pub trait Node: Send + Sync {
    /// Run the node against a snapshot of the state
    async fn execute(&self, state: StateRecord, ctx: NodeContext) -> Result<NodeOutcome>;
}

/// Adapter turning an async closure into a [`Node`]
pub struct FnNode<F> {
    f: F,
}

impl<F> FnNode<F> {
    pub fn new<Fut>(f: F) -> Self
    where
        F: Fn(StateRecord, NodeContext) -> Fut,
        Fut: Future<Output = Result<NodeOutcome>>,
    {
        Self { f }
    }
}

#[async_trait]
impl<F, Fut> Node for FnNode<F>
where
    F: Fn(StateRecord, NodeContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<NodeOutcome>> + Send + 'static,
{
    async fn execute(&self, state: StateRecord, ctx: NodeContext) -> Result<NodeOutcome> {
        (self.f)(state, ctx).await
    }
}

impl<F> std::fmt::Debug for FnNode<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnNode").field("f", &"<function>").finish()
    }
}
