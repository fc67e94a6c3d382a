//! Core checkpoint data structures for durable suspension and resume
//!
//! A [`Checkpoint`] is the complete, serialisable position of one workflow
//! instance (a *thread*): the accumulated state values, the node that runs
//! next, the interrupt payload waiting for a human decision (if any) and a
//! per-thread version counter.
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │  Checkpoint (thread "negotiation-42", v7)     │
//! │  • status: suspended                          │
//! │  • next_node: "human_gate"                    │
//! │  • values: { "messages": [...], ... }         │
//! │  • pending_interrupt: { payload: {...} }      │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! # Lifecycle
//!
//! | Status | Meaning | Next allowed call |
//! |--------|---------|-------------------|
//! | `Running` | Walk in progress (or last commit before a crash) | `run` |
//! | `Suspended` | A node asked for a human decision | `resume` |
//! | `Complete` | Walk reached the terminal | `run` |
//! | `Failed` | A node raised; state is the last committed one | `run` |

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

/// Checkpoint ID type
pub type CheckpointId = String;

/// Execution status of a thread as recorded in its latest checkpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointStatus {
    /// Nodes are being walked
    Running,
    /// Waiting for a resume value
    Suspended,
    /// Terminal: the walk reached the end of the graph
    Complete,
    /// Terminal: a node failed and the walk was aborted
    Failed,
}

impl CheckpointStatus {
    /// Whether no further node will run without a new `run` call
    pub fn is_terminal(&self) -> bool {
        matches!(self, CheckpointStatus::Complete | CheckpointStatus::Failed)
    }

    /// Lowercase name used in logs and API responses
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckpointStatus::Running => "running",
            CheckpointStatus::Suspended => "suspended",
            CheckpointStatus::Complete => "complete",
            CheckpointStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for CheckpointStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Interrupt raised by a node and not yet answered
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingInterrupt {
    /// Unique interrupt ID
    pub id: String,

    /// Node that suspended
    pub node: String,

    /// Opaque payload surfaced to the caller
    pub payload: Value,

    /// When the node suspended
    pub ts: DateTime<Utc>,
}

impl PendingInterrupt {
    /// Create a new pending interrupt for `node`
    pub fn new(node: impl Into<String>, payload: Value) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            node: node.into(),
            payload,
            ts: Utc::now(),
        }
    }
}

/// What produced a checkpoint
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CheckpointSource {
    /// Written from the caller's input at the start of a walk
    Input,
    /// Written after a node completed or suspended
    Loop,
    /// Written after a resumed node completed
    Resume,
    /// Written when a node failed
    Failure,
}

/// Metadata stored next to each checkpoint version
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct CheckpointMetadata {
    /// The source of the checkpoint
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<CheckpointSource>,

    /// Number of nodes executed in the walk that wrote this checkpoint
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step: Option<u32>,

    /// Node whose execution produced this checkpoint
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node: Option<String>,

    /// Additional custom metadata
    #[serde(flatten)]
    pub extra: HashMap<String, Value>,
}

impl CheckpointMetadata {
    /// Create new checkpoint metadata
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the source
    pub fn with_source(mut self, source: CheckpointSource) -> Self {
        self.source = Some(source);
        self
    }

    /// Set the step number
    pub fn with_step(mut self, step: u32) -> Self {
        self.step = Some(step);
        self
    }

    /// Set the producing node
    pub fn with_node(mut self, node: impl Into<String>) -> Self {
        self.node = Some(node.into());
        self
    }

    /// Add custom metadata
    pub fn with_extra(mut self, key: String, value: Value) -> Self {
        self.extra.insert(key, value);
        self
    }
}

/// Snapshot of one thread's execution position and accumulated state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// The version of the checkpoint format
    pub v: i32,

    /// Unique ID of this snapshot
    pub id: CheckpointId,

    /// When the snapshot was taken
    pub ts: DateTime<Utc>,

    /// Thread the snapshot belongs to
    pub thread_id: String,

    /// Per-thread counter, strictly increasing across puts
    pub version: u64,

    /// Execution status
    pub status: CheckpointStatus,

    /// Node to execute next; `None` once the walk is complete
    pub next_node: Option<String>,

    /// State record values (absent fields have no key)
    pub values: Map<String, Value>,

    /// Interrupt waiting for a resume value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_interrupt: Option<PendingInterrupt>,

    /// Failure cause when `status` is `Failed`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Checkpoint {
    /// Current checkpoint format version
    pub const CURRENT_VERSION: i32 = 1;

    /// Create the first checkpoint of a walk
    pub fn new(thread_id: impl Into<String>, entry: impl Into<String>, values: Map<String, Value>) -> Self {
        Self {
            v: Self::CURRENT_VERSION,
            id: Uuid::new_v4().to_string(),
            ts: Utc::now(),
            thread_id: thread_id.into(),
            version: 1,
            status: CheckpointStatus::Running,
            next_node: Some(entry.into()),
            values,
            pending_interrupt: None,
            error: None,
        }
    }

    /// Derive the next version of this checkpoint with a fresh ID and timestamp
    ///
    /// Status, pointer and values are carried over; callers adjust what changed.
    pub fn successor(&self) -> Self {
        Self {
            v: Self::CURRENT_VERSION,
            id: Uuid::new_v4().to_string(),
            ts: Utc::now(),
            thread_id: self.thread_id.clone(),
            version: self.version + 1,
            status: self.status,
            next_node: self.next_node.clone(),
            values: self.values.clone(),
            pending_interrupt: self.pending_interrupt.clone(),
            error: self.error.clone(),
        }
    }

    /// Whether the thread is parked on an interrupt
    pub fn is_suspended(&self) -> bool {
        self.status == CheckpointStatus::Suspended
    }
}

/// A checkpoint together with the metadata it was stored with
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointTuple {
    /// The checkpoint itself
    pub checkpoint: Checkpoint,

    /// Metadata associated with the checkpoint
    pub metadata: CheckpointMetadata,
}

impl CheckpointTuple {
    /// Create a new checkpoint tuple
    pub fn new(checkpoint: Checkpoint, metadata: CheckpointMetadata) -> Self {
        Self { checkpoint, metadata }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_checkpoint_creation() {
        let checkpoint = Checkpoint::new("thread-1", "start_node", Map::new());
        assert_eq!(checkpoint.v, Checkpoint::CURRENT_VERSION);
        assert_eq!(checkpoint.version, 1);
        assert_eq!(checkpoint.status, CheckpointStatus::Running);
        assert_eq!(checkpoint.next_node.as_deref(), Some("start_node"));
        assert!(checkpoint.pending_interrupt.is_none());
    }

    #[test]
    fn test_successor_bumps_version_and_id() {
        let first = Checkpoint::new("thread-1", "a", Map::new());
        let second = first.successor();

        assert_eq!(second.version, 2);
        assert_eq!(second.thread_id, "thread-1");
        assert_ne!(second.id, first.id);
        assert_eq!(second.next_node, first.next_node);
    }

    #[test]
    fn test_status_serialization() {
        assert_eq!(serde_json::to_value(CheckpointStatus::Suspended).unwrap(), json!("suspended"));
        assert!(CheckpointStatus::Complete.is_terminal());
        assert!(CheckpointStatus::Failed.is_terminal());
        assert!(!CheckpointStatus::Suspended.is_terminal());
    }

    #[test]
    fn test_checkpoint_json_roundtrip_keeps_interrupt() {
        let mut checkpoint = Checkpoint::new("thread-1", "gate", Map::new());
        checkpoint.status = CheckpointStatus::Suspended;
        checkpoint.pending_interrupt = Some(PendingInterrupt::new("gate", json!({"type": "approval_required"})));

        let text = serde_json::to_string(&checkpoint).unwrap();
        let restored: Checkpoint = serde_json::from_str(&text).unwrap();

        assert_eq!(restored, checkpoint);
        assert!(restored.is_suspended());
    }

    #[test]
    fn test_checkpoint_metadata() {
        let metadata = CheckpointMetadata::new()
            .with_source(CheckpointSource::Input)
            .with_step(0)
            .with_extra("key".to_string(), json!("value"));

        assert_eq!(metadata.source, Some(CheckpointSource::Input));
        assert_eq!(metadata.step, Some(0));
        assert_eq!(metadata.extra.get("key"), Some(&json!("value")));
    }
}
