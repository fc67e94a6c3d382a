//! Error types for graph construction, execution and the interrupt protocol
//!
//! # Error Hierarchy
//!
//! ```text
//! GraphError
//! ├── Validation          - Graph structure errors (compile time)
//! ├── Configuration       - No or several conditional edges matched (fatal)
//! ├── NodeExecutionFailed - A node's logic raised; walk aborted
//! ├── AlreadyPaused       - `run` on a suspended thread
//! ├── NotPaused           - `resume` on a thread that is not suspended
//! ├── ConcurrentAccess    - Second caller on a busy thread
//! ├── State               - Schema / merge errors
//! ├── Checkpoint          - Persistence errors
//! ├── Generation          - Collaborator fault escaping a node
//! ├── Serialization       - JSON errors
//! └── Execution           - Everything else (step limit, corrupt checkpoint)
//! ```
//!
//! The three protocol errors (`AlreadyPaused`, `NotPaused`,
//! `ConcurrentAccess`) are rejected before any state is touched. A paused
//! walk is never an error; it is reported as
//! [`RunOutcome::Paused`](crate::executor::RunOutcome::Paused).

use crate::state::StateError;
use gategraph_checkpoint::CheckpointError;
use thiserror::Error;

/// Convenience result type using [`GraphError`]
pub type Result<T> = std::result::Result<T, GraphError>;

/// Errors raised by graph construction and execution
#[derive(Error, Debug)]
pub enum GraphError {
    /// Graph structure validation failed
    ///
    /// Raised by [`StateGraph::compile`](crate::builder::StateGraph::compile)
    /// for a missing entry, dangling edges, duplicate or reserved node names
    /// and nodes mixing direct and conditional edges.
    #[error("Graph validation failed: {0}")]
    Validation(String),

    /// Conditional routing matched zero or more than one edge
    ///
    /// Fatal and never retried: the graph itself is wrong.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A node's logic raised
    ///
    /// The walk is aborted and the checkpoint is not advanced past the last
    /// successfully committed node.
    #[error("Node '{node}' execution failed: {cause}")]
    NodeExecutionFailed {
        /// Name of the node that failed
        node: String,
        /// Error message from node execution
        cause: String,
    },

    /// `run` was called on a thread waiting for a resume value
    #[error("Thread '{thread_id}' is paused; call resume instead of run")]
    AlreadyPaused {
        /// The suspended thread
        thread_id: String,
    },

    /// `resume` was called on a thread that is not suspended
    #[error("Thread '{thread_id}' is not paused (status: {status})")]
    NotPaused {
        /// The thread that was resumed
        thread_id: String,
        /// Its current status, or `absent` when it never ran
        status: String,
    },

    /// Another `run`/`resume` on the same thread is in progress
    #[error("Thread '{thread_id}' is already being executed by another caller")]
    ConcurrentAccess {
        /// The busy thread
        thread_id: String,
    },

    /// State schema or merge error
    #[error("State error: {0}")]
    State(#[from] StateError),

    /// Checkpoint persistence error
    #[error("Checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),

    /// External generation service fault that a node did not handle
    #[error("Generation error: {0}")]
    Generation(String),

    /// JSON serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic execution error without specific node context
    #[error("Execution failed: {0}")]
    Execution(String),
}

impl GraphError {
    /// Create a node execution error
    pub fn node_execution(node: impl Into<String>, cause: impl ToString) -> Self {
        Self::NodeExecutionFailed {
            node: node.into(),
            cause: cause.to_string(),
        }
    }

    /// Whether the caller misused the run/resume protocol
    ///
    /// These errors are returned before any checkpoint is written.
    pub fn is_protocol_misuse(&self) -> bool {
        matches!(
            self,
            GraphError::AlreadyPaused { .. }
                | GraphError::NotPaused { .. }
                | GraphError::ConcurrentAccess { .. }
        )
    }

    /// Whether retrying the same `run`/`resume` may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            GraphError::NodeExecutionFailed { .. }
            | GraphError::Generation(_)
            | GraphError::ConcurrentAccess { .. } => true,
            GraphError::Checkpoint(err) => matches!(
                err,
                CheckpointError::Io(_) | CheckpointError::Storage(_)
            ),
            _ => false,
        }
    }

    /// Name of the node the error is attributed to, if any
    pub fn node(&self) -> Option<&str> {
        match self {
            GraphError::NodeExecutionFailed { node, .. } => Some(node),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_execution_display() {
        let err = GraphError::node_execution("drafting", "provider timeout");
        assert_eq!(
            err.to_string(),
            "Node 'drafting' execution failed: provider timeout"
        );
        assert_eq!(err.node(), Some("drafting"));
    }

    #[test]
    fn test_error_classification() {
        let paused = GraphError::AlreadyPaused {
            thread_id: "t".to_string(),
        };
        assert!(paused.is_protocol_misuse());
        assert!(!paused.is_retryable());

        let config = GraphError::Configuration("no edge matched".to_string());
        assert!(!config.is_protocol_misuse());
        assert!(!config.is_retryable());

        assert!(GraphError::node_execution("n", "boom").is_retryable());
        assert!(!GraphError::Checkpoint(CheckpointError::Invalid("x".into())).is_retryable());
    }

    #[test]
    fn test_from_state_error() {
        let err: GraphError = StateError::UnknownField("nope".to_string()).into();
        assert!(matches!(err, GraphError::State(_)));
    }
}
