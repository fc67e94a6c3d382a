//! Error types for checkpoint operations

use thiserror::Error;

/// Result type for checkpoint operations
pub type Result<T> = std::result::Result<T, CheckpointError>;

/// Errors that can occur during checkpoint operations
#[derive(Error, Debug)]
pub enum CheckpointError {
    /// No checkpoint stored for the thread
    #[error("Checkpoint not found: {0}")]
    NotFound(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Storage backend error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Invalid checkpoint or argument
    #[error("Invalid checkpoint: {0}")]
    Invalid(String),

    /// A put did not advance the thread's version counter
    #[error("Version conflict on thread '{thread_id}': stored {stored}, attempted {attempted}")]
    VersionConflict {
        /// Thread whose checkpoint was being written
        thread_id: String,
        /// Version currently stored
        stored: u64,
        /// Version the writer tried to store
        attempted: u64,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
