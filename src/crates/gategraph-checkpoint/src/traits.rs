//! Extensible checkpoint storage trait
//!
//! [`CheckpointSaver`] is the only seam between the executor and durable
//! storage. The executor is the single writer for a thread; readers (for
//! example an `inspect` endpoint) may call [`get`](CheckpointSaver::get) at
//! any time.
//!
//! # Contract
//!
//! - `get(thread_id)` returns the latest checkpoint, or `None` if the thread
//!   has never run.
//! - `put(thread_id, checkpoint, metadata)` is last-write-wins per thread and
//!   must reject a checkpoint whose `version` does not advance the stored one.
//! - Distinct thread ids never observe each other's checkpoints.
//! - Nothing is deleted automatically; retention belongs to the caller
//!   through [`delete_thread`](CheckpointSaver::delete_thread).
//!
//! # Implementing a Backend
//!
//! ```rust,ignore
//! use gategraph_checkpoint::{
//!     Checkpoint, CheckpointMetadata, CheckpointSaver, CheckpointStream, CheckpointTuple, Result,
//! };
//! use async_trait::async_trait;
//!
//! struct PostgresCheckpointSaver {
//!     pool: sqlx::PgPool,
//! }
//!
//! #[async_trait]
//! impl CheckpointSaver for PostgresCheckpointSaver {
//!     async fn get_tuple(&self, thread_id: &str) -> Result<Option<CheckpointTuple>> {
//!         // SELECT data, metadata FROM checkpoints
//!         //  WHERE thread_id = $1 ORDER BY version DESC LIMIT 1
//!         todo!()
//!     }
//!
//!     async fn put(
//!         &self,
//!         thread_id: &str,
//!         checkpoint: Checkpoint,
//!         metadata: CheckpointMetadata,
//!     ) -> Result<u64> {
//!         // INSERT INTO checkpoints (thread_id, version, data, metadata) ...
//!         todo!()
//!     }
//!
//!     async fn list(&self, thread_id: &str, limit: Option<usize>) -> Result<CheckpointStream> {
//!         todo!()
//!     }
//!
//!     async fn delete_thread(&self, thread_id: &str) -> Result<()> {
//!         // DELETE FROM checkpoints WHERE thread_id = $1
//!         todo!()
//!     }
//! }
//! ```

use crate::{
    checkpoint::{Checkpoint, CheckpointMetadata, CheckpointTuple},
    error::{CheckpointError, Result},
};
use async_trait::async_trait;
use futures::stream::Stream;
use std::pin::Pin;

/// Type alias for async stream of checkpoint tuples
pub type CheckpointStream =
    Pin<Box<dyn Stream<Item = Result<CheckpointTuple>> + Send + 'static>>;

/// Core trait for implementing checkpoint storage backends
///
/// Implementations must be thread-safe (`Send + Sync`) so that distinct
/// thread ids can progress concurrently on independent tasks.
#[async_trait]
pub trait CheckpointSaver: Send + Sync {
    /// Fetch the latest checkpoint of a thread
    async fn get(&self, thread_id: &str) -> Result<Option<Checkpoint>> {
        Ok(self.get_tuple(thread_id).await?.map(|tuple| tuple.checkpoint))
    }

    /// Fetch the latest checkpoint of a thread together with its metadata
    async fn get_tuple(&self, thread_id: &str) -> Result<Option<CheckpointTuple>>;

    /// Store a new checkpoint version for a thread
    ///
    /// Returns the stored version. Fails with
    /// [`CheckpointError::VersionConflict`] when `checkpoint.version` is not
    /// strictly greater than the stored version, and with
    /// [`CheckpointError::Invalid`] when the checkpoint belongs to a
    /// different thread.
    async fn put(
        &self,
        thread_id: &str,
        checkpoint: Checkpoint,
        metadata: CheckpointMetadata,
    ) -> Result<u64>;

    /// List a thread's checkpoint history, newest first
    async fn list(&self, thread_id: &str, limit: Option<usize>) -> Result<CheckpointStream>;

    /// Delete all checkpoints of a thread
    async fn delete_thread(&self, thread_id: &str) -> Result<()>;
}

/// Shared argument checks for `put` implementations
pub(crate) fn check_put(thread_id: &str, checkpoint: &Checkpoint, stored: Option<u64>) -> Result<()> {
    if thread_id.is_empty() {
        return Err(CheckpointError::Invalid("thread_id is required".to_string()));
    }
    if checkpoint.thread_id != thread_id {
        return Err(CheckpointError::Invalid(format!(
            "checkpoint belongs to thread '{}', not '{}'",
            checkpoint.thread_id, thread_id
        )));
    }
    if let Some(stored) = stored {
        if checkpoint.version <= stored {
            return Err(CheckpointError::VersionConflict {
                thread_id: thread_id.to_string(),
                stored,
                attempted: checkpoint.version,
            });
        }
    }
    Ok(())
}
