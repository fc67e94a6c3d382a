//! In-memory checkpoint storage for development and testing
//!
//! [`InMemoryCheckpointSaver`] keeps every version of every thread in a
//! `Arc<RwLock<HashMap>>`. It is volatile: a process restart loses all
//! threads, which is acceptable when one orchestrator instance owns a
//! disjoint set of thread ids. Use
//! [`FileCheckpointSaver`](crate::file::FileCheckpointSaver) when a paused
//! workflow must outlive the process.
//!
//! ```text
//! Arc<RwLock<HashMap>>
//!   "thread-a" ─► [v1 input] [v2 loop] [v3 loop, suspended]
//!   "thread-b" ─► [v1 input] [v2 loop]
//! ```

use crate::{
    checkpoint::{Checkpoint, CheckpointMetadata, CheckpointTuple},
    error::Result,
    traits::{check_put, CheckpointSaver, CheckpointStream},
};
use async_trait::async_trait;
use futures::stream;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Storage entry for in-memory checkpoints
#[derive(Debug, Clone)]
struct CheckpointEntry {
    checkpoint: Checkpoint,
    metadata: CheckpointMetadata,
}

impl CheckpointEntry {
    fn to_tuple(&self) -> CheckpointTuple {
        CheckpointTuple::new(self.checkpoint.clone(), self.metadata.clone())
    }
}

/// Thread-safe in-memory checkpoint storage
type CheckpointStorage = Arc<RwLock<HashMap<String, Vec<CheckpointEntry>>>>;

/// In-memory checkpoint saver implementation
///
/// Cloning the saver shares the underlying storage.
///
/// # Example
///
/// ```rust
/// use gategraph_checkpoint::{Checkpoint, CheckpointMetadata, CheckpointSaver, InMemoryCheckpointSaver};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> gategraph_checkpoint::Result<()> {
/// let saver = InMemoryCheckpointSaver::new();
/// let checkpoint = Checkpoint::new("thread-1", "first", Default::default());
/// saver.put("thread-1", checkpoint, CheckpointMetadata::new()).await?;
///
/// assert!(saver.get("thread-1").await?.is_some());
/// assert!(saver.get("thread-2").await?.is_none());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct InMemoryCheckpointSaver {
    storage: CheckpointStorage,
}

impl InMemoryCheckpointSaver {
    /// Create a new in-memory checkpoint saver
    pub fn new() -> Self {
        Self {
            storage: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Get the number of threads being tracked
    pub async fn thread_count(&self) -> usize {
        self.storage.read().await.len()
    }

    /// Get the total number of checkpoints across all threads
    pub async fn checkpoint_count(&self) -> usize {
        self.storage
            .read()
            .await
            .values()
            .map(|entries| entries.len())
            .sum()
    }

    /// Clear all checkpoints (useful for testing)
    pub async fn clear(&self) {
        self.storage.write().await.clear();
    }
}

impl Default for InMemoryCheckpointSaver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CheckpointSaver for InMemoryCheckpointSaver {
    async fn get_tuple(&self, thread_id: &str) -> Result<Option<CheckpointTuple>> {
        let storage = self.storage.read().await;
        Ok(storage
            .get(thread_id)
            .and_then(|entries| entries.last())
            .map(CheckpointEntry::to_tuple))
    }

    async fn put(
        &self,
        thread_id: &str,
        checkpoint: Checkpoint,
        metadata: CheckpointMetadata,
    ) -> Result<u64> {
        let mut storage = self.storage.write().await;
        let stored = storage
            .get(thread_id)
            .and_then(|entries| entries.last())
            .map(|e| e.checkpoint.version);
        check_put(thread_id, &checkpoint, stored)?;

        let version = checkpoint.version;
        storage
            .entry(thread_id.to_string())
            .or_default()
            .push(CheckpointEntry { checkpoint, metadata });

        tracing::trace!(thread_id, version, "stored checkpoint in memory");
        Ok(version)
    }

    async fn list(&self, thread_id: &str, limit: Option<usize>) -> Result<CheckpointStream> {
        let storage = self.storage.read().await;
        let results: Vec<_> = storage
            .get(thread_id)
            .map(|entries| {
                entries
                    .iter()
                    .rev()
                    .take(limit.unwrap_or(usize::MAX))
                    .map(|entry| Ok(entry.to_tuple()))
                    .collect()
            })
            .unwrap_or_default();

        Ok(Box::pin(stream::iter(results)))
    }

    async fn delete_thread(&self, thread_id: &str) -> Result<()> {
        self.storage.write().await.remove(thread_id);
        Ok(())
    }
}
