//! # gategraph-checkpoint - Durable Workflow Positions
//!
//! **Checkpoint model and storage backends** for the gategraph executor. A
//! checkpoint records everything needed to continue a workflow instance
//! later, possibly in another process: the state values, the node that runs
//! next, the pending interrupt payload and a per-thread version counter.
//!
//! ## Core Concepts
//!
//! - [`Checkpoint`] - one snapshot of a thread, with [`CheckpointStatus`]
//!   (`running`, `suspended`, `complete`, `failed`)
//! - [`PendingInterrupt`] - the payload a node surfaced when it suspended
//! - [`CheckpointSaver`] - the storage trait the executor writes through
//! - [`InMemoryCheckpointSaver`] - volatile backend for tests and single
//!   process deployments
//! - [`FileCheckpointSaver`] - append-only JSON-lines backend that survives
//!   restarts
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use gategraph_checkpoint::{
//!     Checkpoint, CheckpointMetadata, CheckpointSaver, CheckpointSource, FileCheckpointSaver,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let saver = FileCheckpointSaver::open("/var/lib/negotiator/checkpoints").await?;
//!
//!     let checkpoint = Checkpoint::new("negotiation-42", "compliance_check", Default::default());
//!     let metadata = CheckpointMetadata::new().with_source(CheckpointSource::Input);
//!     saver.put("negotiation-42", checkpoint, metadata).await?;
//!
//!     if let Some(latest) = saver.get("negotiation-42").await? {
//!         println!("{} is {}", latest.thread_id, latest.status);
//!     }
//!     Ok(())
//! }
//! ```

pub mod checkpoint;
pub mod error;
pub mod file;
pub mod memory;
pub mod traits;

pub use checkpoint::{
    Checkpoint, CheckpointId, CheckpointMetadata, CheckpointSource, CheckpointStatus,
    CheckpointTuple, PendingInterrupt,
};
pub use error::{CheckpointError, Result};
pub use file::FileCheckpointSaver;
pub use memory::InMemoryCheckpointSaver;
pub use traits::{CheckpointSaver, CheckpointStream};
