//! Append-only file checkpoint storage
//!
//! [`FileCheckpointSaver`] writes one JSON-lines log per thread under a root
//! directory. Every `put` appends a line; the last line is the current
//! checkpoint. Because the log survives the process, a workflow suspended by
//! one process can be resumed by another one days later.
//!
//! ```text
//! <root>/
//!   negotiation-42.jsonl   {"checkpoint":{.. v1 ..},"metadata":{..}}
//!                          {"checkpoint":{.. v2 ..},"metadata":{..}}
//!                          {"checkpoint":{.. v3 suspended ..},"metadata":{..}}
//! ```
//!
//! Thread ids are escaped into file names, so any string is a valid id.
//! Escaped names longer than [`MAX_STEM_LEN`] bytes keep a readable prefix
//! and end in the SHA-256 of the full id.
//!
//! `get` and `put` only parse the last line of a log, read backwards from the
//! end of the file; `list` reads the whole log.

use crate::{
    checkpoint::{Checkpoint, CheckpointMetadata, CheckpointTuple},
    error::Result,
    traits::{check_put, CheckpointSaver, CheckpointStream},
};
use async_trait::async_trait;
use futures::stream;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::sync::Mutex;

const LOG_EXTENSION: &str = "jsonl";

/// Longest file stem written, leaving room for the extension under the
/// usual 255-byte file name limit
pub const MAX_STEM_LEN: usize = 200;

/// Bytes read per step when scanning a log backwards for its last line
const TAIL_CHUNK: u64 = 8 * 1024;

/// One line of a thread log
#[derive(Debug, Serialize, Deserialize)]
struct LogRecord {
    checkpoint: Checkpoint,
    metadata: CheckpointMetadata,
}

/// Durable checkpoint saver backed by append-only JSON-lines files
#[derive(Debug)]
pub struct FileCheckpointSaver {
    root: PathBuf,
    write_lock: Mutex<()>,
}

impl FileCheckpointSaver {
    /// Open (and create if needed) a checkpoint directory
    pub async fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&root).await?;
        tracing::debug!(root = %root.display(), "opened file checkpoint store");
        Ok(Self {
            root,
            write_lock: Mutex::new(()),
        })
    }

    /// Directory holding the thread logs
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn log_path(&self, thread_id: &str) -> PathBuf {
        self.root
            .join(format!("{}.{}", escape_thread_id(thread_id), LOG_EXTENSION))
    }

    async fn read_log(&self, thread_id: &str) -> Result<Vec<LogRecord>> {
        let path = self.log_path(thread_id);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str(line).map_err(Into::into))
            .collect()
    }

    async fn last_record(&self, thread_id: &str) -> Result<Option<LogRecord>> {
        let mut file = match tokio::fs::File::open(self.log_path(thread_id)).await {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let mut pos = file.metadata().await?.len();
        let mut tail: Vec<u8> = Vec::new();
        while pos > 0 {
            let chunk = TAIL_CHUNK.min(pos);
            pos -= chunk;
            file.seek(SeekFrom::Start(pos)).await?;
            let mut buf = vec![0u8; chunk as usize];
            file.read_exact(&mut buf).await?;
            buf.extend_from_slice(&tail);
            tail = buf;

            if let Some(line) = last_line(&tail, pos == 0) {
                return Ok(Some(serde_json::from_slice(line)?));
            }
        }
        Ok(None)
    }
}

/// The last non-blank line of `tail`, once it is known to be complete
///
/// A line is complete when a newline precedes it or when `tail` starts at
/// the beginning of the file.
fn last_line(tail: &[u8], at_start: bool) -> Option<&[u8]> {
    let end = tail.iter().rposition(|b| !b.is_ascii_whitespace())?;
    match tail[..end].iter().rposition(|&b| b == b'\n') {
        Some(newline) => Some(&tail[newline + 1..=end]),
        None if at_start => Some(&tail[..=end]),
        None => None,
    }
}

/// Escape a thread id into a portable file stem
///
/// `[A-Za-z0-9_-]` pass through, every other byte becomes `%XX`.
fn escape_thread_id(thread_id: &str) -> String {
    let mut out = String::with_capacity(thread_id.len());
    for byte in thread_id.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_' {
            out.push(byte as char);
        } else {
            out.push_str(&format!("%{:02X}", byte));
        }
    }
    if out.len() <= MAX_STEM_LEN {
        return out;
    }

    let digest = format!("{:x}", Sha256::digest(thread_id.as_bytes()));
    out.truncate(MAX_STEM_LEN - digest.len() - 1);
    out.push('~');
    out.push_str(&digest);
    out
}

#[async_trait]
impl CheckpointSaver for FileCheckpointSaver {
    async fn get_tuple(&self, thread_id: &str) -> Result<Option<CheckpointTuple>> {
        Ok(self
            .last_record(thread_id)
            .await?
            .map(|record| CheckpointTuple::new(record.checkpoint, record.metadata)))
    }

    async fn put(
        &self,
        thread_id: &str,
        checkpoint: Checkpoint,
        metadata: CheckpointMetadata,
    ) -> Result<u64> {
        let _guard = self.write_lock.lock().await;

        let stored = self.last_record(thread_id).await?.map(|r| r.checkpoint.version);
        check_put(thread_id, &checkpoint, stored)?;

        let version = checkpoint.version;
        let mut line = serde_json::to_string(&LogRecord { checkpoint, metadata })?;
        line.push('\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.log_path(thread_id))
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.sync_data().await?;

        tracing::trace!(thread_id, version, "appended checkpoint to log");
        Ok(version)
    }

    async fn list(&self, thread_id: &str, limit: Option<usize>) -> Result<CheckpointStream> {
        let results: Vec<_> = self
            .read_log(thread_id)
            .await?
            .into_iter()
            .rev()
            .take(limit.unwrap_or(usize::MAX))
            .map(|record| Ok(CheckpointTuple::new(record.checkpoint, record.metadata)))
            .collect();

        Ok(Box::pin(stream::iter(results)))
    }

    async fn delete_thread(&self, thread_id: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        match tokio::fs::remove_file(self.log_path(thread_id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::{CheckpointStatus, PendingInterrupt};
    use crate::error::CheckpointError;
    use futures::StreamExt;
    use serde_json::{json, Map};
    use tempfile::TempDir;

    #[test]
    fn test_escape_thread_id() {
        assert_eq!(escape_thread_id("thread-1_a"), "thread-1_a");
        assert_eq!(escape_thread_id("a/b c"), "a%2Fb%20c");
        assert_eq!(escape_thread_id(".."), "%2E%2E");
    }

    #[test]
    fn test_long_thread_ids_are_hashed() {
        let long = "/".repeat(300);
        let stem = escape_thread_id(&long);
        assert_eq!(stem.len(), MAX_STEM_LEN);
        assert!(stem.starts_with("%2F%2F"));
        assert_eq!(stem, escape_thread_id(&long));
        assert_ne!(stem, escape_thread_id(&"/".repeat(301)));
    }

    #[test]
    fn test_last_line_needs_a_boundary() {
        assert_eq!(last_line(b"{a}\n{b}\n\n", false), Some(&b"{b}"[..]));
        assert_eq!(last_line(b"{b}\n", false), None);
        assert_eq!(last_line(b"{b}\n", true), Some(&b"{b}"[..]));
        assert_eq!(last_line(b"\n \n", true), None);
    }

    #[tokio::test]
    async fn test_long_thread_id_round_trip() {
        let dir = TempDir::new().unwrap();
        let saver = FileCheckpointSaver::open(dir.path()).await.unwrap();
        let thread_id = format!("negotiation/{}", "x".repeat(400));

        let checkpoint = Checkpoint::new(thread_id.as_str(), "a", Map::new());
        saver
            .put(&thread_id, checkpoint, CheckpointMetadata::new())
            .await
            .unwrap();
        let restored = saver.get(&thread_id).await.unwrap().unwrap();
        assert_eq!(restored.thread_id, thread_id);
    }

    #[tokio::test]
    async fn test_latest_found_across_chunks() {
        let dir = TempDir::new().unwrap();
        let saver = FileCheckpointSaver::open(dir.path()).await.unwrap();
        let clause_len = 3 * TAIL_CHUNK as usize;

        let mut values = Map::new();
        values.insert("clause".to_string(), json!("z".repeat(clause_len)));
        let mut current = Checkpoint::new("thread-1", "a", values);
        saver.put("thread-1", current.clone(), CheckpointMetadata::new()).await.unwrap();
        for _ in 0..2 {
            current = current.successor();
            saver.put("thread-1", current.clone(), CheckpointMetadata::new()).await.unwrap();
        }

        let latest = saver.get("thread-1").await.unwrap().unwrap();
        assert_eq!(latest.version, 3);
        assert_eq!(latest.values["clause"].as_str().map(str::len), Some(clause_len));
    }

    #[tokio::test]
    async fn test_survives_reopen() {
        let dir = TempDir::new().unwrap();

        {
            let saver = FileCheckpointSaver::open(dir.path()).await.unwrap();
            let mut checkpoint = Checkpoint::new("thread-1", "gate", Map::new());
            checkpoint.status = CheckpointStatus::Suspended;
            checkpoint.pending_interrupt =
                Some(PendingInterrupt::new("gate", json!({"type": "approval_required"})));
            saver
                .put("thread-1", checkpoint, CheckpointMetadata::new())
                .await
                .unwrap();
        }

        let reopened = FileCheckpointSaver::open(dir.path()).await.unwrap();
        let restored = reopened.get("thread-1").await.unwrap().unwrap();
        assert!(restored.is_suspended());
        assert_eq!(
            restored.pending_interrupt.unwrap().payload,
            json!({"type": "approval_required"})
        );
    }

    #[tokio::test]
    async fn test_log_is_append_only() {
        let dir = TempDir::new().unwrap();
        let saver = FileCheckpointSaver::open(dir.path()).await.unwrap();

        let first = Checkpoint::new("thread-1", "a", Map::new());
        let second = first.successor();
        saver.put("thread-1", first, CheckpointMetadata::new()).await.unwrap();
        saver.put("thread-1", second, CheckpointMetadata::new()).await.unwrap();

        let history: Vec<_> = saver.list("thread-1", None).await.unwrap().collect().await;
        assert_eq!(history.len(), 2);
        assert_eq!(saver.get("thread-1").await.unwrap().unwrap().version, 2);

        let err = saver
            .put("thread-1", Checkpoint::new("thread-1", "a", Map::new()), CheckpointMetadata::new())
            .await
            .unwrap_err();
        assert!(matches!(err, CheckpointError::VersionConflict { .. }));
    }

    #[tokio::test]
    async fn test_missing_thread_is_none() {
        let dir = TempDir::new().unwrap();
        let saver = FileCheckpointSaver::open(dir.path()).await.unwrap();
        assert!(saver.get("nobody").await.unwrap().is_none());
        saver.delete_thread("nobody").await.unwrap();
    }

    #[tokio::test]
    async fn test_corrupt_log_reports_serialization_error() {
        let dir = TempDir::new().unwrap();
        let saver = FileCheckpointSaver::open(dir.path()).await.unwrap();
        tokio::fs::write(saver.log_path("thread-1"), "{not json}\n")
            .await
            .unwrap();

        let err = saver.get("thread-1").await.unwrap_err();
        assert!(matches!(err, CheckpointError::Serialization(_)));
    }
}
