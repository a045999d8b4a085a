//! Persistence collaborators.
//!
//! Both stores upsert by node id with last-write-wins in presentation
//! order; the supervisor hands rows over sorted oldest-first.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::io::AsyncWriteExt;

use crate::domain::{CrawledNode, StoreError, Timestamp};
use crate::ports::NodeStore;

// ============================================================================
// MemoryStore
// ============================================================================

/// In-memory store keyed by node id.
#[derive(Debug, Default)]
pub struct MemoryStore {
    rows: RwLock<HashMap<String, CrawledNode>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stored row for a hex node id.
    pub fn get(&self, id: &str) -> Option<CrawledNode> {
        self.rows.read().get(id).cloned()
    }

    /// Number of stored rows.
    pub fn len(&self) -> usize {
        self.rows.read().len()
    }

    /// True if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.rows.read().is_empty()
    }
}

#[async_trait]
impl NodeStore for MemoryStore {
    async fn upsert_nodes(&self, rows: &[CrawledNode]) -> Result<(), StoreError> {
        let mut stored = self.rows.write();
        for row in rows {
            stored.insert(row.id.clone(), row.clone());
        }
        Ok(())
    }

    async fn drop_older_than(&self, cutoff: Timestamp) -> Result<usize, StoreError> {
        let mut stored = self.rows.write();
        let before = stored.len();
        stored.retain(|_, row| row.observed_at >= cutoff);
        Ok(before - stored.len())
    }
}

// ============================================================================
// JsonLinesStore
// ============================================================================

/// Append-only JSON-lines file, one row per line.
///
/// Readers replaying the file in order get last-write-wins per node id.
/// Pruning rewrites the file without the stale rows.
#[derive(Debug, Clone)]
pub struct JsonLinesStore {
    path: PathBuf,
}

impl JsonLinesStore {
    /// Store appending to `path`; the file is created on first write.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Target file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl NodeStore for JsonLinesStore {
    async fn upsert_nodes(&self, rows: &[CrawledNode]) -> Result<(), StoreError> {
        let mut buf = Vec::new();
        for row in rows {
            serde_json::to_writer(&mut buf, row)?;
            buf.push(b'\n');
        }

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(&buf).await?;
        file.sync_data().await?;
        Ok(())
    }

    async fn drop_older_than(&self, cutoff: Timestamp) -> Result<usize, StoreError> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        let mut kept = String::with_capacity(content.len());
        let mut dropped = 0;
        for line in content.lines().filter(|line| !line.trim().is_empty()) {
            let row: serde_json::Value = serde_json::from_str(line)?;
            let observed = row
                .get("observedAt")
                .and_then(serde_json::Value::as_u64)
                .unwrap_or_default();
            if observed < cutoff.as_secs() {
                dropped += 1;
            } else {
                kept.push_str(line);
                kept.push('\n');
            }
        }

        if dropped > 0 {
            let tmp = self.path.with_extension("jsonl.tmp");
            tokio::fs::write(&tmp, kept).await?;
            tokio::fs::rename(&tmp, &self.path).await?;
        }
        Ok(dropped)
    }
}
