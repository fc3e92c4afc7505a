//! Keyed deployment record store with per-task locking.
//!
//! Records live in memory and, when a path is given, are mirrored to an
//! append-only JSONL log: every confirmed change appends a full snapshot,
//! and opening the store replays the log (last snapshot per task wins).

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::warn;

use crate::domain::DeploymentRecord;

/// One line of the records log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordEntry {
    /// When the snapshot was written
    pub timestamp: DateTime<Utc>,

    /// Full record as of this change
    pub record: DeploymentRecord,
}

/// Exclusive right to run the state machine for one task id
pub struct TaskLease {
    task_id: String,
    _guard: OwnedMutexGuard<()>,
}

impl TaskLease {
    pub fn task_id(&self) -> &str {
        &self.task_id
    }
}

/// Store of deployment records, one per task id
pub struct RecordStore {
    records: Mutex<HashMap<String, DeploymentRecord>>,

    /// One async mutex per task id, created on first use
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,

    /// Path to records.jsonl (None = memory only)
    log_path: Option<PathBuf>,

    /// Serializes appends to the log file
    log_writer: Mutex<()>,
}

impl RecordStore {
    /// Memory-only store
    pub fn in_memory() -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            locks: Mutex::new(HashMap::new()),
            log_path: None,
            log_writer: Mutex::new(()),
        }
    }

    /// Open (or create) a store persisted at `path`
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let log_path = path.into();

        if let Some(parent) = log_path.parent() {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create store directory: {}", parent.display()))?;
        }

        let mut records = HashMap::new();
        for entry in replay(&log_path).await? {
            records.insert(entry.record.task_id.clone(), entry.record);
        }

        Ok(Self {
            records: Mutex::new(records),
            locks: Mutex::new(HashMap::new()),
            log_path: Some(log_path),
            log_writer: Mutex::new(()),
        })
    }

    /// Path of the backing log, if persisted
    pub fn log_path(&self) -> Option<&Path> {
        self.log_path.as_deref()
    }

    /// Wait for exclusive access to `task_id`
    pub async fn lock(&self, task_id: &str) -> TaskLease {
        let lock = {
            let mut locks = self.locks.lock().await;
            locks
                .entry(task_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };

        TaskLease {
            task_id: task_id.to_string(),
            _guard: lock.lock_owned().await,
        }
    }

    /// Current record for a task
    pub async fn get(&self, task_id: &str) -> Option<DeploymentRecord> {
        self.records.lock().await.get(task_id).cloned()
    }

    /// Persist a record snapshot.
    ///
    /// Requires the task's lease, so only the running orchestration can
    /// write its record.
    pub async fn put(&self, lease: &TaskLease, record: &DeploymentRecord) -> Result<()> {
        if lease.task_id() != record.task_id {
            anyhow::bail!(
                "Lease for task '{}' cannot write record for '{}'",
                lease.task_id(),
                record.task_id
            );
        }

        if let Some(ref path) = self.log_path {
            let entry = RecordEntry {
                timestamp: Utc::now(),
                record: record.clone(),
            };
            let _writer = self.log_writer.lock().await;
            append(path, &entry).await?;
        }

        self.records
            .lock()
            .await
            .insert(record.task_id.clone(), record.clone());
        Ok(())
    }

    /// All records, most recently updated first
    pub async fn list(&self) -> Vec<DeploymentRecord> {
        let mut records: Vec<DeploymentRecord> =
            self.records.lock().await.values().cloned().collect();
        records.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        records
    }

    pub async fn len(&self) -> usize {
        self.records.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.lock().await.is_empty()
    }
}

async fn append(path: &Path, entry: &RecordEntry) -> Result<()> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
        .with_context(|| format!("Failed to open records file: {}", path.display()))?;

    let json = serde_json::to_string(entry).context("Failed to serialize record")?;
    file.write_all(format!("{}\n", json).as_bytes())
        .await
        .context("Failed to write record")?;
    file.flush().await.context("Failed to flush record")?;

    Ok(())
}

/// Read all entries in order, skipping a torn trailing line
async fn replay(path: &Path) -> Result<Vec<RecordEntry>> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let file = File::open(path)
        .await
        .with_context(|| format!("Failed to open records file: {}", path.display()))?;

    let mut lines = BufReader::new(file).lines();
    let mut entries = Vec::new();
    let mut line_no = 0usize;

    while let Some(line) = lines.next_line().await? {
        line_no += 1;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<RecordEntry>(&line) {
            Ok(entry) => entries.push(entry),
            Err(e) => warn!(line = line_no, error = %e, "Skipping unreadable record entry"),
        }
    }

    Ok(entries)
}
