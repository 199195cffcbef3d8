//! Append-only JSON history of finished jobs.

use chrono::Local;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;

use crate::error::{JobError, JobResult};
use crate::logw;

pub const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRecord {
    #[serde(rename = "task_id", alias = "job_id")]
    pub job_id: String,
    #[serde(default)]
    pub product: String,
    #[serde(default)]
    pub time: String,
    /// Older logs stored `null` when a job finished without a URL.
    #[serde(rename = "video_url", alias = "artifact_url", default)]
    pub artifact_url: Option<String>,
    #[serde(default)]
    pub script: String,
}

impl HistoryRecord {
    pub fn new(
        job_id: impl Into<String>,
        product: impl Into<String>,
        artifact_url: impl Into<String>,
        script: impl Into<String>,
    ) -> Self {
        Self {
            job_id: job_id.into(),
            product: product.into(),
            time: Local::now().format(TIME_FORMAT).to_string(),
            artifact_url: Some(artifact_url.into()),
            script: script.into(),
        }
    }

    pub fn artifact_url_or_empty(&self) -> &str {
        self.artifact_url.as_deref().unwrap_or("")
    }
}

fn entry_job_id(entry: &Value) -> Option<&str> {
    entry
        .get("task_id")
        .or_else(|| entry.get("job_id"))
        .and_then(Value::as_str)
}

/// JSON-file history log, deduplicated by job id.
///
/// Writes replace the file atomically (temp file + rename), so a reader or a
/// second process never sees a half-written log; concurrent writers resolve
/// as last-writer-wins. Within one process appends are serialized.
///
/// Entries that do not decode as [`HistoryRecord`] are skipped on read but
/// written back untouched, and a file that is not a JSON array is never
/// overwritten.
#[derive(Debug)]
pub struct HistoryLog {
    path: PathBuf,
    write_lock: Mutex<()>,
}

fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir)?;
    let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Replace `path` with `bytes` through a temp file in the same directory.
pub(crate) async fn replace_file(path: &Path, bytes: Vec<u8>) -> JobResult<()> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || write_atomic(&path, &bytes))
        .await
        .map_err(|e| JobError::Io(std::io::Error::other(e)))??;
    Ok(())
}

impl HistoryLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Raw entries as stored. A missing file is empty; a file that is not a
    /// JSON array is an error.
    async fn load_entries(&self) -> JobResult<Vec<Value>> {
        let content = match fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        if content.trim().is_empty() {
            return Ok(Vec::new());
        }
        serde_json::from_str(&content).map_err(|e| {
            JobError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("history file {} is not a JSON array: {}", self.path.display(), e),
            ))
        })
    }

    /// All readable records, oldest first. An unreadable file reads as empty.
    pub async fn load(&self) -> Vec<HistoryRecord> {
        let entries = match self.load_entries().await {
            Ok(entries) => entries,
            Err(err) => {
                logw(format!("History unreadable: {}", err));
                return Vec::new();
            }
        };
        entries
            .into_iter()
            .filter_map(|entry| match serde_json::from_value::<HistoryRecord>(entry) {
                Ok(record) => Some(record),
                Err(err) => {
                    logw(format!("Skipping history entry in {}: {}", self.path.display(), err));
                    None
                }
            })
            .collect()
    }

    /// Append unless a record with the same job id exists.
    /// Returns whether the record was written. Existing entries, including
    /// ones this version cannot decode, are kept as they are.
    pub async fn append(&self, record: HistoryRecord) -> JobResult<bool> {
        let _guard = self.write_lock.lock().await;

        let mut entries = self.load_entries().await?;
        if entries
            .iter()
            .any(|entry| entry_job_id(entry) == Some(record.job_id.as_str()))
        {
            return Ok(false);
        }
        let entry = serde_json::to_value(&record).map_err(|e| JobError::Io(std::io::Error::other(e)))?;
        entries.push(entry);

        let bytes = serde_json::to_vec_pretty(&entries)
            .map_err(|e| JobError::Io(std::io::Error::other(e)))?;
        replace_file(&self.path, bytes).await?;
        Ok(true)
    }

    /// Newest first, at most `limit` records.
    pub async fn recent(&self, limit: usize) -> Vec<HistoryRecord> {
        self.load().await.into_iter().rev().take(limit).collect()
    }

    pub async fn find(&self, job_id: &str) -> Option<HistoryRecord> {
        self.load().await.into_iter().find(|r| r.job_id == job_id)
    }
}
