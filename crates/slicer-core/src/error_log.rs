//! Rolling internal-error log (`logs/log.json`), per the resource manager's
//! logging contract: only server-caused failures are recorded, never
//! client-caused rejections, and entries older than the retention window
//! are pruned on every write.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use slicer_types::SlicerError;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::error;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorLogEntry {
    pub timestamp: DateTime<Utc>,
    pub error: String,
    pub details: String,
    pub path: Option<String>,
}

/// Writer for the rolling error log. Serializes writes through a mutex so
/// concurrent workers never interleave a read-modify-write-persist cycle.
pub struct ErrorLog {
    path: PathBuf,
    retention: chrono::Duration,
    write_lock: Mutex<()>,
}

impl ErrorLog {
    pub fn new(path: impl Into<PathBuf>, retention_days: u32) -> Self {
        Self {
            path: path.into(),
            retention: chrono::Duration::days(retention_days as i64),
            write_lock: Mutex::new(()),
        }
    }

    /// Record an internal error. No-op (but logged via `tracing`) if `err`
    /// is a client error — those never touch the rolling log.
    pub async fn record(&self, err: &SlicerError, request_path: Option<&str>) {
        if err.is_client_error() {
            return;
        }

        let entry = ErrorLogEntry {
            timestamp: Utc::now(),
            error: err.error_code().to_string(),
            details: err.to_string(),
            path: request_path.map(str::to_string),
        };

        if let Err(io_err) = self.append(entry).await {
            error!(error = %io_err, path = %self.path.display(), "failed to write to the rolling error log");
        }
    }

    async fn append(&self, entry: ErrorLogEntry) -> std::io::Result<()> {
        let _guard = self.write_lock.lock().await;

        let mut entries = self.load().await;
        entries.push(entry);

        let cutoff = Utc::now() - self.retention;
        entries.retain(|e| e.timestamp >= cutoff);

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let serialized = serde_json::to_string_pretty(&entries)
            .unwrap_or_else(|_| "[]".to_string());
        let tmp_path = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, serialized.as_bytes()).await?;
        tokio::fs::rename(&tmp_path, &self.path).await
    }

    async fn load(&self) -> Vec<ErrorLogEntry> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => serde_json::from_str(&contents).unwrap_or_default(),
            Err(_) => Vec::new(),
        }
    }

    /// Read back the current (unpruned-by-this-call) entries, for tests and
    /// operator tooling.
    pub async fn read_all(&self) -> Vec<ErrorLogEntry> {
        self.load().await
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn client_errors_are_never_recorded() {
        let dir = tempfile::tempdir().unwrap();
        let log = ErrorLog::new(dir.path().join("log.json"), 7);
        log.record(&SlicerError::QueueFull, Some("/slice/FDM")).await;
        assert!(log.read_all().await.is_empty());
    }

    #[tokio::test]
    async fn internal_errors_are_appended_and_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.json");
        let log = ErrorLog::new(&path, 7);

        log.record(
            &SlicerError::Internal("slicer crashed".to_string()),
            Some("/slice/FDM"),
        )
        .await;

        let entries = log.read_all().await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].error, "INTERNAL_PROCESSING_ERROR");
        assert!(path.exists());
    }

    #[tokio::test]
    async fn entries_older_than_retention_are_pruned_on_next_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.json");
        let log = ErrorLog::new(&path, 7);

        let stale = ErrorLogEntry {
            timestamp: Utc::now() - chrono::Duration::days(10),
            error: "INTERNAL_PROCESSING_ERROR".to_string(),
            details: "old".to_string(),
            path: None,
        };
        tokio::fs::write(&path, serde_json::to_string(&vec![stale]).unwrap())
            .await
            .unwrap();

        log.record(&SlicerError::Internal("fresh".to_string()), None)
            .await;

        let entries = log.read_all().await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].details, "internal processing error: fresh");
    }
}
