//! Run outcome reporting
//!
//! Scheduled runs leave two artifacts behind: a `last_status.json` document
//! holding the most recent outcome, and an append-only JSONL run log that
//! external monitoring can tail.

use std::fs::OpenOptions;
use std::io::Write;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::VaultPaths;
use crate::error::{VaultError, VaultResult};
use crate::storage::write_json_atomic;

/// One completed backup or restore run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunEntry {
    pub timestamp: DateTime<Utc>,
    pub success: bool,
    pub operation: String,
    pub backup_name: String,
    pub environment: String,
    pub target: String,
    pub details: String,
}

impl RunEntry {
    pub fn new(
        success: bool,
        operation: impl Into<String>,
        backup_name: impl Into<String>,
        environment: impl Into<String>,
        target: impl Into<String>,
        details: impl Into<String>,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            success,
            operation: operation.into(),
            backup_name: backup_name.into(),
            environment: environment.into(),
            target: target.into(),
            details: details.into(),
        }
    }
}

/// Where run outcomes are reported
pub trait NotificationSink {
    fn notify(&self, entry: &RunEntry) -> VaultResult<()>;
}

/// Sink that records outcomes on the backup filesystem
pub struct FileStatusSink {
    paths: VaultPaths,
}

impl FileStatusSink {
    pub fn new(paths: VaultPaths) -> Self {
        Self { paths }
    }

    fn append_run_log(&self, entry: &RunEntry) -> VaultResult<()> {
        let line = serde_json::to_string(entry)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.paths.run_log_file())
            .map_err(|e| VaultError::Io(format!("Failed to open run log: {}", e)))?;
        writeln!(file, "{}", line)
            .map_err(|e| VaultError::Io(format!("Failed to append run log: {}", e)))?;
        Ok(())
    }
}

impl NotificationSink for FileStatusSink {
    fn notify(&self, entry: &RunEntry) -> VaultResult<()> {
        write_json_atomic(&self.paths.last_status_file(), entry)?;
        self.append_run_log(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_sink() -> (FileStatusSink, TempDir) {
        let temp = TempDir::new().unwrap();
        let paths = VaultPaths::with_backup_dir(temp.path().to_path_buf());
        paths.ensure_directories().unwrap();
        (FileStatusSink::new(paths), temp)
    }

    #[test]
    fn test_notify_writes_last_status() {
        let (sink, temp) = test_sink();
        let entry = RunEntry::new(true, "backup", "nightly", "docker", "pg-main", "ok");

        sink.notify(&entry).unwrap();

        let status_path = temp.path().join(".metadata").join("last_status.json");
        let loaded: RunEntry =
            serde_json::from_str(&std::fs::read_to_string(status_path).unwrap()).unwrap();
        assert!(loaded.success);
        assert_eq!(loaded.backup_name, "nightly");
        assert_eq!(loaded.environment, "docker");
    }

    #[test]
    fn test_notify_appends_run_log() {
        let (sink, temp) = test_sink();

        sink.notify(&RunEntry::new(true, "backup", "a", "docker", "pg", "ok"))
            .unwrap();
        sink.notify(&RunEntry::new(false, "backup", "b", "docker", "pg", "dump failed"))
            .unwrap();

        let log = std::fs::read_to_string(temp.path().join("scheduled_backups.log")).unwrap();
        let lines: Vec<&str> = log.lines().collect();
        assert_eq!(lines.len(), 2);

        let second: RunEntry = serde_json::from_str(lines[1]).unwrap();
        assert!(!second.success);
        assert_eq!(second.details, "dump failed");
    }
}
