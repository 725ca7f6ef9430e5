//! Path management for pgvault
//!
//! All persisted state lives under a single backup directory:
//!
//! - `*.sql` — raw dump files
//! - `{name}_v{version}.sql` — versioned copies
//! - `.metadata/` — backup state and per-backup metadata snapshots
//! - `.versions/` — version catalog documents
//! - `latest_{branch}.sql` — convenience symlink per branch
//!
//! ## Path Resolution Order
//!
//! 1. `PGVAULT_BACKUP_DIR` environment variable (if set)
//! 2. `./backups` relative to the working directory

use std::path::{Path, PathBuf};

use crate::error::{VaultError, VaultResult};

/// Manages all paths used by pgvault
#[derive(Debug, Clone)]
pub struct VaultPaths {
    /// Backup directory holding dump files and metadata subdirectories
    backup_dir: PathBuf,
}

impl VaultPaths {
    /// Create a new VaultPaths instance
    ///
    /// Path resolution:
    /// 1. `PGVAULT_BACKUP_DIR` env var (explicit override)
    /// 2. `./backups` in the current working directory
    pub fn new() -> VaultResult<Self> {
        let backup_dir = if let Ok(custom) = std::env::var("PGVAULT_BACKUP_DIR") {
            PathBuf::from(custom)
        } else {
            PathBuf::from("backups")
        };

        Ok(Self { backup_dir })
    }

    /// Create VaultPaths with a custom backup directory (useful for testing)
    pub fn with_backup_dir(backup_dir: PathBuf) -> Self {
        Self { backup_dir }
    }

    /// Get the backup directory
    pub fn backup_dir(&self) -> &PathBuf {
        &self.backup_dir
    }

    /// Get the metadata directory (`.metadata/`)
    pub fn metadata_dir(&self) -> PathBuf {
        self.backup_dir.join(".metadata")
    }

    /// Get the version catalog directory (`.versions/`)
    pub fn version_dir(&self) -> PathBuf {
        self.backup_dir.join(".versions")
    }

    /// Get the path to the settings file
    pub fn settings_file(&self) -> PathBuf {
        self.backup_dir.join("config.json")
    }

    /// Get the path to the backup state document
    pub fn backup_state_file(&self) -> PathBuf {
        self.metadata_dir().join("backup_state.json")
    }

    /// Get the path to the per-backup metadata snapshot for `name`
    pub fn backup_metadata_file(&self, name: &str) -> PathBuf {
        self.metadata_dir().join(format!("{}.json", name))
    }

    /// Get the path to the last-run status document
    pub fn last_status_file(&self) -> PathBuf {
        self.metadata_dir().join("last_status.json")
    }

    /// Get the path to the version state document
    pub fn version_state_file(&self) -> PathBuf {
        self.version_dir().join("version_state.json")
    }

    /// Get the path to the tags document
    pub fn tags_file(&self) -> PathBuf {
        self.version_dir().join("tags.json")
    }

    /// Get the path to the branches document
    pub fn branches_file(&self) -> PathBuf {
        self.version_dir().join("branches.json")
    }

    /// Get the path to the append-only run log
    pub fn run_log_file(&self) -> PathBuf {
        self.backup_dir.join("scheduled_backups.log")
    }

    /// Get the path to the invocation lock file
    pub fn lock_file(&self) -> PathBuf {
        self.backup_dir.join(".pgvault.lock")
    }

    /// Get the path to a dump file for `filename` inside the backup directory
    pub fn backup_file(&self, filename: &str) -> PathBuf {
        self.backup_dir.join(filename)
    }

    /// Get the path to the `latest_{branch}.sql` symlink for a branch name
    pub fn latest_link(&self, branch: &str) -> PathBuf {
        self.backup_dir.join(format!("latest_{}.sql", branch))
    }

    /// Ensure all required directories exist
    pub fn ensure_directories(&self) -> VaultResult<()> {
        std::fs::create_dir_all(&self.backup_dir)
            .map_err(|e| VaultError::Io(format!("Failed to create backup directory: {}", e)))?;

        std::fs::create_dir_all(self.metadata_dir())
            .map_err(|e| VaultError::Io(format!("Failed to create metadata directory: {}", e)))?;

        std::fs::create_dir_all(self.version_dir())
            .map_err(|e| VaultError::Io(format!("Failed to create version directory: {}", e)))?;

        Ok(())
    }

    /// Check if pgvault has been initialized (settings file exists)
    pub fn is_initialized(&self) -> bool {
        self.settings_file().exists()
    }
}

/// Strip a `.sql` suffix from a filename, if present
pub fn strip_sql_suffix(filename: &str) -> &str {
    filename.strip_suffix(".sql").unwrap_or(filename)
}

/// True if the path looks like a dump file (plain `.sql`)
pub fn is_dump_file(path: &Path) -> bool {
    path.extension().map_or(false, |ext| ext == "sql")
}
