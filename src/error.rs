//! Custom error types for pgvault
//!
//! This module defines the error hierarchy for the application using thiserror
//! for ergonomic error definitions.

use thiserror::Error;

/// The main error type for pgvault operations
#[derive(Error, Debug)]
pub enum VaultError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// File I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(String),

    /// Version string does not match the expected format
    #[error("Invalid version format: {0}")]
    InvalidVersionFormat(String),

    /// A version string referenced a version that is not in the catalog
    #[error("Version not found: {0}")]
    VersionNotFound(String),

    /// Backup name validation errors
    #[error("Invalid backup name: {0}")]
    InvalidBackupName(String),

    /// Entity not found errors
    #[error("{entity_type} not found: {identifier}")]
    NotFound {
        entity_type: &'static str,
        identifier: String,
    },

    /// Duplicate entity errors
    #[error("{entity_type} already exists: {identifier}")]
    Duplicate {
        entity_type: &'static str,
        identifier: String,
    },

    /// Storage errors (persisted JSON documents)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Another invocation holds the vault lock
    #[error("Vault is locked: {0}")]
    Locked(String),

    /// The backup/restore target (container or pod) is unavailable
    #[error("Target error: {0}")]
    Target(String),

    /// A dump/restore subprocess exceeded its time budget
    #[error("Operation timed out after {seconds}s: {operation}")]
    Timeout { operation: String, seconds: u64 },

    /// A dump/restore subprocess exited with a failure
    #[error("Command failed ({exit_code}): {stderr}")]
    CommandFailed { exit_code: i32, stderr: String },
}

impl VaultError {
    /// Create a "not found" error for backups
    pub fn backup_not_found(identifier: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type: "Backup",
            identifier: identifier.into(),
        }
    }

    /// Create a "not found" error for tags
    pub fn tag_not_found(identifier: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type: "Tag",
            identifier: identifier.into(),
        }
    }

    /// Check if this is a "not found" error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. } | Self::VersionNotFound(_))
    }

    /// Check if this is a timeout error
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

// Implement From traits for common error types

impl From<std::io::Error> for VaultError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for VaultError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err.to_string())
    }
}

/// Result type alias for pgvault operations
pub type VaultResult<T> = Result<T, VaultError>;
