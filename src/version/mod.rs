//! Backup versioning
//!
//! Semantic versions with branch lineage, plus the JSON-backed catalog that
//! tracks versioned backups, tags, branches, and rollback history.

pub mod manager;
pub mod semver;

pub use manager::{
    BackupVersionManager, BranchStore, CleanupReport, RollbackEntry, TagStore, VersionComparison,
    VersionState, VersionedBackupRecord,
};
pub use semver::{IncrementLevel, SemanticVersion, VersionBranch};
