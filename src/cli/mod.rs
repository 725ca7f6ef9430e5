//! CLI command handlers
//!
//! Bridges clap argument parsing with the orchestrator and catalog layers.

pub mod backup;
pub mod version;

pub use backup::{handle_backup_command, BackupCommands};
pub use version::{handle_version_command, VersionCommands};
