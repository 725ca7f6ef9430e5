//! Backup CLI commands
//!
//! Implements CLI commands for backup creation, listing, restore, and
//! retention maintenance.

use std::path::PathBuf;
use std::str::FromStr;

use clap::Subcommand;

use crate::config::VaultPaths;
use crate::error::{VaultError, VaultResult};
use crate::orchestrator::naming::{format_duration, format_file_size};
use crate::orchestrator::{BackupOptions, Orchestrator};
use crate::strategy::BackupType;

/// Backup subcommands
#[derive(Subcommand)]
pub enum BackupCommands {
    /// Create a new backup
    Create {
        /// Backup name (a timestamped default is used when omitted)
        #[arg(short, long)]
        name: Option<String>,

        /// Backup type: auto, full, or incremental
        #[arg(short = 't', long, default_value = "auto")]
        backup_type: String,

        /// Force a full backup regardless of strategy
        #[arg(long)]
        force_full: bool,

        /// Overwrite an existing backup with the same name
        #[arg(long)]
        force_overwrite: bool,

        /// Tags to attach to the catalog entry (repeatable)
        #[arg(long)]
        tag: Vec<String>,

        /// Description for the catalog entry
        #[arg(short, long, default_value = "")]
        description: String,
    },

    /// List recorded backups grouped by type
    List {
        /// Show detailed information
        #[arg(short, long)]
        verbose: bool,
    },

    /// Restore the database from a backup file
    Restore {
        /// Backup filename or path
        backup: String,

        /// Skip confirmation prompt
        #[arg(short, long)]
        force: bool,
    },

    /// Delete old backups according to retention policy
    Prune {
        /// Show what would be deleted without deleting anything
        #[arg(long)]
        dry_run: bool,
    },

    /// Show the recommended type for the next backup
    Recommend,

    /// Show retention policies and current backup counts
    Summary,
}

/// Handle a backup command
pub fn handle_backup_command(
    paths: &VaultPaths,
    orchestrator: &Orchestrator,
    cmd: BackupCommands,
) -> VaultResult<()> {
    match cmd {
        BackupCommands::Create {
            name,
            backup_type,
            force_full,
            force_overwrite,
            tag,
            description,
        } => {
            let explicit_type = match backup_type.as_str() {
                "auto" => None,
                other => Some(BackupType::from_str(other)?),
            };

            let opts = BackupOptions {
                name,
                backup_type: explicit_type,
                force_full,
                force_overwrite,
                tags: tag,
                description,
            };

            println!("Creating backup...");
            let report = orchestrator.create_backup(&opts)?;

            if report.name_modified {
                println!(
                    "WARNING: backup name modified to avoid conflict: {}",
                    report.filename
                );
            }

            println!("Backup created: {}", report.filename);
            println!("Type: {}", report.backup_type);
            println!("Version: {}", report.version);
            println!("Size: {}", format_file_size(report.file_size));
            println!("Duration: {}", format_duration(report.duration_secs));
            println!(
                "Location: {}",
                paths.backup_file(&report.filename).display()
            );
        }

        BackupCommands::List { verbose } => {
            let by_type = orchestrator.strategy().list_backups_by_type()?;
            let total: usize = by_type.values().map(Vec::len).sum();

            if total == 0 {
                println!("No backups found.");
                println!("Create one with: pgvault backup create");
                return Ok(());
            }

            println!("Recorded Backups");
            println!("================");

            for (backup_type, backups) in &by_type {
                if backups.is_empty() {
                    continue;
                }
                println!();
                println!("{} backups:", backup_type);
                for (i, backup) in backups.iter().enumerate() {
                    if verbose {
                        println!(
                            "{}. {}\n   Created: {}\n   Size: {}\n   Duration: {}\n   Retention: {}",
                            i + 1,
                            backup.name,
                            backup.timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
                            format_file_size(backup.file_size),
                            format_duration(backup.duration),
                            backup.retention_category,
                        );
                    } else {
                        println!(
                            "  {}. {} ({}, {})",
                            i + 1,
                            backup.name,
                            backup.timestamp.format("%Y-%m-%d"),
                            format_file_size(backup.file_size),
                        );
                    }
                }
            }

            println!();
            println!("Total: {} backup(s)", total);
        }

        BackupCommands::Restore { backup, force } => {
            let backup_path = resolve_backup_path(paths, &backup)?;

            println!("Restore Source");
            println!("==============");
            println!("File: {}", backup_path.display());
            let metadata = std::fs::metadata(&backup_path)
                .map_err(|e| VaultError::Io(format!("Failed to stat backup file: {}", e)))?;
            println!("Size: {}", format_file_size(metadata.len()));
            println!();

            if !force {
                println!("WARNING: This will overwrite the target database!");
                println!("To proceed, run again with --force flag:");
                println!("  pgvault backup restore {} --force", backup);
                return Ok(());
            }

            println!("Restoring database...");
            orchestrator.restore_database(&backup_path, true)?;
            println!("Restore complete!");
        }

        BackupCommands::Prune { dry_run } => {
            let report = orchestrator.strategy().apply_retention_policy(dry_run)?;

            if report.total_deleted() == 0 {
                println!("Nothing to prune; all backups are within retention limits.");
                return Ok(());
            }

            let verb = if dry_run { "Would delete" } else { "Deleted" };
            for (category, count) in &report.deleted_counts {
                if *count > 0 {
                    println!("{} {} {} backup(s)", verb, count, category);
                }
            }
            println!("Total: {}", report.total_deleted());

            if !report.errors.is_empty() {
                println!();
                println!("Some files could not be removed:");
                for error in &report.errors {
                    println!("  {}", error);
                }
            }
        }

        BackupCommands::Recommend => {
            let recommendation = orchestrator.strategy().get_next_backup_recommendation()?;
            println!("Recommended type: {}", recommendation.backup_type);
            println!("Reason: {}", recommendation.reason);
        }

        BackupCommands::Summary => {
            let summary = orchestrator.strategy().get_retention_summary()?;

            println!("Retention Summary");
            println!("=================");
            println!("Policies:");
            println!("  Daily:   keep {}", summary.policies.daily);
            println!("  Weekly:  keep {}", summary.policies.weekly);
            println!("  Monthly: keep {}", summary.policies.monthly);
            println!("  Full:    keep {}", summary.policies.full);
            println!();
            println!("Current counts:");
            for (category, count) in &summary.current_counts {
                println!("  {}: {}", category, count);
            }
            println!();
            println!("Total backups: {}", summary.total_backups);
            println!(
                "Total size: {} ({:.2} MB)",
                format_file_size(summary.total_size_bytes),
                summary.total_size_mb
            );
        }
    }

    Ok(())
}

/// Resolve a backup argument to a file path
///
/// Accepts an absolute/relative path to an existing file, a filename inside
/// the backup directory, or a bare name without the `.sql` suffix.
fn resolve_backup_path(paths: &VaultPaths, backup: &str) -> VaultResult<PathBuf> {
    let direct = PathBuf::from(backup);
    if direct.is_file() {
        return Ok(direct);
    }

    let in_dir = paths.backup_file(backup);
    if in_dir.is_file() {
        return Ok(in_dir);
    }

    let with_suffix = paths.backup_file(&format!("{}.sql", backup));
    if with_suffix.is_file() {
        return Ok(with_suffix);
    }

    Err(VaultError::backup_not_found(backup))
}
