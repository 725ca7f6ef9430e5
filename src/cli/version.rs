//! Version catalog CLI commands

use std::str::FromStr;

use clap::Subcommand;

use crate::error::VaultResult;
use crate::orchestrator::naming::format_file_size;
use crate::orchestrator::Orchestrator;
use crate::version::{VersionBranch, VersionedBackupRecord};

/// Version catalog subcommands
#[derive(Subcommand)]
pub enum VersionCommands {
    /// List versioned backups, newest first
    List {
        /// Filter by branch (main, develop, staging, hotfix, feature, release, manual)
        #[arg(short, long)]
        branch: Option<String>,

        /// Filter by tag
        #[arg(short, long)]
        tag: Option<String>,

        /// Maximum number of entries to show
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Show details for a single version
    Info {
        /// Version string, e.g. 1.2.3-main.20240604_120000
        version: String,
    },

    /// Tag an existing version
    Tag {
        /// Version string to tag
        version: String,

        /// Tag name
        tag: String,

        /// Tag description
        #[arg(short, long, default_value = "")]
        description: String,
    },

    /// List all tags and the versions they point at
    Tags,

    /// List branches and their backup activity
    Branches,

    /// Compare two versions
    Compare {
        version1: String,
        version2: String,
    },

    /// Point the current version back at an older one
    Rollback {
        /// Target version string
        version: String,
    },

    /// Show rollback history
    History,

    /// Delete old versions beyond a per-branch keep count
    Cleanup {
        /// Versions to keep per branch
        #[arg(short, long)]
        keep: Option<usize>,

        /// Show what would be deleted without deleting anything
        #[arg(long)]
        dry_run: bool,
    },
}

/// Handle a version command
pub fn handle_version_command(
    orchestrator: &Orchestrator,
    default_keep_count: usize,
    cmd: VersionCommands,
) -> VaultResult<()> {
    let versions = orchestrator.versions();

    match cmd {
        VersionCommands::List { branch, tag, limit } => {
            let branch = branch
                .as_deref()
                .map(VersionBranch::from_str)
                .transpose()?;
            let records = versions.list_versions(branch, tag.as_deref(), limit)?;

            if records.is_empty() {
                println!("No versioned backups found.");
                return Ok(());
            }

            println!("Versioned Backups");
            println!("=================");
            for record in &records {
                print_record_line(record);
            }
            println!();
            println!("Total: {} version(s)", records.len());
        }

        VersionCommands::Info { version } => match versions.get_version_info(&version)? {
            Some(record) => {
                println!("Version Details");
                println!("===============");
                println!("Version: {}", record.version);
                println!(
                    "Branch: {} {}",
                    record.branch_info.indicator, record.branch_info.name
                );
                println!("Backup name: {}", record.backup_name);
                println!("Versioned file: {}", record.versioned_filename);
                println!("Original file: {}", record.original_filename);
                match record.created_at {
                    Some(at) => println!("Created: {}", at.format("%Y-%m-%d %H:%M:%S UTC")),
                    None => println!("Created: unknown"),
                }
                match record.file_size {
                    Some(size) => println!("Size: {}", format_file_size(size)),
                    None => println!("Size: not finalized"),
                }
                match &record.file_hash {
                    Some(hash) => println!("SHA-256: {}", hash),
                    None => println!("SHA-256: not finalized"),
                }
                if !record.tags.is_empty() {
                    println!("Tags: {}", record.tags.join(", "));
                }
                if !record.description.is_empty() {
                    println!("Description: {}", record.description);
                }
            }
            None => {
                println!("Version not found: {}", version);
            }
        },

        VersionCommands::Tag {
            version,
            tag,
            description,
        } => {
            versions.create_tag(&version, &tag, &description)?;
            println!("Tagged {} as '{}'", version, tag);
        }

        VersionCommands::Tags => {
            let tags = versions.list_tags()?;
            if tags.is_empty() {
                println!("No tags defined.");
                return Ok(());
            }

            println!("Tags");
            println!("====");
            for (tag, entries) in &tags {
                println!("{}:", tag);
                for entry in entries {
                    println!(
                        "  {} ({})",
                        entry.version,
                        entry.created_at.format("%Y-%m-%d")
                    );
                }
            }
        }

        VersionCommands::Branches => {
            let branches = versions.list_branches()?;

            println!("Branches");
            println!("========");
            for (branch, descriptor) in &branches {
                let last = descriptor
                    .last_backup
                    .map(|at| at.format("%Y-%m-%d %H:%M:%S UTC").to_string())
                    .unwrap_or_else(|| "never".to_string());
                println!(
                    "{} {} — {} backup(s), last: {}",
                    branch.indicator(),
                    branch,
                    descriptor.backup_count,
                    last
                );
            }
        }

        VersionCommands::Compare { version1, version2 } => {
            let comparison = versions.compare_versions(&version1, &version2)?;

            println!("Version Comparison");
            println!("==================");
            for side in [&comparison.version1, &comparison.version2] {
                let marker = if side.newer { " (newer)" } else { "" };
                println!("{}{}", side.version, marker);
            }
            println!();
            println!(
                "Compatible: {}",
                if comparison.compatible { "yes" } else { "no" }
            );
            println!(
                "Same branch: {}",
                if comparison.same_branch { "yes" } else { "no" }
            );
            println!("Size difference: {} bytes", comparison.file_size_diff);
        }

        VersionCommands::Rollback { version } => {
            versions.rollback_to_version(&version, false)?;
            println!("Current version rolled back to {}", version);
            println!("Note: this moves the catalog pointer; restore the matching");
            println!("backup file with: pgvault backup restore <file> --force");
        }

        VersionCommands::History => {
            let history = versions.get_rollback_history()?;
            if history.is_empty() {
                println!("No rollbacks recorded.");
                return Ok(());
            }

            println!("Rollback History");
            println!("================");
            for entry in &history {
                println!(
                    "{} — {} to {}",
                    entry.timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
                    entry.action,
                    entry.target_version
                );
            }
        }

        VersionCommands::Cleanup { keep, dry_run } => {
            let keep_count = keep.unwrap_or(default_keep_count);
            let report = versions.cleanup_old_versions(keep_count, dry_run)?;

            // In a dry run only `deleted_versions` is filled;
            // `deleted_count` stays 0
            if report.deleted_versions.is_empty() {
                println!(
                    "Nothing to clean up; all branches are within {} version(s).",
                    keep_count
                );
                return Ok(());
            }

            let verb = if dry_run { "Would delete" } else { "Deleted" };
            println!("{} {} version(s):", verb, report.deleted_versions.len());
            for version in &report.deleted_versions {
                println!("  {}", version);
            }

            if !report.errors.is_empty() {
                println!();
                println!("Some files could not be removed:");
                for error in &report.errors {
                    println!("  {}", error);
                }
            }
        }
    }

    Ok(())
}

fn print_record_line(record: &VersionedBackupRecord) {
    let created = record
        .created_at
        .map(|at| at.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "unknown".to_string());
    let size = record
        .file_size
        .map(format_file_size)
        .unwrap_or_else(|| "-".to_string());
    let tags = if record.tags.is_empty() {
        String::new()
    } else {
        format!(" [{}]", record.tags.join(", "))
    };

    println!(
        "{} {} ({}, {}){}",
        record.branch_info.indicator, record.version, created, size, tags
    );
}
