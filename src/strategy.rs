//! Backup strategy and retention policies
//!
//! Decides whether the next backup should be full or incremental, classifies
//! backups into retention categories, and prunes excess backups per category.
//!
//! An "incremental" backup here is not a true incremental dump: it is a full
//! pg_dump with a lighter flag set (no `--clean --create`, ownership and
//! privileges stripped). The naming is kept for on-disk compatibility.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Duration, Utc, Weekday};
use serde::{Deserialize, Serialize};

use crate::config::settings::RetentionSettings;
use crate::config::VaultPaths;
use crate::error::{VaultError, VaultResult};
use crate::storage::{read_json, write_json_atomic};

/// A full backup is forced once the last one is older than this
const FULL_BACKUP_MAX_AGE_DAYS: i64 = 7;

/// A full backup is forced once this many incrementals accumulate since the
/// last full one
const MAX_INCREMENTALS_BETWEEN_FULLS: usize = 5;

/// Backup type decided per run
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum BackupType {
    #[default]
    Full,
    Incremental,
}

impl BackupType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Incremental => "incremental",
        }
    }
}

impl fmt::Display for BackupType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackupType {
    type Err = VaultError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "full" => Ok(Self::Full),
            "incremental" => Ok(Self::Incremental),
            _ => Err(VaultError::Config(format!("Unknown backup type: {}", s))),
        }
    }
}

/// Retention bucket assigned to a backup at metadata-creation time
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum RetentionCategory {
    #[default]
    Daily,
    Weekly,
    Monthly,
    Full,
}

impl RetentionCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
            Self::Full => "full",
        }
    }
}

impl fmt::Display for RetentionCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Metadata recorded for every successful dump
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupMetadata {
    pub name: String,
    #[serde(rename = "type")]
    pub backup_type: BackupType,
    pub timestamp: DateTime<Utc>,
    pub file_size: u64,
    /// Wall-clock duration of the dump, in seconds
    pub duration: f64,
    pub retention_category: RetentionCategory,
}

/// Singleton backup-state document (`.metadata/backup_state.json`)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupState {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    #[serde(default)]
    pub last_full_backup: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_incremental_backup: Option<DateTime<Utc>>,
    #[serde(default)]
    pub schema_hash: Option<String>,
    #[serde(default)]
    pub backups: Vec<BackupMetadata>,
}

fn default_schema_version() -> u32 {
    1
}

impl Default for BackupState {
    fn default() -> Self {
        Self {
            schema_version: default_schema_version(),
            last_full_backup: None,
            last_incremental_backup: None,
            schema_hash: None,
            backups: Vec::new(),
        }
    }
}

/// Recommendation for the next backup, with a human-readable justification
#[derive(Debug, Clone)]
pub struct BackupRecommendation {
    pub backup_type: BackupType,
    pub reason: String,
}

/// Result of a retention pass
#[derive(Debug, Clone, Default)]
pub struct RetentionReport {
    /// Per-category count of deleted (or would-delete) backups
    pub deleted_counts: BTreeMap<RetentionCategory, usize>,
    /// Per-item deletion failures; these never abort the pass
    pub errors: Vec<String>,
}

impl RetentionReport {
    pub fn total_deleted(&self) -> usize {
        self.deleted_counts.values().sum()
    }
}

/// Summary of the current retention situation
#[derive(Debug, Clone, Serialize)]
pub struct RetentionSummary {
    pub policies: RetentionSettings,
    pub current_counts: BTreeMap<RetentionCategory, usize>,
    pub total_backups: usize,
    pub total_size_bytes: u64,
    pub total_size_mb: f64,
}

/// Manages backup strategy decisions and retention policies
pub struct BackupStrategy {
    paths: VaultPaths,
    retention: RetentionSettings,
}

impl BackupStrategy {
    /// Create a strategy over the given backup directory and policies
    pub fn new(paths: VaultPaths, retention: RetentionSettings) -> VaultResult<Self> {
        paths.ensure_directories()?;
        Ok(Self { paths, retention })
    }

    /// Current retention policies
    pub fn retention(&self) -> &RetentionSettings {
        &self.retention
    }

    /// Load the backup state document (missing file reads as empty state)
    pub fn load_backup_state(&self) -> VaultResult<BackupState> {
        read_json(self.paths.backup_state_file())
    }

    /// Persist the backup state document
    pub fn save_backup_state(&self, state: &BackupState) -> VaultResult<()> {
        write_json_atomic(self.paths.backup_state_file(), state)
    }

    /// Decide whether the next backup should be full or incremental
    pub fn determine_backup_type(&self, force_full: bool) -> VaultResult<BackupType> {
        self.determine_backup_type_at(force_full, Utc::now())
    }

    /// `determine_backup_type` with an explicit clock (used by tests)
    pub fn determine_backup_type_at(
        &self,
        force_full: bool,
        now: DateTime<Utc>,
    ) -> VaultResult<BackupType> {
        let state = self.load_backup_state()?;
        Ok(decide_backup_type(&state, force_full, now))
    }

    /// pg_dump arguments per backup type
    pub fn get_backup_command_args(&self, backup_type: BackupType) -> &'static [&'static str] {
        match backup_type {
            // Full backup with schema and data
            BackupType::Full => &["--clean", "--create", "--verbose"],
            // Lighter dump, no ownership or privilege statements
            BackupType::Incremental => &["--verbose", "--no-owner", "--no-privileges"],
        }
    }

    /// Build metadata for a completed backup and persist the individual
    /// per-backup snapshot
    pub fn create_backup_metadata(
        &self,
        backup_name: &str,
        backup_type: BackupType,
        file_size: u64,
        duration: f64,
    ) -> VaultResult<BackupMetadata> {
        self.create_backup_metadata_at(backup_name, backup_type, file_size, duration, Utc::now())
    }

    /// `create_backup_metadata` with an explicit clock (used by tests)
    pub fn create_backup_metadata_at(
        &self,
        backup_name: &str,
        backup_type: BackupType,
        file_size: u64,
        duration: f64,
        now: DateTime<Utc>,
    ) -> VaultResult<BackupMetadata> {
        let metadata = BackupMetadata {
            name: backup_name.to_string(),
            backup_type,
            timestamp: now,
            file_size,
            duration,
            retention_category: retention_category_at(backup_type, now),
        };

        write_json_atomic(self.paths.backup_metadata_file(backup_name), &metadata)?;

        Ok(metadata)
    }

    /// Fold a completed backup into the state document
    pub fn update_backup_state(&self, metadata: &BackupMetadata) -> VaultResult<()> {
        let mut state = self.load_backup_state()?;

        match metadata.backup_type {
            BackupType::Full => state.last_full_backup = Some(metadata.timestamp),
            BackupType::Incremental => state.last_incremental_backup = Some(metadata.timestamp),
        }

        state.backups.push(metadata.clone());
        self.save_backup_state(&state)
    }

    /// Delete backups beyond each category's retention count
    ///
    /// Within each category backups are kept newest-first; deletion is
    /// best-effort and a failed file removal never aborts the pass.
    pub fn apply_retention_policy(&self, dry_run: bool) -> VaultResult<RetentionReport> {
        let mut state = self.load_backup_state()?;

        let mut by_category: BTreeMap<RetentionCategory, Vec<BackupMetadata>> = BTreeMap::new();
        for backup in &state.backups {
            by_category
                .entry(backup.retention_category)
                .or_default()
                .push(backup.clone());
        }

        let mut report = RetentionReport::default();

        for (category, mut backups) in by_category {
            let max_count = policy_count(&self.retention, category);
            backups.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

            let to_delete: Vec<BackupMetadata> = backups.split_off(max_count.min(backups.len()));
            report.deleted_counts.insert(category, to_delete.len());

            if dry_run {
                continue;
            }

            for backup in to_delete {
                if let Err(e) = self.delete_backup_files(&backup.name) {
                    report
                        .errors
                        .push(format!("Failed to delete {}: {}", backup.name, e));
                }
                state.backups.retain(|b| b.name != backup.name);
            }
        }

        if !dry_run {
            self.save_backup_state(&state)?;
        }

        Ok(report)
    }

    /// Remove a backup's dump file and its metadata snapshot
    fn delete_backup_files(&self, backup_name: &str) -> VaultResult<()> {
        let backup_file = self.paths.backup_file(&format!("{}.sql", backup_name));
        if backup_file.exists() {
            std::fs::remove_file(&backup_file)
                .map_err(|e| VaultError::Io(format!("{}: {}", backup_file.display(), e)))?;
        }

        let metadata_file = self.paths.backup_metadata_file(backup_name);
        if metadata_file.exists() {
            std::fs::remove_file(&metadata_file)
                .map_err(|e| VaultError::Io(format!("{}: {}", metadata_file.display(), e)))?;
        }

        Ok(())
    }

    /// Recommend the next backup type with a justification
    pub fn get_next_backup_recommendation(&self) -> VaultResult<BackupRecommendation> {
        self.get_next_backup_recommendation_at(Utc::now())
    }

    /// `get_next_backup_recommendation` with an explicit clock (used by tests)
    pub fn get_next_backup_recommendation_at(
        &self,
        now: DateTime<Utc>,
    ) -> VaultResult<BackupRecommendation> {
        let state = self.load_backup_state()?;
        let backup_type = decide_backup_type(&state, false, now);

        let reason = if backup_type == BackupType::Full {
            match state.last_full_backup {
                None => "No prior full backup exists".to_string(),
                Some(last_full) => {
                    let days_since = (now - last_full).num_days();
                    if days_since >= FULL_BACKUP_MAX_AGE_DAYS {
                        format!("Last full backup was {} days ago", days_since)
                    } else {
                        format!(
                            "Too many incremental backups ({})",
                            incrementals_since(&state, last_full)
                        )
                    }
                }
            }
        } else {
            "Incremental backup recommended".to_string()
        };

        Ok(BackupRecommendation {
            backup_type,
            reason,
        })
    }

    /// Backups grouped by type, newest first within each group
    pub fn list_backups_by_type(&self) -> VaultResult<BTreeMap<BackupType, Vec<BackupMetadata>>> {
        let state = self.load_backup_state()?;

        let mut result: BTreeMap<BackupType, Vec<BackupMetadata>> = BTreeMap::new();
        result.insert(BackupType::Full, Vec::new());
        result.insert(BackupType::Incremental, Vec::new());

        for backup in state.backups {
            result.entry(backup.backup_type).or_default().push(backup);
        }

        for backups in result.values_mut() {
            backups.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        }

        Ok(result)
    }

    /// Summary of policies, per-category counts, and total space used
    pub fn get_retention_summary(&self) -> VaultResult<RetentionSummary> {
        let state = self.load_backup_state()?;

        let mut current_counts: BTreeMap<RetentionCategory, usize> = BTreeMap::new();
        for backup in &state.backups {
            *current_counts.entry(backup.retention_category).or_default() += 1;
        }

        let total_size_bytes: u64 = state.backups.iter().map(|b| b.file_size).sum();

        Ok(RetentionSummary {
            policies: self.retention.clone(),
            current_counts,
            total_backups: state.backups.len(),
            total_size_bytes,
            total_size_mb: (total_size_bytes as f64 / (1024.0 * 1024.0) * 100.0).round() / 100.0,
        })
    }
}

/// Backup-type decision: a pure function of state and the clock
///
/// Rule order: forced, no prior full, full older than 7 days, five or more
/// incrementals since the last full, otherwise incremental.
pub fn decide_backup_type(state: &BackupState, force_full: bool, now: DateTime<Utc>) -> BackupType {
    if force_full {
        return BackupType::Full;
    }

    let last_full = match state.last_full_backup {
        Some(ts) => ts,
        None => return BackupType::Full,
    };

    if now - last_full > Duration::days(FULL_BACKUP_MAX_AGE_DAYS) {
        return BackupType::Full;
    }

    if incrementals_since(state, last_full) >= MAX_INCREMENTALS_BETWEEN_FULLS {
        return BackupType::Full;
    }

    BackupType::Incremental
}

fn incrementals_since(state: &BackupState, last_full: DateTime<Utc>) -> usize {
    state
        .backups
        .iter()
        .filter(|b| b.backup_type == BackupType::Incremental && b.timestamp > last_full)
        .count()
}

/// Retention category for a backup created at `now`
///
/// Evaluated at metadata-creation time, not the backup's logical date.
pub fn retention_category_at(backup_type: BackupType, now: DateTime<Utc>) -> RetentionCategory {
    if backup_type == BackupType::Full {
        RetentionCategory::Full
    } else if now.weekday() == Weekday::Sun {
        RetentionCategory::Weekly
    } else if now.day() == 1 {
        RetentionCategory::Monthly
    } else {
        RetentionCategory::Daily
    }
}

fn policy_count(retention: &RetentionSettings, category: RetentionCategory) -> usize {
    match category {
        RetentionCategory::Daily => retention.daily,
        RetentionCategory::Weekly => retention.weekly,
        RetentionCategory::Monthly => retention.monthly,
        RetentionCategory::Full => retention.full,
    }
}
