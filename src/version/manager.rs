//! Versioned backup catalog
//!
//! Owns the three version-control documents under `.versions/`:
//! `version_state.json` (current version, per-branch latest pointers, the
//! catalog of versioned backups, rollback history), `tags.json`, and
//! `branches.json`. Documents are lazily seeded with defaults on first use.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use sha2::{Digest, Sha256};

use crate::config::VaultPaths;
use crate::error::{VaultError, VaultResult};
use crate::storage::{read_json_required, write_json_atomic};
use crate::strategy::BackupType;
use crate::version::semver::{IncrementLevel, SemanticVersion, VersionBranch};

/// Seed version written when the catalog is first initialized
const SEED_VERSION: &str = "1.0.0-main.20241201_000000";

/// Chunk size for hashing backup files
const HASH_CHUNK_SIZE: usize = 8192;

/// Branch name and display indicator snapshot stored alongside each record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchInfo {
    pub name: String,
    pub indicator: String,
}

impl From<VersionBranch> for BranchInfo {
    fn from(branch: VersionBranch) -> Self {
        Self {
            name: branch.as_str().to_string(),
            indicator: branch.indicator().to_string(),
        }
    }
}

/// One entry in the version catalog
///
/// Created with `file_hash`/`file_size` unset at version-assignment time and
/// finalized once the dump file exists on disk. `file_hash` is
/// content-addressed and never changes once set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionedBackupRecord {
    pub version: SemanticVersion,
    pub backup_name: String,
    pub versioned_filename: String,
    pub original_filename: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub description: String,
    /// Missing or unparsable timestamps become `None` and sort as the oldest
    /// possible instant
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub file_hash: Option<String>,
    #[serde(default)]
    pub file_size: Option<u64>,
    #[serde(default)]
    pub backup_type: BackupType,
    pub branch_info: BranchInfo,
}

impl VersionedBackupRecord {
    /// Sort instant for newest-first ordering; malformed records push to the
    /// end rather than crashing the sort
    fn sort_instant(&self) -> DateTime<Utc> {
        self.created_at.unwrap_or(DateTime::<Utc>::MIN_UTC)
    }
}

/// Rollback history entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollbackEntry {
    pub action: String,
    pub target_version: String,
    pub timestamp: DateTime<Utc>,
    pub created_backup: bool,
}

/// Singleton version-state document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionState {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub current_version: String,
    pub latest_versions_by_branch: BTreeMap<VersionBranch, Option<String>>,
    #[serde(default)]
    pub versioned_backups: Vec<VersionedBackupRecord>,
    #[serde(default)]
    pub rollback_history: Vec<RollbackEntry>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn default_schema_version() -> u32 {
    1
}

impl VersionState {
    fn seed(now: DateTime<Utc>) -> Self {
        let mut latest: BTreeMap<VersionBranch, Option<String>> = BTreeMap::new();
        for branch in VersionBranch::ALL {
            latest.insert(branch, None);
        }
        latest.insert(VersionBranch::Main, Some(SEED_VERSION.to_string()));

        Self {
            schema_version: default_schema_version(),
            current_version: SEED_VERSION.to_string(),
            latest_versions_by_branch: latest,
            versioned_backups: Vec::new(),
            rollback_history: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Per-branch descriptor in the branches document
///
/// `backup_count` is a historical counter: it grows as versions are created
/// on the branch and is never decremented by cleanup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BranchDescriptor {
    pub created_at: DateTime<Utc>,
    pub description: String,
    #[serde(default)]
    pub backup_count: u64,
    #[serde(default)]
    pub last_backup: Option<DateTime<Utc>>,
}

/// One tagged version within a tag
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TagEntry {
    pub version: String,
    #[serde(default)]
    pub description: String,
    pub created_at: DateTime<Utc>,
}

/// `tags.json`: tag name to tagged versions, in tagging order
pub type TagStore = BTreeMap<String, Vec<TagEntry>>;

/// `branches.json`: branch to descriptor
pub type BranchStore = BTreeMap<VersionBranch, BranchDescriptor>;

/// Result of comparing two versions
#[derive(Debug, Clone, Serialize)]
pub struct VersionComparison {
    pub version1: ComparedVersion,
    pub version2: ComparedVersion,
    pub compatible: bool,
    pub same_branch: bool,
    /// `size1 - size2`; missing sizes count as 0
    pub file_size_diff: i64,
}

/// One side of a version comparison
#[derive(Debug, Clone, Serialize)]
pub struct ComparedVersion {
    pub version: String,
    pub newer: bool,
    pub info: Option<VersionedBackupRecord>,
}

/// Result of a cleanup pass
#[derive(Debug, Clone, Default)]
pub struct CleanupReport {
    pub deleted_count: usize,
    pub deleted_versions: Vec<String>,
    pub errors: Vec<String>,
}

/// Manages the versioned-backup catalog
pub struct BackupVersionManager {
    paths: VaultPaths,
}

impl BackupVersionManager {
    /// Create a manager, seeding the catalog documents if they don't exist
    pub fn new(paths: VaultPaths) -> VaultResult<Self> {
        let manager = Self { paths };
        manager.initialize_version_system(Utc::now())?;
        Ok(manager)
    }

    fn initialize_version_system(&self, now: DateTime<Utc>) -> VaultResult<()> {
        self.paths.ensure_directories()?;

        if !self.paths.version_state_file().exists() {
            self.save_version_state(VersionState::seed(now), now)?;
        }

        if !self.paths.tags_file().exists() {
            write_json_atomic(self.paths.tags_file(), &TagStore::new())?;
        }

        if !self.paths.branches_file().exists() {
            let mut branches = BranchStore::new();
            for branch in VersionBranch::ALL {
                branches.insert(
                    branch,
                    BranchDescriptor {
                        created_at: now,
                        description: format!("{} branch", branch),
                        backup_count: 0,
                        last_backup: None,
                    },
                );
            }
            write_json_atomic(self.paths.branches_file(), &branches)?;
        }

        Ok(())
    }

    /// Load the version state document
    pub fn load_version_state(&self) -> VaultResult<VersionState> {
        read_json_required(self.paths.version_state_file())
    }

    fn save_version_state(&self, mut state: VersionState, now: DateTime<Utc>) -> VaultResult<()> {
        state.updated_at = now;
        write_json_atomic(self.paths.version_state_file(), &state)
    }

    /// Create a new versioned backup entry and return the version plus the
    /// filename the dump bytes should be written to
    ///
    /// When `version` is not supplied, the current version is incremented at
    /// `auto_increment` level (or a fresh default is constructed if there is
    /// no current version).
    pub fn create_versioned_backup(
        &self,
        backup_name: &str,
        version: Option<SemanticVersion>,
        tags: &[String],
        description: &str,
        auto_increment: IncrementLevel,
    ) -> VaultResult<(SemanticVersion, String)> {
        self.create_versioned_backup_at(
            backup_name,
            version,
            tags,
            description,
            auto_increment,
            Utc::now(),
        )
    }

    /// `create_versioned_backup` with an explicit clock (used by tests)
    pub fn create_versioned_backup_at(
        &self,
        backup_name: &str,
        version: Option<SemanticVersion>,
        tags: &[String],
        description: &str,
        auto_increment: IncrementLevel,
        now: DateTime<Utc>,
    ) -> VaultResult<(SemanticVersion, String)> {
        let mut state = self.load_version_state()?;

        let version = match version {
            Some(v) => v,
            None => {
                if state.current_version.is_empty() {
                    SemanticVersion::new_at(now)
                } else {
                    SemanticVersion::parse(&state.current_version)?
                        .increment_at(auto_increment, now)
                }
            }
        };

        let versioned_filename = format!("{}_v{}.sql", backup_name, version);

        // versioned_filename is unique within the catalog
        if state
            .versioned_backups
            .iter()
            .any(|r| r.versioned_filename == versioned_filename)
        {
            return Err(VaultError::Duplicate {
                entity_type: "Versioned backup",
                identifier: versioned_filename,
            });
        }

        let record = VersionedBackupRecord {
            version: version.clone(),
            backup_name: backup_name.to_string(),
            versioned_filename: versioned_filename.clone(),
            original_filename: format!("{}.sql", backup_name),
            tags: tags.to_vec(),
            description: description.to_string(),
            created_at: Some(now),
            file_hash: None,
            file_size: None,
            backup_type: BackupType::Full,
            branch_info: BranchInfo::from(version.branch),
        };

        state.current_version = version.to_string();
        state
            .latest_versions_by_branch
            .insert(version.branch, Some(version.to_string()));
        state.versioned_backups.push(record);

        self.save_version_state(state, now)?;
        self.update_branch_info(version.branch, now)?;

        if !tags.is_empty() {
            self.add_tags_to_version(&version, tags, now)?;
        }

        Ok((version, versioned_filename))
    }

    /// Finalize a versioned backup by recording its hash and size
    ///
    /// Also refreshes the best-effort `latest_{branch}.sql` symlink.
    pub fn finalize_versioned_backup(
        &self,
        version: &SemanticVersion,
        backup_path: &Path,
    ) -> VaultResult<()> {
        if !backup_path.exists() {
            return Err(VaultError::backup_not_found(backup_path.display().to_string()));
        }

        let file_hash = calculate_file_hash(backup_path)?;
        let file_size = std::fs::metadata(backup_path)
            .map_err(|e| VaultError::Io(format!("Failed to stat backup file: {}", e)))?
            .len();

        let version_string = version.to_string();
        let mut state = self.load_version_state()?;
        let record = state
            .versioned_backups
            .iter_mut()
            .find(|r| r.version.to_string() == version_string)
            .ok_or(VaultError::VersionNotFound(version_string))?;

        record.file_hash = Some(file_hash);
        record.file_size = Some(file_size);
        self.save_version_state(state, Utc::now())?;

        // Convenience pointer only, not authoritative
        self.refresh_latest_link(version.branch, backup_path);

        Ok(())
    }

    #[cfg(unix)]
    fn refresh_latest_link(&self, branch: VersionBranch, backup_path: &Path) {
        let link = self.paths.latest_link(branch.as_str());
        let _ = std::fs::remove_file(&link);
        if let Some(name) = backup_path.file_name() {
            let _ = std::os::unix::fs::symlink(name, &link);
        }
    }

    #[cfg(not(unix))]
    fn refresh_latest_link(&self, _branch: VersionBranch, _backup_path: &Path) {}

    fn update_branch_info(&self, branch: VersionBranch, now: DateTime<Utc>) -> VaultResult<()> {
        let mut branches: BranchStore = read_json_required(self.paths.branches_file())?;

        let descriptor = branches.entry(branch).or_insert_with(|| BranchDescriptor {
            created_at: now,
            description: format!("{} branch", branch),
            backup_count: 0,
            last_backup: None,
        });

        descriptor.backup_count += 1;
        descriptor.last_backup = Some(now);

        write_json_atomic(self.paths.branches_file(), &branches)
    }

    fn add_tags_to_version(
        &self,
        version: &SemanticVersion,
        tags: &[String],
        now: DateTime<Utc>,
    ) -> VaultResult<()> {
        let mut tag_store: TagStore = read_json_required(self.paths.tags_file())?;
        let version_string = version.to_string();

        for tag in tags {
            let entries = tag_store.entry(tag.clone()).or_default();
            if !entries.iter().any(|e| e.version == version_string) {
                entries.push(TagEntry {
                    version: version_string.clone(),
                    description: String::new(),
                    created_at: now,
                });
            }
        }

        write_json_atomic(self.paths.tags_file(), &tag_store)
    }

    /// List catalog entries, optionally filtered by branch and/or tag,
    /// newest first, truncated to `limit`
    pub fn list_versions(
        &self,
        branch: Option<VersionBranch>,
        tag: Option<&str>,
        limit: Option<usize>,
    ) -> VaultResult<Vec<VersionedBackupRecord>> {
        let state = self.load_version_state()?;
        let mut records: Vec<VersionedBackupRecord> = state
            .versioned_backups
            .into_iter()
            .filter(|r| branch.map_or(true, |b| r.version.branch == b))
            .filter(|r| tag.map_or(true, |t| r.tags.iter().any(|rt| rt == t)))
            .collect();

        records.sort_by(|a, b| b.sort_instant().cmp(&a.sort_instant()));

        if let Some(limit) = limit {
            records.truncate(limit);
        }

        Ok(records)
    }

    /// Look up a catalog entry by exact version string
    pub fn get_version_info(
        &self,
        version_string: &str,
    ) -> VaultResult<Option<VersionedBackupRecord>> {
        let state = self.load_version_state()?;
        Ok(state
            .versioned_backups
            .into_iter()
            .find(|r| r.version.to_string() == version_string))
    }

    /// Tag an existing version; duplicate (tag, version) pairs are skipped
    pub fn create_tag(
        &self,
        version_string: &str,
        tag_name: &str,
        description: &str,
    ) -> VaultResult<()> {
        if self.get_version_info(version_string)?.is_none() {
            return Err(VaultError::VersionNotFound(version_string.to_string()));
        }

        let mut tag_store: TagStore = read_json_required(self.paths.tags_file())?;
        let entries = tag_store.entry(tag_name.to_string()).or_default();

        if entries.iter().any(|e| e.version == version_string) {
            return Ok(());
        }

        entries.push(TagEntry {
            version: version_string.to_string(),
            description: description.to_string(),
            created_at: Utc::now(),
        });

        write_json_atomic(self.paths.tags_file(), &tag_store)
    }

    /// All tags and their tagged versions
    pub fn list_tags(&self) -> VaultResult<TagStore> {
        read_json_required(self.paths.tags_file())
    }

    /// All branch descriptors
    pub fn list_branches(&self) -> VaultResult<BranchStore> {
        read_json_required(self.paths.branches_file())
    }

    /// Latest version created on a branch, if any
    pub fn get_latest_version(&self, branch: VersionBranch) -> VaultResult<Option<SemanticVersion>> {
        let state = self.load_version_state()?;
        match state.latest_versions_by_branch.get(&branch) {
            Some(Some(version_string)) => SemanticVersion::parse(version_string).map(Some),
            _ => Ok(None),
        }
    }

    /// Compare two version strings
    pub fn compare_versions(
        &self,
        version1_str: &str,
        version2_str: &str,
    ) -> VaultResult<VersionComparison> {
        let v1 = SemanticVersion::parse(version1_str)?;
        let v2 = SemanticVersion::parse(version2_str)?;

        let info1 = self.get_version_info(version1_str)?;
        let info2 = self.get_version_info(version2_str)?;

        let size1 = info1.as_ref().and_then(|i| i.file_size).unwrap_or(0) as i64;
        let size2 = info2.as_ref().and_then(|i| i.file_size).unwrap_or(0) as i64;

        Ok(VersionComparison {
            compatible: v1.is_compatible(&v2),
            same_branch: v1.branch == v2.branch,
            file_size_diff: size1 - size2,
            version1: ComparedVersion {
                version: v1.to_string(),
                newer: v1.is_newer_than(&v2),
                info: info1,
            },
            version2: ComparedVersion {
                version: v2.to_string(),
                newer: v2.is_newer_than(&v1),
                info: info2,
            },
        })
    }

    /// Roll the logical current-version pointer back to a prior version
    ///
    /// This mutates the pointer and appends a history entry only; restoring
    /// the dump bytes into the live database is the orchestrator's separate
    /// restore operation.
    pub fn rollback_to_version(
        &self,
        target_version_str: &str,
        create_backup: bool,
    ) -> VaultResult<()> {
        let target_info = self
            .get_version_info(target_version_str)?
            .ok_or_else(|| VaultError::VersionNotFound(target_version_str.to_string()))?;

        let versioned_file = self.paths.backup_file(&target_info.versioned_filename);
        if !versioned_file.exists() {
            return Err(VaultError::backup_not_found(
                versioned_file.display().to_string(),
            ));
        }

        let now = Utc::now();
        let mut state = self.load_version_state()?;
        state.current_version = target_version_str.to_string();
        state.rollback_history.push(RollbackEntry {
            action: "rollback".to_string(),
            target_version: target_version_str.to_string(),
            timestamp: now,
            created_backup: create_backup,
        });

        self.save_version_state(state, now)
    }

    /// Rollback history, oldest first
    pub fn get_rollback_history(&self) -> VaultResult<Vec<RollbackEntry>> {
        Ok(self.load_version_state()?.rollback_history)
    }

    /// Delete versions beyond the newest `keep_count` per branch
    ///
    /// Per-entry deletion failures are collected into the report and never
    /// abort the pass. With `dry_run` only the would-delete list is filled.
    pub fn cleanup_old_versions(
        &self,
        keep_count: usize,
        dry_run: bool,
    ) -> VaultResult<CleanupReport> {
        let mut state = self.load_version_state()?;

        let mut by_branch: BTreeMap<VersionBranch, Vec<VersionedBackupRecord>> = BTreeMap::new();
        for record in &state.versioned_backups {
            by_branch
                .entry(record.version.branch)
                .or_default()
                .push(record.clone());
        }

        let mut report = CleanupReport::default();

        for (_, mut branch_records) in by_branch {
            branch_records.sort_by(|a, b| b.sort_instant().cmp(&a.sort_instant()));

            for record in branch_records.into_iter().skip(keep_count) {
                let version_string = record.version.to_string();

                if dry_run {
                    report.deleted_versions.push(version_string);
                    continue;
                }

                let versioned_file = self.paths.backup_file(&record.versioned_filename);
                if versioned_file.exists() {
                    if let Err(e) = std::fs::remove_file(&versioned_file) {
                        report
                            .errors
                            .push(format!("Failed to delete {}: {}", version_string, e));
                        continue;
                    }
                }

                state
                    .versioned_backups
                    .retain(|r| r.version.to_string() != version_string);
                report.deleted_count += 1;
                report.deleted_versions.push(version_string);
            }
        }

        if !dry_run {
            self.save_version_state(state, Utc::now())?;
        }

        Ok(report)
    }
}

/// SHA-256 over the file in fixed-size chunks
fn calculate_file_hash(path: &Path) -> VaultResult<String> {
    let mut file = File::open(path)
        .map_err(|e| VaultError::Io(format!("Failed to open {}: {}", path.display(), e)))?;

    let mut hasher = Sha256::new();
    let mut buffer = [0u8; HASH_CHUNK_SIZE];

    loop {
        let read = file
            .read(&mut buffer)
            .map_err(|e| VaultError::Io(format!("Failed to read {}: {}", path.display(), e)))?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

/// Deserialize a timestamp, tolerating missing, null, or malformed values
fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.and_then(|s| parse_lenient_timestamp(&s)))
}

fn parse_lenient_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    // Naive ISO timestamps from older catalogs
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| DateTime::from_naive_utc_and_offset(naive, Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::fs;
    use tempfile::TempDir;

    fn create_test_manager() -> (BackupVersionManager, VaultPaths, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let paths = VaultPaths::with_backup_dir(temp_dir.path().to_path_buf());
        let manager = BackupVersionManager::new(paths.clone()).unwrap();
        (manager, paths, temp_dir)
    }

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, day, hour, 0, 0).unwrap()
    }

    #[test]
    fn test_initializes_seed_state() {
        let (manager, paths, _temp) = create_test_manager();

        assert!(paths.version_state_file().exists());
        assert!(paths.tags_file().exists());
        assert!(paths.branches_file().exists());

        let state = manager.load_version_state().unwrap();
        assert_eq!(state.current_version, SEED_VERSION);
        assert_eq!(
            state.latest_versions_by_branch[&VersionBranch::Main],
            Some(SEED_VERSION.to_string())
        );
        assert_eq!(state.latest_versions_by_branch[&VersionBranch::Develop], None);
        assert!(state.versioned_backups.is_empty());

        let branches = manager.list_branches().unwrap();
        assert_eq!(branches.len(), 7);
        assert_eq!(branches[&VersionBranch::Main].backup_count, 0);
    }

    #[test]
    fn test_create_versioned_backup_auto_increments() {
        let (manager, _paths, _temp) = create_test_manager();

        let (version, filename) = manager
            .create_versioned_backup_at("nightly", None, &[], "", IncrementLevel::Patch, at(1, 0))
            .unwrap();

        assert_eq!((version.major, version.minor, version.patch), (1, 0, 1));
        assert_eq!(filename, format!("nightly_v{}.sql", version));

        let state = manager.load_version_state().unwrap();
        assert_eq!(state.current_version, version.to_string());
        assert_eq!(state.versioned_backups.len(), 1);

        let record = &state.versioned_backups[0];
        assert_eq!(record.original_filename, "nightly.sql");
        assert!(record.file_hash.is_none());
        assert!(record.file_size.is_none());
        assert_eq!(record.branch_info.indicator, "[M]");
    }

    #[test]
    fn test_create_updates_branch_descriptor() {
        let (manager, _paths, _temp) = create_test_manager();

        let explicit = SemanticVersion::parse("2.0.0-develop.20240601_000000").unwrap();
        manager
            .create_versioned_backup_at("dev", Some(explicit), &[], "", IncrementLevel::Patch, at(1, 0))
            .unwrap();

        let branches = manager.list_branches().unwrap();
        assert_eq!(branches[&VersionBranch::Develop].backup_count, 1);
        assert!(branches[&VersionBranch::Develop].last_backup.is_some());

        let state = manager.load_version_state().unwrap();
        assert_eq!(
            state.latest_versions_by_branch[&VersionBranch::Develop],
            Some("2.0.0-develop.20240601_000000".to_string())
        );
    }

    #[test]
    fn test_duplicate_versioned_filename_rejected() {
        let (manager, _paths, _temp) = create_test_manager();

        let version = SemanticVersion::parse("1.5.0-main.20240601_000000").unwrap();
        manager
            .create_versioned_backup_at(
                "nightly",
                Some(version.clone()),
                &[],
                "",
                IncrementLevel::Patch,
                at(1, 0),
            )
            .unwrap();

        let second = manager.create_versioned_backup_at(
            "nightly",
            Some(version),
            &[],
            "",
            IncrementLevel::Patch,
            at(1, 1),
        );
        assert!(matches!(second, Err(VaultError::Duplicate { .. })));
    }

    #[test]
    fn test_finalize_records_hash_and_size() {
        let (manager, paths, _temp) = create_test_manager();

        let (version, filename) = manager
            .create_versioned_backup_at("nightly", None, &[], "", IncrementLevel::Patch, at(1, 0))
            .unwrap();

        let backup_path = paths.backup_file(&filename);
        fs::write(&backup_path, "-- PostgreSQL dump\nSELECT 1;\n").unwrap();

        manager
            .finalize_versioned_backup(&version, &backup_path)
            .unwrap();

        let record = manager
            .get_version_info(&version.to_string())
            .unwrap()
            .unwrap();
        assert_eq!(record.file_size, Some(29));
        let hash = record.file_hash.unwrap();
        assert_eq!(hash.len(), 64);
        assert!(hash.bytes().all(|b| b.is_ascii_hexdigit()));

        #[cfg(unix)]
        assert!(paths.latest_link("main").exists());
    }

    #[test]
    fn test_finalize_missing_file_fails() {
        let (manager, paths, _temp) = create_test_manager();

        let (version, filename) = manager
            .create_versioned_backup_at("nightly", None, &[], "", IncrementLevel::Patch, at(1, 0))
            .unwrap();

        let result = manager.finalize_versioned_backup(&version, &paths.backup_file(&filename));
        assert!(matches!(result, Err(VaultError::NotFound { .. })));
    }

    #[test]
    fn test_list_versions_filters_and_sorts() {
        let (manager, _paths, _temp) = create_test_manager();

        for (day, name) in [(1, "a"), (3, "b"), (2, "c")] {
            manager
                .create_versioned_backup_at(name, None, &[], "", IncrementLevel::Patch, at(day, 0))
                .unwrap();
        }
        let hotfix = SemanticVersion::parse("1.0.9-hotfix.20240610_000000").unwrap();
        manager
            .create_versioned_backup_at(
                "fix",
                Some(hotfix),
                &["urgent".to_string()],
                "",
                IncrementLevel::Patch,
                at(10, 0),
            )
            .unwrap();

        // Newest first
        let all = manager.list_versions(None, None, None).unwrap();
        assert_eq!(all.len(), 4);
        assert_eq!(all[0].backup_name, "fix");
        assert_eq!(all[1].backup_name, "b");
        assert_eq!(all[3].backup_name, "a");

        let main_only = manager
            .list_versions(Some(VersionBranch::Main), None, None)
            .unwrap();
        assert_eq!(main_only.len(), 3);

        let tagged = manager.list_versions(None, Some("urgent"), None).unwrap();
        assert_eq!(tagged.len(), 1);
        assert_eq!(tagged[0].backup_name, "fix");

        let limited = manager.list_versions(None, None, Some(2)).unwrap();
        assert_eq!(limited.len(), 2);
    }

    #[test]
    fn test_create_tag_requires_known_version() {
        let (manager, _paths, _temp) = create_test_manager();

        let result = manager.create_tag("9.9.9-main", "release", "");
        assert!(matches!(result, Err(VaultError::VersionNotFound(_))));

        let (version, _) = manager
            .create_versioned_backup_at("nightly", None, &[], "", IncrementLevel::Patch, at(1, 0))
            .unwrap();

        manager
            .create_tag(&version.to_string(), "release", "first cut")
            .unwrap();
        // Duplicate pair is silently skipped
        manager
            .create_tag(&version.to_string(), "release", "second try")
            .unwrap();

        let tags = manager.list_tags().unwrap();
        assert_eq!(tags["release"].len(), 1);
        assert_eq!(tags["release"][0].description, "first cut");
    }

    #[test]
    fn test_compare_versions() {
        let (manager, paths, _temp) = create_test_manager();

        let v1 = SemanticVersion::parse("1.1.0-main.20240601_000000").unwrap();
        let v2 = SemanticVersion::parse("1.2.0-develop.20240602_000000").unwrap();
        for (name, v, day, content) in [
            ("one", v1.clone(), 1, "x".repeat(100)),
            ("two", v2.clone(), 2, "y".repeat(40)),
        ] {
            let (version, filename) = manager
                .create_versioned_backup_at(name, Some(v), &[], "", IncrementLevel::Patch, at(day, 0))
                .unwrap();
            let path = paths.backup_file(&filename);
            fs::write(&path, content).unwrap();
            manager.finalize_versioned_backup(&version, &path).unwrap();
        }

        let cmp = manager
            .compare_versions(&v1.to_string(), &v2.to_string())
            .unwrap();
        assert!(!cmp.version1.newer);
        assert!(cmp.version2.newer);
        assert!(cmp.compatible);
        assert!(!cmp.same_branch);
        assert_eq!(cmp.file_size_diff, 60);
    }

    #[test]
    fn test_compare_versions_bad_input() {
        let (manager, _paths, _temp) = create_test_manager();
        let result = manager.compare_versions("not-a-version", "1.0.0");
        assert!(matches!(result, Err(VaultError::InvalidVersionFormat(_))));
    }

    #[test]
    fn test_rollback_updates_pointer_and_history() {
        let (manager, paths, _temp) = create_test_manager();

        let (v1, f1) = manager
            .create_versioned_backup_at("first", None, &[], "", IncrementLevel::Patch, at(1, 0))
            .unwrap();
        fs::write(paths.backup_file(&f1), "dump1").unwrap();
        manager
            .create_versioned_backup_at("second", None, &[], "", IncrementLevel::Patch, at(2, 0))
            .unwrap();

        manager.rollback_to_version(&v1.to_string(), true).unwrap();

        let state = manager.load_version_state().unwrap();
        assert_eq!(state.current_version, v1.to_string());
        assert_eq!(state.rollback_history.len(), 1);
        assert_eq!(state.rollback_history[0].action, "rollback");
        assert_eq!(state.rollback_history[0].target_version, v1.to_string());
        assert!(state.rollback_history[0].created_backup);
    }

    #[test]
    fn test_rollback_unknown_version_fails() {
        let (manager, _paths, _temp) = create_test_manager();
        let result = manager.rollback_to_version("9.9.9-main.20990101_000000", true);
        assert!(matches!(result, Err(VaultError::VersionNotFound(_))));
    }

    #[test]
    fn test_rollback_missing_file_fails() {
        let (manager, _paths, _temp) = create_test_manager();

        let (version, _) = manager
            .create_versioned_backup_at("nightly", None, &[], "", IncrementLevel::Patch, at(1, 0))
            .unwrap();

        // Catalog entry exists but no dump file was ever written
        let result = manager.rollback_to_version(&version.to_string(), false);
        assert!(matches!(result, Err(VaultError::NotFound { .. })));
    }

    #[test]
    fn test_cleanup_keeps_newest_per_branch() {
        let (manager, paths, _temp) = create_test_manager();

        // Five versions on main, one on develop
        let mut main_versions = Vec::new();
        for day in 1..=5 {
            let (version, filename) = manager
                .create_versioned_backup_at(
                    &format!("main{}", day),
                    None,
                    &[],
                    "",
                    IncrementLevel::Patch,
                    at(day, 0),
                )
                .unwrap();
            fs::write(paths.backup_file(&filename), "dump").unwrap();
            main_versions.push(version.to_string());
        }
        let dev = SemanticVersion::parse("1.0.0-develop.20240601_000000").unwrap();
        let (_, dev_file) = manager
            .create_versioned_backup_at("dev", Some(dev), &[], "", IncrementLevel::Patch, at(1, 0))
            .unwrap();
        fs::write(paths.backup_file(&dev_file), "dump").unwrap();

        let report = manager.cleanup_old_versions(2, false).unwrap();

        // The three oldest main versions go, develop is untouched
        assert_eq!(report.deleted_count, 3);
        assert!(report.errors.is_empty());
        for deleted in &main_versions[..3] {
            assert!(report.deleted_versions.contains(deleted));
        }

        let remaining = manager.list_versions(None, None, None).unwrap();
        assert_eq!(remaining.len(), 3);
        assert!(remaining.iter().any(|r| r.version.branch == VersionBranch::Develop));

        // Files for deleted versions are gone
        let state = manager.load_version_state().unwrap();
        for record in &state.versioned_backups {
            assert!(paths.backup_file(&record.versioned_filename).exists());
        }
    }

    #[test]
    fn test_cleanup_dry_run_mutates_nothing() {
        let (manager, paths, _temp) = create_test_manager();

        for day in 1..=3 {
            let (_, filename) = manager
                .create_versioned_backup_at(
                    &format!("b{}", day),
                    None,
                    &[],
                    "",
                    IncrementLevel::Patch,
                    at(day, 0),
                )
                .unwrap();
            fs::write(paths.backup_file(&filename), "dump").unwrap();
        }

        let report = manager.cleanup_old_versions(1, true).unwrap();
        assert_eq!(report.deleted_count, 0);
        assert_eq!(report.deleted_versions.len(), 2);

        assert_eq!(manager.list_versions(None, None, None).unwrap().len(), 3);
    }

    #[test]
    fn test_cleanup_missing_file_still_removes_entry() {
        let (manager, _paths, _temp) = create_test_manager();

        for day in 1..=2 {
            manager
                .create_versioned_backup_at(
                    &format!("b{}", day),
                    None,
                    &[],
                    "",
                    IncrementLevel::Patch,
                    at(day, 0),
                )
                .unwrap();
        }

        // No dump files on disk at all; cleanup still prunes the catalog
        let report = manager.cleanup_old_versions(1, false).unwrap();
        assert_eq!(report.deleted_count, 1);
        assert!(report.errors.is_empty());
        assert_eq!(manager.list_versions(None, None, None).unwrap().len(), 1);
    }

    #[test]
    fn test_get_latest_version() {
        let (manager, _paths, _temp) = create_test_manager();

        let seeded = manager.get_latest_version(VersionBranch::Main).unwrap();
        assert_eq!(seeded.unwrap().to_string(), SEED_VERSION);

        assert!(manager
            .get_latest_version(VersionBranch::Staging)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_lenient_timestamp_parsing() {
        assert!(parse_lenient_timestamp("2024-06-01T10:00:00Z").is_some());
        assert!(parse_lenient_timestamp("2024-06-01T10:00:00.123456").is_some());
        assert!(parse_lenient_timestamp("not a timestamp").is_none());
    }

    #[test]
    fn test_malformed_created_at_sorts_last() {
        let (manager, paths, _temp) = create_test_manager();

        manager
            .create_versioned_backup_at("good", None, &[], "", IncrementLevel::Patch, at(5, 0))
            .unwrap();

        // Corrupt one record's timestamp on disk the way an older tool might
        let raw = fs::read_to_string(paths.version_state_file()).unwrap();
        let mut doc: serde_json::Value = serde_json::from_str(&raw).unwrap();
        let record = doc["versioned_backups"][0].clone();
        let mut broken = record;
        broken["created_at"] = serde_json::Value::String("garbage".to_string());
        broken["versioned_filename"] = serde_json::Value::String("broken_v0.sql".to_string());
        broken["version"]["patch"] = serde_json::Value::from(9);
        broken["version"]["version_string"] = serde_json::Value::String("1.0.9-main".to_string());
        doc["versioned_backups"].as_array_mut().unwrap().push(broken);
        fs::write(paths.version_state_file(), doc.to_string()).unwrap();

        let listed = manager.list_versions(None, None, None).unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].backup_name, "good");
        assert!(listed[1].created_at.is_none());
    }
}
