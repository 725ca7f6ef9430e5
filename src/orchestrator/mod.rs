//! Backup/restore orchestration
//!
//! Ties the decision engine, the versioned catalog, and a target executor
//! together into the two end-to-end operations: create a backup and restore
//! from one. The orchestrator owns nothing database-specific beyond the
//! pg_dump/psql command lines; everything container-related goes through the
//! executor trait.

pub mod naming;

use std::path::Path;
use std::time::Instant;

use chrono::Utc;

use crate::config::{Settings, VaultPaths};
use crate::error::{VaultError, VaultResult};
use crate::exec::TargetExecutor;
use crate::notify::{NotificationSink, RunEntry};
use crate::strategy::{BackupStrategy, BackupType};
use crate::version::{BackupVersionManager, IncrementLevel, SemanticVersion};

use naming::{format_file_size, resolve_backup_filename};

/// Options for a single backup run
#[derive(Debug, Clone, Default)]
pub struct BackupOptions {
    /// Requested backup name; a timestamped default is used when absent
    pub name: Option<String>,
    /// Explicit backup type; the strategy decides when absent
    pub backup_type: Option<BackupType>,
    pub force_full: bool,
    pub force_overwrite: bool,
    pub tags: Vec<String>,
    pub description: String,
}

/// Outcome of a successful backup run
#[derive(Debug, Clone)]
pub struct BackupReport {
    pub filename: String,
    pub backup_type: BackupType,
    pub version: SemanticVersion,
    pub versioned_filename: String,
    pub file_size: u64,
    pub duration_secs: f64,
    /// True when a name conflict forced a timestamp suffix
    pub name_modified: bool,
}

/// Drives end-to-end backup and restore runs
pub struct Orchestrator {
    paths: VaultPaths,
    settings: Settings,
    executor: Box<dyn TargetExecutor>,
    sink: Box<dyn NotificationSink>,
    strategy: BackupStrategy,
    versions: BackupVersionManager,
}

impl Orchestrator {
    pub fn new(
        paths: VaultPaths,
        settings: Settings,
        executor: Box<dyn TargetExecutor>,
        sink: Box<dyn NotificationSink>,
    ) -> VaultResult<Self> {
        let strategy = BackupStrategy::new(paths.clone(), settings.retention.clone())?;
        let versions = BackupVersionManager::new(paths.clone())?;
        Ok(Self {
            paths,
            settings,
            executor,
            sink,
            strategy,
            versions,
        })
    }

    pub fn strategy(&self) -> &BackupStrategy {
        &self.strategy
    }

    pub fn versions(&self) -> &BackupVersionManager {
        &self.versions
    }

    fn resolve_target(&self) -> VaultResult<String> {
        self.settings.target.clone().ok_or_else(|| {
            VaultError::Config(format!(
                "No {} configured as backup target",
                self.settings.environment.target_noun()
            ))
        })
    }

    fn password_env(&self) -> Vec<(String, String)> {
        match std::env::var(&self.settings.database.password_env) {
            Ok(value) => vec![("PGPASSWORD".to_string(), value)],
            Err(_) => Vec::new(),
        }
    }

    fn notify(&self, success: bool, operation: &str, name: &str, target: &str, details: String) {
        let entry = RunEntry::new(
            success,
            operation,
            name,
            self.settings.environment.as_str(),
            target,
            details,
        );
        // Status reporting must not mask the primary outcome
        let _ = self.sink.notify(&entry);
    }

    /// Run a full backup cycle: decide the type, dump, catalog, record
    pub fn create_backup(&self, opts: &BackupOptions) -> VaultResult<BackupReport> {
        let backup_type = match opts.backup_type {
            Some(explicit) => {
                if opts.force_full {
                    BackupType::Full
                } else {
                    explicit
                }
            }
            None => self.strategy.determine_backup_type(opts.force_full)?,
        };

        let started = Instant::now();
        let now = Utc::now();

        let resolved = resolve_backup_filename(
            self.paths.backup_dir(),
            opts.name.as_deref(),
            opts.force_overwrite,
            now,
        )?;

        // Unnamed backups carry the type in the filename
        let filename = if opts.name.is_none() {
            let base = crate::config::strip_sql_suffix(&resolved.filename);
            format!("{}_{}.sql", base, backup_type)
        } else {
            resolved.filename.clone()
        };
        let backup_path = self.paths.backup_file(&filename);

        let target = self.resolve_target()?;
        if !self.executor.is_ready(&target)? {
            let details = format!(
                "{} '{}' not found or not running",
                self.settings.environment.target_noun(),
                target
            );
            self.notify(false, "backup", &filename, &target, details.clone());
            return Err(VaultError::Target(details));
        }

        let mut argv: Vec<String> = vec![
            "pg_dump".to_string(),
            "-U".to_string(),
            self.settings.database.user.clone(),
            "-d".to_string(),
            self.settings.database.database.clone(),
        ];
        argv.extend(
            self.strategy
                .get_backup_command_args(backup_type)
                .iter()
                .map(|s| s.to_string()),
        );

        let output = match self.executor.run(&target, &argv, None, &self.password_env()) {
            Ok(output) => output,
            Err(e) => {
                self.remove_partial(&backup_path);
                self.notify(false, "backup", &filename, &target, e.to_string());
                return Err(e);
            }
        };

        if !output.success() {
            self.remove_partial(&backup_path);
            let details = format!("pg_dump failed: {}", output.stderr.trim());
            self.notify(false, "backup", &filename, &target, details);
            return Err(VaultError::CommandFailed {
                exit_code: output.exit_code,
                stderr: output.stderr.trim().to_string(),
            });
        }

        if let Err(e) = std::fs::write(&backup_path, &output.stdout) {
            self.remove_partial(&backup_path);
            let err = VaultError::Io(format!("Failed to write backup file: {}", e));
            self.notify(false, "backup", &filename, &target, err.to_string());
            return Err(err);
        }

        let file_size = std::fs::metadata(&backup_path)
            .map_err(|e| VaultError::Io(format!("Failed to stat backup file: {}", e)))?
            .len();
        let duration_secs = started.elapsed().as_secs_f64();

        let base_name = crate::config::strip_sql_suffix(&filename).to_string();

        let (version, versioned_filename) = self.versions.create_versioned_backup(
            &base_name,
            None,
            &opts.tags,
            &opts.description,
            IncrementLevel::Patch,
        )?;

        // The catalog owns its own copy under the versioned name
        let versioned_path = self.paths.backup_file(&versioned_filename);
        std::fs::copy(&backup_path, &versioned_path)
            .map_err(|e| VaultError::Io(format!("Failed to copy versioned backup: {}", e)))?;
        self.versions
            .finalize_versioned_backup(&version, &versioned_path)?;

        let metadata =
            self.strategy
                .create_backup_metadata(&base_name, backup_type, file_size, duration_secs)?;
        self.strategy.update_backup_state(&metadata)?;

        let details = format!(
            "Type: {}, Size: {}, Duration: {:.1}s, Version: {}",
            backup_type,
            format_file_size(file_size),
            duration_secs,
            version
        );
        self.notify(true, "backup", &filename, &target, details);

        Ok(BackupReport {
            filename,
            backup_type,
            version,
            versioned_filename,
            file_size,
            duration_secs,
            name_modified: resolved.modified,
        })
    }

    /// Restore the database from a dump file via psql
    ///
    /// `confirmed` must be true; the CLI gathers the confirmation.
    pub fn restore_database(&self, backup_path: &Path, confirmed: bool) -> VaultResult<()> {
        if !backup_path.exists() {
            return Err(VaultError::backup_not_found(
                backup_path.display().to_string(),
            ));
        }

        let content = std::fs::read_to_string(backup_path)
            .map_err(|e| VaultError::Io(format!("Failed to read backup file: {}", e)))?;
        if content.trim().is_empty() {
            return Err(VaultError::Storage(format!(
                "Backup file is empty: {}",
                backup_path.display()
            )));
        }

        if !confirmed {
            return Err(VaultError::Config(
                "Restore requires explicit confirmation".to_string(),
            ));
        }

        let display_name = backup_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| backup_path.display().to_string());

        let target = self.resolve_target()?;
        if !self.executor.is_ready(&target)? {
            let details = format!(
                "{} '{}' not found or not running",
                self.settings.environment.target_noun(),
                target
            );
            self.notify(false, "restore", &display_name, &target, details.clone());
            return Err(VaultError::Target(details));
        }

        let argv: Vec<String> = vec![
            "psql".to_string(),
            "-U".to_string(),
            self.settings.database.user.clone(),
            "-d".to_string(),
            self.settings.database.database.clone(),
        ];

        let output = match self
            .executor
            .run(&target, &argv, Some(&content), &self.password_env())
        {
            Ok(output) => output,
            Err(e) => {
                self.notify(false, "restore", &display_name, &target, e.to_string());
                return Err(e);
            }
        };

        if !output.success() {
            let details = format!("psql failed: {}", output.stderr.trim());
            self.notify(false, "restore", &display_name, &target, details);
            return Err(VaultError::CommandFailed {
                exit_code: output.exit_code,
                stderr: output.stderr.trim().to_string(),
            });
        }

        self.notify(
            true,
            "restore",
            &display_name,
            &target,
            "Database restored".to_string(),
        );
        Ok(())
    }

    fn remove_partial(&self, backup_path: &Path) {
        if backup_path.exists() {
            let _ = std::fs::remove_file(backup_path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::ExecOutput;
    use std::cell::RefCell;
    use tempfile::TempDir;

    /// Scripted executor for orchestrator tests
    struct MockExecutor {
        ready: bool,
        results: RefCell<Vec<VaultResult<ExecOutput>>>,
        calls: RefCell<Vec<Vec<String>>>,
    }

    impl MockExecutor {
        fn succeeding(stdout: &str) -> Self {
            Self {
                ready: true,
                results: RefCell::new(vec![Ok(ExecOutput {
                    exit_code: 0,
                    stdout: stdout.to_string(),
                    stderr: String::new(),
                })]),
                calls: RefCell::new(Vec::new()),
            }
        }

        fn failing(exit_code: i32, stderr: &str) -> Self {
            Self {
                ready: true,
                results: RefCell::new(vec![Ok(ExecOutput {
                    exit_code,
                    stdout: String::new(),
                    stderr: stderr.to_string(),
                })]),
                calls: RefCell::new(Vec::new()),
            }
        }

        fn timing_out() -> Self {
            Self {
                ready: true,
                results: RefCell::new(vec![Err(VaultError::Timeout {
                    operation: "pg_dump".to_string(),
                    seconds: 300,
                })]),
                calls: RefCell::new(Vec::new()),
            }
        }

        fn not_ready() -> Self {
            Self {
                ready: false,
                results: RefCell::new(Vec::new()),
                calls: RefCell::new(Vec::new()),
            }
        }
    }

    impl TargetExecutor for MockExecutor {
        fn run(
            &self,
            _target: &str,
            argv: &[String],
            _stdin: Option<&str>,
            _env: &[(String, String)],
        ) -> VaultResult<ExecOutput> {
            self.calls.borrow_mut().push(argv.to_vec());
            self.results.borrow_mut().remove(0)
        }

        fn is_ready(&self, _target: &str) -> VaultResult<bool> {
            Ok(self.ready)
        }
    }

    /// Sink that drops everything
    struct NullSink;

    impl NotificationSink for NullSink {
        fn notify(&self, _entry: &RunEntry) -> VaultResult<()> {
            Ok(())
        }
    }

    fn test_settings() -> Settings {
        let mut settings = Settings::default();
        settings.target = Some("pg-main".to_string());
        settings
    }

    fn orchestrator_with(executor: MockExecutor) -> (Orchestrator, TempDir) {
        let temp = TempDir::new().unwrap();
        let paths = VaultPaths::with_backup_dir(temp.path().to_path_buf());
        paths.ensure_directories().unwrap();
        let orchestrator = Orchestrator::new(
            paths,
            test_settings(),
            Box::new(executor),
            Box::new(NullSink),
        )
        .unwrap();
        (orchestrator, temp)
    }

    #[test]
    fn test_create_backup_writes_dump_and_catalog() {
        let (orchestrator, temp) = orchestrator_with(MockExecutor::succeeding("-- PostgreSQL dump\n"));

        let opts = BackupOptions {
            name: Some("nightly".to_string()),
            ..Default::default()
        };
        let report = orchestrator.create_backup(&opts).unwrap();

        assert_eq!(report.filename, "nightly.sql");
        assert_eq!(report.backup_type, BackupType::Full);
        assert!(!report.name_modified);

        let dump = std::fs::read_to_string(temp.path().join("nightly.sql")).unwrap();
        assert_eq!(dump, "-- PostgreSQL dump\n");

        // The versioned copy exists and is finalized with hash and size
        assert!(temp.path().join(&report.versioned_filename).exists());
        let info = orchestrator
            .versions
            .get_version_info(&report.version.to_string())
            .unwrap()
            .unwrap();
        assert!(info.file_hash.is_some());
        assert_eq!(info.file_size, Some(report.file_size));

        // And the state document recorded a full backup
        let state = orchestrator.strategy.load_backup_state().unwrap();
        assert_eq!(state.backups.len(), 1);
        assert!(state.last_full_backup.is_some());
    }

    #[test]
    fn test_explicit_incremental_type_is_respected() {
        let (orchestrator, _temp) = orchestrator_with(MockExecutor::succeeding("dump"));

        let opts = BackupOptions {
            name: Some("inc".to_string()),
            backup_type: Some(BackupType::Incremental),
            ..Default::default()
        };
        let report = orchestrator.create_backup(&opts).unwrap();
        assert_eq!(report.backup_type, BackupType::Incremental);
    }

    #[test]
    fn test_force_full_overrides_explicit_type() {
        let (orchestrator, _temp) = orchestrator_with(MockExecutor::succeeding("dump"));

        let opts = BackupOptions {
            name: Some("forced".to_string()),
            backup_type: Some(BackupType::Incremental),
            force_full: true,
            ..Default::default()
        };
        let report = orchestrator.create_backup(&opts).unwrap();
        assert_eq!(report.backup_type, BackupType::Full);
    }

    #[test]
    fn test_default_name_carries_type_suffix() {
        let (orchestrator, _temp) = orchestrator_with(MockExecutor::succeeding("dump"));

        let report = orchestrator.create_backup(&BackupOptions::default()).unwrap();
        assert!(report.filename.starts_with("backup_"));
        assert!(report.filename.ends_with("_full.sql"));
    }

    #[test]
    fn test_dump_failure_removes_partial_file() {
        let (orchestrator, temp) =
            orchestrator_with(MockExecutor::failing(1, "connection refused"));

        let opts = BackupOptions {
            name: Some("broken".to_string()),
            ..Default::default()
        };
        let err = orchestrator.create_backup(&opts).unwrap_err();
        assert!(matches!(err, VaultError::CommandFailed { exit_code: 1, .. }));
        assert!(!temp.path().join("broken.sql").exists());
    }

    #[test]
    fn test_timeout_surfaces_and_leaves_no_file() {
        let (orchestrator, temp) = orchestrator_with(MockExecutor::timing_out());

        let opts = BackupOptions {
            name: Some("slow".to_string()),
            ..Default::default()
        };
        let err = orchestrator.create_backup(&opts).unwrap_err();
        assert!(err.is_timeout());
        assert!(!temp.path().join("slow.sql").exists());
    }

    #[test]
    fn test_unready_target_fails_before_dump() {
        let (orchestrator, _temp) = orchestrator_with(MockExecutor::not_ready());

        let err = orchestrator
            .create_backup(&BackupOptions::default())
            .unwrap_err();
        assert!(matches!(err, VaultError::Target(_)));
    }

    #[test]
    fn test_restore_requires_confirmation() {
        let (orchestrator, temp) = orchestrator_with(MockExecutor::succeeding(""));
        let dump = temp.path().join("restore_me.sql");
        std::fs::write(&dump, "-- dump\nSELECT 1;").unwrap();

        let err = orchestrator.restore_database(&dump, false).unwrap_err();
        assert!(matches!(err, VaultError::Config(_)));
    }

    #[test]
    fn test_restore_rejects_missing_and_empty_files() {
        let (orchestrator, temp) = orchestrator_with(MockExecutor::succeeding(""));

        let missing = temp.path().join("nope.sql");
        assert!(orchestrator
            .restore_database(&missing, true)
            .unwrap_err()
            .is_not_found());

        let empty = temp.path().join("empty.sql");
        std::fs::write(&empty, "   \n").unwrap();
        assert!(matches!(
            orchestrator.restore_database(&empty, true).unwrap_err(),
            VaultError::Storage(_)
        ));
    }

    #[test]
    fn test_restore_streams_file_to_psql() {
        let (orchestrator, temp) = orchestrator_with(MockExecutor::succeeding(""));
        let dump = temp.path().join("restore_me.sql");
        std::fs::write(&dump, "-- dump\nSELECT 1;").unwrap();

        orchestrator.restore_database(&dump, true).unwrap();
    }

    #[test]
    fn test_restore_failure_surfaces_stderr() {
        let (orchestrator, temp) = orchestrator_with(MockExecutor::failing(2, "syntax error"));
        let dump = temp.path().join("restore_me.sql");
        std::fs::write(&dump, "garbage").unwrap();

        let err = orchestrator.restore_database(&dump, true).unwrap_err();
        match err {
            VaultError::CommandFailed { exit_code, stderr } => {
                assert_eq!(exit_code, 2);
                assert_eq!(stderr, "syntax error");
            }
            other => panic!("unexpected error: {}", other),
        }
    }
}
