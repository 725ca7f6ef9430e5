//! User settings for pgvault
//!
//! Manages the resolved configuration a single invocation runs with: database
//! connection parameters, the container/pod target, and retention policies.

use serde::{Deserialize, Serialize};

use super::paths::VaultPaths;
use crate::error::{VaultError, VaultResult};

/// Execution environment the backup target lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TargetEnvironment {
    /// Docker container target (default)
    #[default]
    Docker,
    /// Kubernetes pod target
    Kubernetes,
}

impl TargetEnvironment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Docker => "docker",
            Self::Kubernetes => "kubernetes",
        }
    }

    /// Human-readable noun for the target ("container" or "pod")
    pub fn target_noun(&self) -> &'static str {
        match self {
            Self::Docker => "container",
            Self::Kubernetes => "pod",
        }
    }
}

/// Database connection parameters passed to pg_dump/psql inside the target
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// Database user
    pub user: String,
    /// Database name
    pub database: String,
    /// Environment variable holding the password (read at run time,
    /// never persisted)
    #[serde(default = "default_password_env")]
    pub password_env: String,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            user: "postgres".to_string(),
            database: "postgres".to_string(),
            password_env: default_password_env(),
        }
    }
}

/// Retention policy counts per category
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionSettings {
    /// Number of daily backups to keep
    pub daily: usize,
    /// Number of weekly backups to keep
    pub weekly: usize,
    /// Number of monthly backups to keep
    pub monthly: usize,
    /// Number of full backups to keep
    pub full: usize,
}

impl Default for RetentionSettings {
    fn default() -> Self {
        Self {
            daily: 7,
            weekly: 4,
            monthly: 12,
            full: 3,
        }
    }
}

/// User settings for pgvault
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Schema version for migration support
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,

    /// Which environment the target runs in
    #[serde(default)]
    pub environment: TargetEnvironment,

    /// Resolved container name or pod name
    #[serde(default)]
    pub target: Option<String>,

    /// Kubernetes namespace (ignored for Docker targets)
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Database connection parameters
    #[serde(default)]
    pub database: DatabaseSettings,

    /// Retention policy counts
    #[serde(default)]
    pub retention: RetentionSettings,

    /// Subprocess time budget for dump/restore commands, in seconds
    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,

    /// How many versions to keep per branch during version cleanup
    #[serde(default = "default_version_keep_count")]
    pub version_keep_count: usize,
}

fn default_schema_version() -> u32 {
    1
}

fn default_password_env() -> String {
    "PGPASSWORD".to_string()
}

fn default_namespace() -> String {
    "default".to_string()
}

fn default_command_timeout() -> u64 {
    300
}

fn default_version_keep_count() -> usize {
    10
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            schema_version: default_schema_version(),
            environment: TargetEnvironment::default(),
            target: None,
            namespace: default_namespace(),
            database: DatabaseSettings::default(),
            retention: RetentionSettings::default(),
            command_timeout_secs: default_command_timeout(),
            version_keep_count: default_version_keep_count(),
        }
    }
}

impl Settings {
    /// Load settings from disk, or create default settings if file doesn't exist
    pub fn load_or_create(paths: &VaultPaths) -> VaultResult<Self> {
        let settings_path = paths.settings_file();

        if settings_path.exists() {
            let contents = std::fs::read_to_string(&settings_path)
                .map_err(|e| VaultError::Io(format!("Failed to read settings file: {}", e)))?;

            let settings: Settings = serde_json::from_str(&contents)
                .map_err(|e| VaultError::Config(format!("Failed to parse settings file: {}", e)))?;

            Ok(settings)
        } else {
            // Don't save yet - let caller decide when to persist
            Ok(Settings::default())
        }
    }

    /// Save settings to disk
    pub fn save(&self, paths: &VaultPaths) -> VaultResult<()> {
        paths.ensure_directories()?;

        let settings_path = paths.settings_file();
        let contents = serde_json::to_string_pretty(self)
            .map_err(|e| VaultError::Config(format!("Failed to serialize settings: {}", e)))?;

        std::fs::write(&settings_path, contents)
            .map_err(|e| VaultError::Io(format!("Failed to write settings file: {}", e)))?;

        Ok(())
    }
}
