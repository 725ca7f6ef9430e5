//! Backup name validation and conflict resolution
//!
//! Names become filenames on whatever filesystem hosts the backup
//! directory, so the rules are the lowest common denominator: no
//! Windows-reserved device names, no path-hostile characters, bounded
//! length.

use std::path::Path;

use chrono::{DateTime, Utc};

use crate::error::{VaultError, VaultResult};

/// Device names that cannot be used as filenames on Windows volumes
const RESERVED_NAMES: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

const INVALID_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

const MAX_NAME_LENGTH: usize = 200;

const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Outcome of resolving a requested backup name to an actual filename
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedName {
    pub filename: String,
    /// True when a conflict forced a timestamp suffix onto the requested name
    pub modified: bool,
}

/// Validate a user-supplied backup name
pub fn validate_backup_name(name: &str) -> VaultResult<()> {
    if name.is_empty() {
        return Err(VaultError::InvalidBackupName(
            "Backup name cannot be empty".to_string(),
        ));
    }

    if let Some(bad) = name.chars().find(|c| INVALID_CHARS.contains(c)) {
        return Err(VaultError::InvalidBackupName(format!(
            "Name contains invalid character '{}'",
            bad
        )));
    }

    if name.len() > MAX_NAME_LENGTH {
        return Err(VaultError::InvalidBackupName(format!(
            "Name is too long (maximum {} characters)",
            MAX_NAME_LENGTH
        )));
    }

    if RESERVED_NAMES.contains(&name.to_uppercase().as_str()) {
        return Err(VaultError::InvalidBackupName(format!(
            "'{}' is a reserved system name",
            name
        )));
    }

    Ok(())
}

/// Resolve the final backup filename, suffixing a timestamp on conflict
pub fn resolve_backup_filename(
    backup_dir: &Path,
    custom_name: Option<&str>,
    force_overwrite: bool,
    now: DateTime<Utc>,
) -> VaultResult<ResolvedName> {
    match custom_name {
        Some(name) => {
            validate_backup_name(name)?;

            let filename = format!("{}.sql", name);
            if backup_dir.join(&filename).exists() && !force_overwrite {
                let stamped = format!("{}_{}.sql", name, now.format(TIMESTAMP_FORMAT));
                Ok(ResolvedName {
                    filename: stamped,
                    modified: true,
                })
            } else {
                Ok(ResolvedName {
                    filename,
                    modified: false,
                })
            }
        }
        None => Ok(ResolvedName {
            filename: format!("backup_{}.sql", now.format(TIMESTAMP_FORMAT)),
            modified: false,
        }),
    }
}

/// Format a byte count in the largest unit that keeps the value under 1024
pub fn format_file_size(size_bytes: u64) -> String {
    let mut size = size_bytes as f64;
    for unit in ["B", "KB", "MB", "GB"] {
        if size < 1024.0 {
            return format!("{:.1} {}", size, unit);
        }
        size /= 1024.0;
    }
    format!("{:.1} TB", size)
}

/// Format a duration in seconds for CLI output
pub fn format_duration(seconds: f64) -> String {
    if seconds < 60.0 {
        format!("{:.1}s", seconds)
    } else {
        let minutes = (seconds / 60.0).floor();
        format!("{}m {:.0}s", minutes as u64, seconds % 60.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 4, 12, 30, 45).unwrap()
    }

    #[test]
    fn test_valid_names_pass() {
        validate_backup_name("nightly").unwrap();
        validate_backup_name("pre-release_2024.06").unwrap();
    }

    #[test]
    fn test_empty_name_rejected() {
        assert!(validate_backup_name("").is_err());
    }

    #[test]
    fn test_invalid_characters_rejected() {
        for name in ["a/b", "a\\b", "a:b", "a*b", "a?b", "a<b", "a>b", "a|b", "a\"b"] {
            assert!(validate_backup_name(name).is_err(), "{} should fail", name);
        }
    }

    #[test]
    fn test_reserved_names_rejected_case_insensitively() {
        assert!(validate_backup_name("CON").is_err());
        assert!(validate_backup_name("con").is_err());
        assert!(validate_backup_name("lpt9").is_err());
        assert!(validate_backup_name("console").is_ok());
    }

    #[test]
    fn test_overlong_name_rejected() {
        let name = "a".repeat(MAX_NAME_LENGTH + 1);
        assert!(validate_backup_name(&name).is_err());
        assert!(validate_backup_name(&"a".repeat(MAX_NAME_LENGTH)).is_ok());
    }

    #[test]
    fn test_default_filename_uses_timestamp() {
        let temp = TempDir::new().unwrap();
        let resolved = resolve_backup_filename(temp.path(), None, false, fixed_now()).unwrap();
        assert_eq!(resolved.filename, "backup_20240604_123045.sql");
        assert!(!resolved.modified);
    }

    #[test]
    fn test_custom_name_kept_when_free() {
        let temp = TempDir::new().unwrap();
        let resolved =
            resolve_backup_filename(temp.path(), Some("nightly"), false, fixed_now()).unwrap();
        assert_eq!(resolved.filename, "nightly.sql");
        assert!(!resolved.modified);
    }

    #[test]
    fn test_conflict_appends_timestamp() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("nightly.sql"), "-- dump").unwrap();

        let resolved =
            resolve_backup_filename(temp.path(), Some("nightly"), false, fixed_now()).unwrap();
        assert_eq!(resolved.filename, "nightly_20240604_123045.sql");
        assert!(resolved.modified);
    }

    #[test]
    fn test_force_overwrite_keeps_name() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("nightly.sql"), "-- dump").unwrap();

        let resolved =
            resolve_backup_filename(temp.path(), Some("nightly"), true, fixed_now()).unwrap();
        assert_eq!(resolved.filename, "nightly.sql");
        assert!(!resolved.modified);
    }

    #[test]
    fn test_format_file_size() {
        assert_eq!(format_file_size(512), "512.0 B");
        assert_eq!(format_file_size(2048), "2.0 KB");
        assert_eq!(format_file_size(5 * 1024 * 1024), "5.0 MB");
        assert_eq!(format_file_size(3 * 1024 * 1024 * 1024), "3.0 GB");
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(12.34), "12.3s");
        assert_eq!(format_duration(95.0), "1m 35s");
    }
}
