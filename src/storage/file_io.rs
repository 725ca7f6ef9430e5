//! JSON document I/O
//!
//! Every pgvault document (backup state, version catalog, tags, branches,
//! settings, last-run status) is a single pretty-printed JSON file. Reads
//! distinguish two failure modes: a missing document is normal on first use
//! and yields a default (or an error for documents that are seeded at
//! startup), while a corrupt document is always a hard error rather than a
//! silent reset. Writes go through a temp file in the same directory and an
//! atomic rename so a crash mid-write can't leave a half-written document.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use serde::{de::DeserializeOwned, Serialize};

use crate::error::{VaultError, VaultResult};

/// Suffix for the temp file an atomic write goes through
const TEMP_SUFFIX: &str = "json.tmp";

/// Read a document, treating a missing file as the default value
///
/// Used for documents that accumulate lazily, like the backup state.
pub fn read_json<T, P>(path: P) -> VaultResult<T>
where
    T: DeserializeOwned + Default,
    P: AsRef<Path>,
{
    let path = path.as_ref();

    if !path.exists() {
        return Ok(T::default());
    }

    parse_document(path)
}

/// Read a document that must exist
///
/// Used for documents seeded at startup (version catalog, tags, branches);
/// their absence means the store was never initialized or was tampered with.
pub fn read_json_required<T, P>(path: P) -> VaultResult<T>
where
    T: DeserializeOwned,
    P: AsRef<Path>,
{
    let path = path.as_ref();

    if !path.exists() {
        return Err(VaultError::Storage(format!(
            "Document not found: {}",
            path.display()
        )));
    }

    parse_document(path)
}

fn parse_document<T>(path: &Path) -> VaultResult<T>
where
    T: DeserializeOwned,
{
    let file = File::open(path).map_err(|e| {
        VaultError::Storage(format!("Failed to open {}: {}", path.display(), e))
    })?;

    serde_json::from_reader(BufReader::new(file)).map_err(|e| {
        VaultError::Storage(format!("Failed to parse {}: {}", path.display(), e))
    })
}

/// Write a document atomically: temp file, flush, fsync, rename
///
/// The temp file lives next to the target so the rename stays within one
/// filesystem. Readers observe either the old document or the new one,
/// never a partial write.
pub fn write_json_atomic<T, P>(path: P, data: &T) -> VaultResult<()>
where
    T: Serialize,
    P: AsRef<Path>,
{
    let path = path.as_ref();

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| {
            VaultError::Storage(format!(
                "Failed to create directory {}: {}",
                parent.display(),
                e
            ))
        })?;
    }

    let temp_path = path.with_extension(TEMP_SUFFIX);

    let file = File::create(&temp_path).map_err(|e| {
        VaultError::Storage(format!(
            "Failed to create {}: {}",
            temp_path.display(),
            e
        ))
    })?;

    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, data).map_err(|e| {
        VaultError::Storage(format!("Failed to serialize {}: {}", path.display(), e))
    })?;

    writer
        .flush()
        .map_err(|e| VaultError::Storage(format!("Failed to flush {}: {}", path.display(), e)))?;

    // Durable before the rename makes it visible
    writer.get_ref().sync_all().map_err(|e| {
        VaultError::Storage(format!("Failed to sync {}: {}", path.display(), e))
    })?;

    fs::rename(&temp_path, path).map_err(|e| {
        let _ = fs::remove_file(&temp_path);
        VaultError::Storage(format!(
            "Failed to move {} into place: {}",
            temp_path.display(),
            e
        ))
    })
}
