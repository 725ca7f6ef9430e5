//! Invocation lock
//!
//! The JSON documents are read-modify-write with no per-document locking, so
//! two concurrent invocations can silently lose updates. The lock file makes
//! the one-invocation-at-a-time assumption explicit: the second invocation
//! fails fast instead of racing.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;

use crate::error::{VaultError, VaultResult};

/// Advisory lock held for the duration of one CLI invocation
///
/// Created with `O_EXCL` semantics and removed on drop. A stale lock (from a
/// crashed invocation) must be removed manually; the error message names the
/// file.
pub struct InvocationLock {
    lock_path: PathBuf,
}

impl InvocationLock {
    /// Acquire the lock, failing if another invocation holds it
    pub fn acquire(lock_path: PathBuf) -> VaultResult<Self> {
        if let Some(parent) = lock_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| VaultError::Io(format!("Failed to create lock directory: {}", e)))?;
        }

        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&lock_path)
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::AlreadyExists {
                    VaultError::Locked(format!(
                        "another invocation appears to be running (remove {} if stale)",
                        lock_path.display()
                    ))
                } else {
                    VaultError::Io(format!("Failed to create lock file: {}", e))
                }
            })?;

        // Record the owning pid for diagnostics
        let _ = writeln!(file, "{}", std::process::id());

        Ok(Self { lock_path })
    }

    /// Path of the lock file
    pub fn path(&self) -> &PathBuf {
        &self.lock_path
    }
}

impl Drop for InvocationLock {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.lock_path);
    }
}
