//! Lock file management for single-instance enforcement.
//!
//! Two controllers must never drive the same relay, so a run holds an
//! exclusive `fs2` lock on `greenhouse.lock` in the runtime directory. The
//! lock is released by the kernel when the process exits, even on a crash,
//! so a leftover file never blocks the next start.

use anyhow::{Context, Result};
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

pub const LOCK_FILE_NAME: &str = "greenhouse.lock";

/// An acquired instance lock. Dropping it releases the lock and removes the file.
#[derive(Debug)]
pub struct InstanceLock {
    file: File,
    path: PathBuf,
}

impl InstanceLock {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for InstanceLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
        let _ = std::fs::remove_file(&self.path);
    }
}

/// Default lock location: `$XDG_RUNTIME_DIR/greenhouse.lock`, else `/tmp`.
pub fn default_lock_path() -> PathBuf {
    let runtime_dir = std::env::var("XDG_RUNTIME_DIR").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(runtime_dir).join(LOCK_FILE_NAME)
}

/// Try to take the lock at `lock_path` without blocking.
///
/// Returns `Ok(None)` when another live process holds it; that process's PID
/// is logged if the lock file names one.
pub fn acquire_lock(lock_path: &Path) -> Result<Option<InstanceLock>> {
    // Open without truncating so a running holder's PID stays readable
    let mut lock_file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(lock_path)
        .with_context(|| format!("Failed to open lock file {}", lock_path.display()))?;

    if lock_file.try_lock_exclusive().is_err() {
        match read_lock_pid(lock_path) {
            Some(pid) => log_error!("greenhouse is already running (PID: {pid})"),
            None => log_error!("greenhouse is already running"),
        }
        return Ok(None);
    }

    lock_file.set_len(0)?;
    lock_file.seek(SeekFrom::Start(0))?;
    writeln!(&lock_file, "{}", std::process::id())?;
    lock_file.flush()?;

    Ok(Some(InstanceLock {
        file: lock_file,
        path: lock_path.to_path_buf(),
    }))
}

/// PID recorded in a lock file, if it holds a valid one.
pub fn read_lock_pid(lock_path: &Path) -> Option<u32> {
    std::fs::read_to_string(lock_path)
        .ok()?
        .lines()
        .next()?
        .trim()
        .parse()
        .ok()
}
