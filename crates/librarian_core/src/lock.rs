//! Workspace lock: a PID-tagged `LOCK` file under `.librarian/`, held for
//! the duration of any operation that mutates the store. Stale locks left
//! behind by a crashed process are reclaimed automatically.

use crate::error::{LibrarianError, Result};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::warn;

const MAX_RECLAIM_RETRIES: u32 = 2;

/// RAII guard for the workspace lock. Dropping it releases the file lock
/// and removes the lock file.
pub struct WorkspaceLock {
    file: Option<File>,
    path: PathBuf,
}

impl WorkspaceLock {
    /// Acquires the lock at `<librarian_dir>/LOCK`, reclaiming it if the
    /// owning process is no longer alive.
    pub fn acquire(librarian_dir: &Path) -> Result<Self> {
        let lock_path = librarian_dir.join("LOCK");
        Self::acquire_with_retry(&lock_path, 0)
    }

    fn acquire_with_retry(lock_path: &Path, retry_count: u32) -> Result<Self> {
        if retry_count > MAX_RECLAIM_RETRIES {
            return Err(LibrarianError::LockContention { pid: 0 });
        }

        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(lock_path)
        {
            Ok(mut file) => {
                let pid = std::process::id();
                writeln!(file, "{}", pid)?;
                file.flush()?;
                file.try_lock_exclusive()
                    .map_err(|_| LibrarianError::LockContention { pid })?;

                Ok(Self {
                    file: Some(file),
                    path: lock_path.to_path_buf(),
                })
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                Self::handle_existing_lock(lock_path, retry_count)
            }
            Err(e) => Err(LibrarianError::Io(e)),
        }
    }

    fn handle_existing_lock(lock_path: &Path, retry_count: u32) -> Result<Self> {
        match fs::read_to_string(lock_path) {
            Ok(content) => {
                if let Ok(pid) = content.trim().parse::<u32>() {
                    if is_process_alive(pid) {
                        return Err(LibrarianError::LockContention { pid });
                    }

                    warn!(pid, "reclaiming stale workspace lock from dead process");
                    if let Err(e) = fs::remove_file(lock_path) {
                        if e.kind() != std::io::ErrorKind::NotFound {
                            return Err(LibrarianError::Io(e));
                        }
                    }
                    return Self::acquire_with_retry(lock_path, retry_count + 1);
                }

                warn!("lock file has invalid content, removing it");
                let _ = fs::remove_file(lock_path);
                Self::acquire_with_retry(lock_path, retry_count + 1)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Self::acquire_with_retry(lock_path, retry_count + 1)
            }
            Err(_) => Err(LibrarianError::LockContention { pid: 0 }),
        }
    }
}

impl Drop for WorkspaceLock {
    fn drop(&mut self) {
        if let Some(file) = self.file.take() {
            drop(file);
        }
        let _ = fs::remove_file(&self.path);
    }
}

#[cfg(target_os = "linux")]
fn is_process_alive(pid: u32) -> bool {
    std::path::Path::new(&format!("/proc/{}/stat", pid)).exists()
}

#[cfg(all(unix, not(target_os = "linux")))]
fn is_process_alive(pid: u32) -> bool {
    std::process::Command::new("kill")
        .args(["-0", &pid.to_string()])
        .output()
        .map(|o| o.status.success())
        .unwrap_or(true)
}

#[cfg(not(unix))]
fn is_process_alive(_pid: u32) -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn acquire_and_release_cleans_up_lock_file() {
        let tmp = TempDir::new().unwrap();
        let lock_path = tmp.path().join("LOCK");

        {
            let _guard = WorkspaceLock::acquire(tmp.path()).unwrap();
            assert!(lock_path.exists());
        }

        assert!(!lock_path.exists());
    }

    #[test]
    fn second_acquire_while_held_is_contended() {
        let tmp = TempDir::new().unwrap();
        let _guard = WorkspaceLock::acquire(tmp.path()).unwrap();

        let second = WorkspaceLock::acquire(tmp.path());
        assert!(matches!(second, Err(LibrarianError::LockContention { .. })));
    }

    #[test]
    fn stale_lock_from_dead_pid_is_reclaimed() {
        let tmp = TempDir::new().unwrap();
        let lock_path = tmp.path().join("LOCK");
        fs::write(&lock_path, "999999999\n").unwrap();

        let guard = WorkspaceLock::acquire(tmp.path());
        assert!(guard.is_ok());
    }
}
