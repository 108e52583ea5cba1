//! Scoped exclusive filesystem lock, acquired in a well-known temp directory.
//!
//! Grounded in spec.md's "scoped resources" design note: the Python original
//! used ad hoc `fcntl` calls with no guaranteed release path. Here the lock
//! is a guard struct whose `Drop` impl always removes the lock file, so a
//! panicking scan can't leave the lock held forever.

use crate::error::{QError, QResult};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

/// Holds an exclusive lock for as long as it is alive. Dropping it (including
/// via an early return or panic unwind) releases the lock.
pub struct ScanLock {
    path: PathBuf,
}

impl ScanLock {
    /// Creates `<dir>/<name>.lock` with `O_EXCL` semantics: if the file
    /// already exists, the lock is held by another process and acquisition
    /// fails immediately rather than blocking.
    pub fn acquire(dir: &Path, name: &str) -> QResult<ScanLock> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(format!("{name}.lock"));
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(_) => Ok(ScanLock { path }),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                Err(QError::LockHeld(path.display().to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}

impl Drop for ScanLock {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_acquire_fails_while_first_is_held() {
        let dir = tempfile::tempdir().unwrap();
        let first = ScanLock::acquire(dir.path(), "quality").unwrap();
        let second = ScanLock::acquire(dir.path(), "quality");
        assert!(matches!(second, Err(QError::LockHeld(_))));
        drop(first);
        assert!(ScanLock::acquire(dir.path(), "quality").is_ok());
    }
}
