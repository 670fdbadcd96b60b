use std::fs::{File, OpenOptions};
use std::io;
use std::path::Path;

use fs2::FileExt;

/// An advisory lock held on a job's `.lock` file. Released on drop, matching the source's
/// `flock`/`close` pairing.
#[derive(Debug)]
pub struct JobLock {
    file: File,
}

#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error("lock file is missing or could not be opened: {0}")]
    Unavailable(#[source] io::Error),
    #[error("lock is held by another process")]
    Taken,
}

/// Acquires a non-blocking exclusive advisory lock on `lock_path`. The file must already exist —
/// a missing lock file is treated the same as any other open failure (`Unavailable`), which the
/// caller maps onto a retry rather than an abandonment.
pub fn acquire(lock_path: &Path) -> Result<JobLock, LockError> {
    if !lock_path.exists() {
        return Err(LockError::Unavailable(io::Error::new(
            io::ErrorKind::NotFound,
            "lock file does not exist",
        )));
    }
    let file = OpenOptions::new().write(true).open(lock_path).map_err(LockError::Unavailable)?;
    match file.try_lock_exclusive() {
        Ok(()) => Ok(JobLock { file }),
        Err(e) if e.kind() == io::ErrorKind::WouldBlock => Err(LockError::Taken),
        Err(e) => Err(LockError::Unavailable(e)),
    }
}

impl Drop for JobLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_lock_file_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let err = acquire(&dir.path().join(".lock")).unwrap_err();
        assert!(matches!(err, LockError::Unavailable(_)));
    }

    #[test]
    fn second_acquire_sees_contention() {
        let dir = tempfile::tempdir().unwrap();
        let lock_path = dir.path().join(".lock");
        std::fs::write(&lock_path, b"").unwrap();

        let _held = acquire(&lock_path).unwrap();
        let second = OpenOptions::new().write(true).open(&lock_path).unwrap();
        assert!(second.try_lock_exclusive().is_err());
    }

    #[test]
    fn lock_is_released_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let lock_path = dir.path().join(".lock");
        std::fs::write(&lock_path, b"").unwrap();

        {
            let _held = acquire(&lock_path).unwrap();
        }
        let second = acquire(&lock_path);
        assert!(second.is_ok());
    }
}
