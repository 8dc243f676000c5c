//! File locking for snapshot writes
//!
//! The stores assume a single writer, but a `rally watch` process and a
//! one-shot `rally task ...` invocation can touch the same data directory.
//! Snapshot writes take an exclusive `fs2` lock on a sibling `.lock` file so
//! that two processes never interleave a temp-file + rename.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use fs2::FileExt;

use crate::error::{Error, Result};

/// Default lock timeout in milliseconds
pub const DEFAULT_LOCK_TIMEOUT_MS: u64 = 5000;

/// Default retry interval when waiting for a lock
const LOCK_RETRY_INTERVAL_MS: u64 = 50;

fn is_lock_contended(err: &io::Error) -> bool {
    if err.kind() == io::ErrorKind::WouldBlock {
        return true;
    }

    // On Windows, fs2/libc can surface lock/sharing violations as "Other".
    #[cfg(windows)]
    {
        matches!(err.raw_os_error(), Some(32) | Some(33))
    }
    #[cfg(not(windows))]
    {
        false
    }
}

/// A file lock guard that releases the lock when dropped
#[derive(Debug)]
pub struct FileLock {
    file: File,
    path: PathBuf,
}

impl FileLock {
    /// Acquire an exclusive lock on a file with timeout
    ///
    /// The lock file is created if missing. Returns `Error::LockFailed` if the
    /// lock cannot be acquired within the timeout.
    pub fn acquire(path: impl AsRef<Path>, timeout_ms: u64) -> Result<Self> {
        let path = path.as_ref();
        let file = open_lock_file(path)?;

        let start = Instant::now();
        let timeout = Duration::from_millis(timeout_ms);
        let retry_interval = Duration::from_millis(LOCK_RETRY_INTERVAL_MS);

        loop {
            match file.try_lock_exclusive() {
                Ok(()) => {
                    return Ok(FileLock {
                        file,
                        path: path.to_path_buf(),
                    });
                }
                Err(e) if is_lock_contended(&e) => {
                    if start.elapsed() >= timeout {
                        return Err(Error::LockFailed(path.to_path_buf()));
                    }
                    std::thread::sleep(retry_interval);
                }
                Err(e) => return Err(Error::Io(e)),
            }
        }
    }

    /// Try to acquire a lock without waiting
    ///
    /// Returns `Ok(Some(lock))` if acquired, `Ok(None)` if would block.
    pub fn try_acquire(path: impl AsRef<Path>) -> Result<Option<Self>> {
        let path = path.as_ref();
        let file = open_lock_file(path)?;

        match file.try_lock_exclusive() {
            Ok(()) => Ok(Some(FileLock {
                file,
                path: path.to_path_buf(),
            })),
            Err(e) if is_lock_contended(&e) => Ok(None),
            Err(e) => Err(Error::Io(e)),
        }
    }

    /// Get the path to the locked file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

/// Lock file path guarding `path` (`tasks.json` -> `tasks.lock`).
pub fn lock_path_for(path: &Path) -> PathBuf {
    path.with_extension("lock")
}

fn open_lock_file(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)?;
    Ok(file)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Barrier};
    use std::thread;
    use tempfile::tempdir;

    #[test]
    fn lock_is_released_on_drop() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("tasks.lock");

        {
            let lock = FileLock::acquire(&path, 1000).expect("acquire");
            assert_eq!(lock.path(), path.as_path());
        }

        let again = FileLock::try_acquire(&path).expect("try acquire");
        assert!(again.is_some());
    }

    #[test]
    fn timeout_returns_lock_failed() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("held.lock");
        let _held = FileLock::acquire(&path, 1000).expect("first lock");

        let err = FileLock::acquire(&path, 100).expect_err("should time out");
        assert!(matches!(err, Error::LockFailed(_)));
    }

    #[test]
    fn contending_threads_take_turns() {
        let dir = tempdir().expect("tempdir");
        let path = Arc::new(dir.path().join("shared.lock"));
        let barrier = Arc::new(Barrier::new(4));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let path = Arc::clone(&path);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    let _lock = FileLock::acquire(path.as_path(), 5000).expect("acquire");
                    thread::sleep(Duration::from_millis(10));
                })
            })
            .collect();

        for handle in handles {
            handle.join().expect("thread");
        }
    }

    #[test]
    fn lock_path_swaps_extension() {
        let path = Path::new("/tmp/rally/tasks.json");
        assert_eq!(lock_path_for(path), PathBuf::from("/tmp/rally/tasks.lock"));
    }
}
