use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::error::{LockError, UtilError};
use crate::Result;

const LOCK_SUFFIX: &str = ".lock";

/// RAII guard over a pending atomic file replacement.
///
/// Holding the guard means `<path>.lock` exists and was created with
/// O_CREAT|O_EXCL, so at most one writer prepares a replacement at a time.
/// New contents are written into the lock file; `commit` renames it over
/// the target in one step. Dropping an uncommitted guard removes the lock
/// file and leaves the target untouched.
pub struct Lockfile {
    /// Final destination (no suffix).
    target: PathBuf,
    /// The `.lock` sibling actually being written.
    lock_path: PathBuf,
    handle: Option<File>,
    committed: bool,
}

impl Lockfile {
    /// Take the lock for `target`, creating `<target>.lock` exclusively.
    ///
    /// Fails with [`LockError::AlreadyHeld`] when another writer owns the
    /// lock file.
    pub fn hold(target: impl AsRef<Path>) -> Result<Self> {
        let target = target.as_ref().to_path_buf();
        let lock_path = PathBuf::from(format!("{}{}", target.display(), LOCK_SUFFIX));

        let handle = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&lock_path)
            .map_err(|e| {
                if e.kind() == io::ErrorKind::AlreadyExists {
                    UtilError::Lock(LockError::AlreadyHeld {
                        path: lock_path.clone(),
                    })
                } else {
                    UtilError::Lock(LockError::Create {
                        path: lock_path.clone(),
                        source: e,
                    })
                }
            })?;

        Ok(Self {
            target,
            lock_path,
            handle: Some(handle),
            committed: false,
        })
    }

    /// Non-blocking variant: `Ok(None)` when the lock is already held.
    pub fn try_hold(target: impl AsRef<Path>) -> Result<Option<Self>> {
        match Self::hold(target) {
            Ok(guard) => Ok(Some(guard)),
            Err(UtilError::Lock(LockError::AlreadyHeld { .. })) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// The final destination path (no `.lock` suffix).
    pub fn target(&self) -> &Path {
        &self.target
    }

    /// The lock file path.
    pub fn lock_path(&self) -> &Path {
        &self.lock_path
    }

    /// Flush, sync, and atomically rename the lock file over the target.
    pub fn commit(mut self) -> Result<()> {
        if let Some(ref mut handle) = self.handle {
            handle
                .flush()
                .and_then(|_| handle.sync_all())
                .map_err(|e| {
                    UtilError::Lock(LockError::Commit {
                        path: self.lock_path.clone(),
                        source: e,
                    })
                })?;
        }
        self.handle.take();

        fs::rename(&self.lock_path, &self.target).map_err(|e| {
            UtilError::Lock(LockError::Commit {
                path: self.lock_path.clone(),
                source: e,
            })
        })?;

        self.committed = true;
        Ok(())
    }

    /// Drop the pending write, removing the lock file.
    pub fn abort(mut self) -> Result<()> {
        self.handle.take();
        if self.lock_path.exists() {
            fs::remove_file(&self.lock_path)?;
        }
        self.committed = true;
        Ok(())
    }
}

impl Write for Lockfile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.handle
            .as_mut()
            .ok_or_else(|| io::Error::other("lock file already closed"))?
            .write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.handle
            .as_mut()
            .ok_or_else(|| io::Error::other("lock file already closed"))?
            .flush()
    }
}

impl Drop for Lockfile {
    fn drop(&mut self) {
        if !self.committed {
            self.handle.take();
            let _ = fs::remove_file(&self.lock_path);
        }
    }
}
