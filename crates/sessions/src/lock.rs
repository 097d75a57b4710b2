//! Advisory cross-process lock around session file access.

use std::{
    fs::OpenOptions,
    io::{self, ErrorKind},
    path::{Path, PathBuf},
};

use {fd_lock::RwLock, tracing::trace};

#[derive(Debug, thiserror::Error)]
pub enum LockError {
    /// Another process (or another handle in this one) holds the lock.
    #[error("session file is locked: {}", path.display())]
    Busy { path: PathBuf },

    #[error("session lock {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Run `f` while holding an exclusive lock on `lock_path`.
///
/// Never blocks: contention returns [`LockError::Busy`] so the caller can
/// decide how to back off. Errors from `f` are reported as [`LockError::Io`].
pub fn with_session_lock<T>(
    lock_path: &Path,
    f: impl FnOnce() -> io::Result<T>,
) -> Result<T, LockError> {
    let io_err = |source| LockError::Io {
        path: lock_path.to_path_buf(),
        source,
    };

    if let Some(parent) = lock_path.parent() {
        std::fs::create_dir_all(parent).map_err(io_err)?;
    }
    let file = OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(lock_path)
        .map_err(io_err)?;

    let mut lock = RwLock::new(file);
    let _guard = match lock.try_write() {
        Ok(guard) => guard,
        Err(e) if e.kind() == ErrorKind::WouldBlock => {
            return Err(LockError::Busy {
                path: lock_path.to_path_buf(),
            });
        },
        Err(e) => return Err(io_err(e)),
    };
    trace!(path = %lock_path.display(), "session lock acquired");

    f().map_err(io_err)
}
