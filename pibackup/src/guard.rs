//! Single-instance guard backed by an advisory lock file
//!
//! The lock is taken with a non-blocking exclusive `flock` and released by
//! [`InstanceLock::release`] or, failing that, on drop. Either way the lock
//! file is removed, so a finished run never leaves it behind.
//!
//! The path is unlinked while the lock is still held, and a new holder only
//! counts once the file it locked is still the one at the path. A waiter
//! that locks an unlinked inode retries instead of running alongside
//! whoever recreated the file.

use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GuardError {
    #[error("an instance of pibackup is already running (lock held on `{}`)", path.display())]
    AlreadyRunning { path: PathBuf },
    #[error("could not open or lock `{}`: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Exclusive ownership of the global run slot
#[derive(Debug)]
pub struct InstanceLock {
    path: PathBuf,
    file: Option<File>,
}

impl InstanceLock {
    /// Take the lock at `path`, failing immediately if another holder exists
    pub fn acquire(path: &Path) -> Result<Self, GuardError> {
        let io_error = |source| GuardError::Io {
            path: path.to_path_buf(),
            source,
        };

        let mut file = loop {
            // No truncation before the lock is ours: the holder's pid stays readable
            let file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(false)
                .open(path)
                .map_err(io_error)?;

            if let Err(err) = file.try_lock_exclusive() {
                if err.raw_os_error() == fs2::lock_contended_error().raw_os_error() {
                    return Err(GuardError::AlreadyRunning {
                        path: path.to_path_buf(),
                    });
                }
                return Err(io_error(err));
            }

            if is_linked_at(&file, path).map_err(io_error)? {
                break file;
            }
            log::debug!("Lock file {} was replaced while locking, retrying", path.display());
        };

        // Informational only; a failed write does not cost us the lock
        if let Err(err) = file
            .set_len(0)
            .and_then(|_| writeln!(file, "{}", std::process::id()))
        {
            log::debug!("Could not record pid in {}: {}", path.display(), err);
        }

        log::debug!("Acquired lock {}", path.display());
        Ok(Self {
            path: path.to_path_buf(),
            file: Some(file),
        })
    }

    #[cfg(test)]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Unlock, close and remove the lock file
    pub fn release(mut self) {
        self.release_inner();
    }

    fn release_inner(&mut self) {
        let Some(file) = self.file.take() else {
            return;
        };

        log::info!("Removing lock file...");
        match std::fs::remove_file(&self.path) {
            Ok(()) => log::info!("Lock file removed."),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => log::error!("Failed to remove lock file: {err}"),
        }

        if let Err(err) = FileExt::unlock(&file) {
            log::warn!("Failed to unlock {}: {}", self.path.display(), err);
        }
    }
}

/// Whether `path` still names the inode behind `file`
fn is_linked_at(file: &File, path: &Path) -> std::io::Result<bool> {
    let held = file.metadata()?;
    match std::fs::metadata(path) {
        Ok(current) => Ok(current.dev() == held.dev() && current.ino() == held.ino()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(err) => Err(err),
    }
}

impl Drop for InstanceLock {
    fn drop(&mut self) {
        self.release_inner();
    }
}
