//! Rollback of partial artifacts after a failed run

use crate::messages;
use crate::notifier::Notifier;
use pibackup_common::{BackupTask, CleanupError, RunOutcome, Step};
use std::path::{Path, PathBuf};

pub struct Cleanup<'a> {
    task: &'a BackupTask,
    notifier: &'a dyn Notifier,
}

impl<'a> Cleanup<'a> {
    pub fn new(task: &'a BackupTask, notifier: &'a dyn Notifier) -> Self {
        Self { task, notifier }
    }

    /// The artifact left incomplete by `outcome`, if any
    ///
    /// A failed imaging step leaves a partial raw image. A failed compression
    /// leaves a complete raw image and a partial `.gz`.
    pub fn partial_artifact(&self, outcome: &RunOutcome) -> Option<PathBuf> {
        outcome.failed_step().map(|step| match step {
            Step::Imaging => self.task.image_path(),
            Step::Compression => self.task.compressed_path(),
        })
    }

    /// Delete the partial artifact and report; a no-op on success
    pub fn run(&self, outcome: &RunOutcome) {
        let Some(partial) = self.partial_artifact(outcome) else {
            return;
        };

        if let Err(err) = remove_partial(&partial) {
            log::error!("{err}");
        }

        self.notifier.notify(messages::CLEANING_DONE);
    }
}

/// Best-effort removal; a file that was never created is fine
fn remove_partial(path: &Path) -> Result<(), CleanupError> {
    if !path.exists() {
        log::debug!("No incomplete backup file at {}", path.display());
        return Ok(());
    }

    log::info!("Deleting incomplete backup file {}...", path.display());
    std::fs::remove_file(path).map_err(|source| CleanupError {
        path: path.to_path_buf(),
        source,
    })?;
    log::info!("Incomplete backup file deleted.");
    Ok(())
}
