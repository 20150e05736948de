//! The backup run: lock, image, compress, report, roll back, unlock
//!
//! ```text
//! Idle -> Locked -> Imaging -> Compressing -> Done
//!                      \            \
//!                       +-> Cleaning +-> Done (failure) | Aborted (interrupt)
//! ```
//!
//! Lock contention goes straight from Idle to Aborted.

use crate::audit;
use crate::cleanup::Cleanup;
use crate::clock::{CancelToken, Clock};
use crate::guard::{GuardError, InstanceLock};
use crate::messages;
use crate::notifier::Notifier;
use crate::runner::ProcessRunner;
use pibackup_common::{BackupTask, PipelineState, RunOutcome, Step};
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Result of a completed run
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub outcome: RunOutcome,
    pub state: PipelineState,
    pub elapsed: Duration,
    /// Final artifact on success
    pub artifact: Option<PathBuf>,
    pub artifact_size: Option<u64>,
}

pub struct Orchestrator {
    task: BackupTask,
    lock_path: PathBuf,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    cancel: CancelToken,
    state: PipelineState,
}

impl Orchestrator {
    pub fn new(
        task: BackupTask,
        lock_path: PathBuf,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
        cancel: CancelToken,
    ) -> Self {
        Self {
            task,
            lock_path,
            notifier,
            clock,
            cancel,
            state: PipelineState::Idle,
        }
    }

    #[cfg(test)]
    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Execute the whole pipeline once
    ///
    /// Returns `Err` only when the lock could not be taken; every failure
    /// after that is reported through [`RunSummary::outcome`]. The lock is
    /// released before this returns on every path.
    pub fn run(&mut self) -> Result<RunSummary, GuardError> {
        let started = self.clock.now();

        let lock = match InstanceLock::acquire(&self.lock_path) {
            Ok(lock) => lock,
            Err(err) => {
                match &err {
                    GuardError::AlreadyRunning { .. } => {
                        log::error!("An instance of this script is already running: {err}. Exiting...")
                    }
                    GuardError::Io { .. } => {
                        log::error!("Could not open or create lock file: {err}. Exiting...")
                    }
                }
                self.transition(PipelineState::Aborted);
                return Err(err);
            }
        };
        self.transition(PipelineState::Locked);

        let outcome = self.execute();

        let mut artifact = None;
        let mut artifact_size = None;
        if outcome.is_success() {
            let path = self.task.compressed_path();
            artifact_size = std::fs::metadata(&path).ok().map(|m| m.len());
            let elapsed = self.clock.now().saturating_duration_since(started);
            self.report_success(&path, artifact_size, elapsed);
            artifact = Some(path);
            self.transition(PipelineState::Done);
        } else {
            self.roll_back(&outcome);
            if matches!(outcome, RunOutcome::Interrupted { .. }) {
                self.transition(PipelineState::Aborted);
            } else {
                self.transition(PipelineState::Done);
            }
        }

        lock.release();

        let summary = RunSummary {
            outcome,
            state: self.state,
            elapsed: self.clock.now().saturating_duration_since(started),
            artifact,
            artifact_size,
        };
        audit::log_run(&self.task, &summary);
        Ok(summary)
    }

    /// Imaging then compression, stopping at the first non-success
    fn execute(&mut self) -> RunOutcome {
        let runner = ProcessRunner::new(
            self.notifier.clone(),
            self.clock.clone(),
            self.cancel.clone(),
        );

        if self.cancel.is_cancelled() {
            return RunOutcome::Interrupted {
                step: Step::Imaging,
            };
        }
        self.transition(PipelineState::Imaging);
        self.notifier
            .notify(&messages::backup_starting(&self.task.device_name));
        let imaging = self.guarded(Step::Imaging, || runner.run_imaging(&self.task));
        if !imaging.is_success() {
            return imaging;
        }

        if self.cancel.is_cancelled() {
            return RunOutcome::Interrupted {
                step: Step::Compression,
            };
        }
        self.transition(PipelineState::Compressing);
        self.guarded(Step::Compression, || {
            runner.run_compression(&self.task, self.task.timeout)
        })
    }

    /// Turn a panic inside a step into an outcome that still gets cleaned up
    fn guarded(&self, step: Step, f: impl FnOnce() -> RunOutcome) -> RunOutcome {
        match panic::catch_unwind(AssertUnwindSafe(f)) {
            Ok(outcome) => outcome,
            Err(payload) => {
                let message = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "panic in backup step".to_string());
                log::error!("Unexpected error: {message}");
                RunOutcome::UnexpectedError { step, message }
            }
        }
    }

    fn report_success(&self, artifact: &Path, size: Option<u64>, elapsed: Duration) {
        log::info!(
            "DONE - Backup for device `{}` completed successfully.",
            self.task.device_name
        );
        self.notifier.notify(&messages::completed(
            &self.task.device_name,
            artifact,
            size,
            elapsed,
        ));
    }

    fn roll_back(&mut self, outcome: &RunOutcome) {
        self.transition(PipelineState::Cleaning);

        match outcome {
            RunOutcome::Interrupted { step } => {
                log::error!("{} process stopped by signal.", step.label());
                self.notifier.notify(&messages::stopped(*step));
            }
            RunOutcome::UnexpectedError { message, .. } => {
                self.notifier.notify(&messages::unexpected_error(message));
            }
            _ => {}
        }

        if !matches!(outcome, RunOutcome::Interrupted { .. }) {
            log::info!("FAIL - Backup was not completed successfully ({outcome}), rolling back changes...");
            self.notifier.notify(messages::ROLLING_BACK);
        }

        Cleanup::new(&self.task, self.notifier.as_ref()).run(outcome);
    }

    fn transition(&mut self, next: PipelineState) {
        debug_assert!(!self.state.is_terminal(), "transition out of {}", self.state);
        log::info!("State: {} -> {}", self.state, next);
        self.state = next;
    }
}
