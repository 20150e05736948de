//! Wiring from parsed arguments to a finished run and its exit code

use crate::cli::Cli;
use crate::clock::{CancelToken, Clock, SystemClock};
use crate::notifier::{Notifier, TelegramNotifier};
use crate::orchestrator::Orchestrator;
use pibackup_common::{BackupTask, Credentials, PiBackupConfig};
use std::path::PathBuf;
use std::sync::Arc;

pub const EXIT_SUCCESS: i32 = 0;
/// Bad configuration or another instance holds the lock
pub const EXIT_CONFIG: i32 = 1;
/// The pipeline ran and failed, or was interrupted
pub const EXIT_FAILURE: i32 = 2;

/// Load credentials, validate the task and run the pipeline
///
/// Configuration problems are reported before the lock is ever touched.
pub fn execute(cli: &Cli, config: &PiBackupConfig, cancel: CancelToken) -> i32 {
    let credentials = match Credentials::load(&cli.config_file) {
        Ok(credentials) => credentials,
        Err(err) => {
            log::error!("{err}");
            return EXIT_CONFIG;
        }
    };

    let task = cli.task(config);
    if let Err(err) = task.validate() {
        log::error!("{err}");
        return EXIT_CONFIG;
    }

    let notifier = match TelegramNotifier::new(credentials, &config.api_base, config.http_timeout) {
        Ok(notifier) => notifier,
        Err(err) => {
            log::error!("Failed to set up the Telegram client: {err}");
            return EXIT_CONFIG;
        }
    };

    run_pipeline(
        task,
        config.lock_file.clone(),
        Arc::new(notifier),
        Arc::new(SystemClock),
        cancel,
    )
}

/// Run one backup and map its result to an exit code
pub fn run_pipeline(
    task: BackupTask,
    lock_path: PathBuf,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    cancel: CancelToken,
) -> i32 {
    log::info!(
        "Backing up {} as `{}` to {} (compression: {})",
        task.source_device,
        task.device_name,
        task.destination.display(),
        task.compression_mode.as_str()
    );

    let mut orchestrator = Orchestrator::new(task, lock_path, notifier, clock, cancel);
    match orchestrator.run() {
        Ok(summary) if summary.outcome.is_success() => EXIT_SUCCESS,
        Ok(summary) => {
            log::error!("Backup finished in state {}: {}", summary.state, summary.outcome);
            EXIT_FAILURE
        }
        Err(_) => EXIT_CONFIG,
    }
}
