// pibackup - SD card imaging with Telegram progress notifications
// Runs one backup per invocation; meant to be started from cron or a timer

mod app;
mod audit;
mod cleanup;
mod cli;
mod clock;
mod guard;
mod logging;
mod messages;
mod notifier;
mod orchestrator;
mod runner;
#[cfg(test)]
mod test_support;

use clap::Parser;
use clock::CancelToken;
use pibackup_common::PiBackupConfig;
use tokio::signal::unix::{SignalKind, signal};

#[tokio::main]
async fn main() {
    let cli = cli::Cli::parse();
    let config = PiBackupConfig::new();

    if let Err(e) = logging::init(cli.verbose, &cli.log_file(&config)) {
        eprintln!("pibackup: {e:#}");
    }

    log::info!("Starting pibackup v{}", env!("CARGO_PKG_VERSION"));

    let cancel = CancelToken::new();
    if let Err(e) = listen_for_signals(cancel.clone()) {
        log::error!("Failed to install signal handlers: {e}");
        std::process::exit(app::EXIT_CONFIG);
    }

    // The pipeline blocks on child processes and HTTP; keep it off the runtime
    let code = match tokio::task::spawn_blocking(move || app::execute(&cli, &config, cancel)).await
    {
        Ok(code) => code,
        Err(e) => {
            log::error!("Backup task failed: {e}");
            app::EXIT_FAILURE
        }
    };

    log::logger().flush();
    std::process::exit(code);
}

/// Flip `cancel` on the first SIGINT or SIGTERM
///
/// The handlers stay installed afterwards, so further signals are absorbed
/// while the pipeline cleans up instead of killing it half way.
fn listen_for_signals(cancel: CancelToken) -> std::io::Result<()> {
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    tokio::spawn(async move {
        tokio::select! {
            _ = sigterm.recv() => log::warn!("Received SIGTERM, stopping backup..."),
            _ = sigint.recv() => log::warn!("Received SIGINT, stopping backup..."),
        }
        cancel.cancel();
    });

    Ok(())
}
