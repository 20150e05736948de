//! Logging: console through env_logger plus a persistent file sink
//!
//! The console honours `RUST_LOG` (or `-v`) and shows `target - LEVEL - msg`.
//! The file always records debug and above from this program, timestamped.

use anyhow::{Context, Result};
use chrono::Local;
use log::{LevelFilter, Log, Metadata, Record};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

const FILE_LEVEL: LevelFilter = LevelFilter::Debug;

struct DualLogger {
    console: env_logger::Logger,
    file: Option<Mutex<File>>,
}

impl DualLogger {
    fn file_accepts(&self, metadata: &Metadata) -> bool {
        self.file.is_some() && metadata.level() <= FILE_LEVEL && is_own_target(metadata.target())
    }
}

/// Dependencies (reqwest, hyper) stay out of the file
fn is_own_target(target: &str) -> bool {
    target.starts_with("pibackup") || target == "audit"
}

impl Log for DualLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        self.console.enabled(metadata) || self.file_accepts(metadata)
    }

    fn log(&self, record: &Record) {
        if self.console.matches(record) {
            self.console.log(record);
        }

        if !self.file_accepts(record.metadata()) {
            return;
        }
        if let Some(file) = &self.file {
            let mut file = file.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            let _ = writeln!(
                file,
                "{} - {} - {} - {}",
                Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.target(),
                record.level(),
                record.args()
            );
        }
    }

    fn flush(&self) {
        self.console.flush();
        if let Some(file) = &self.file {
            let mut file = file.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            let _ = file.flush();
        }
    }
}

/// Console level for a `-v` count when `RUST_LOG` is unset
pub fn console_level(verbose: u8) -> LevelFilter {
    match verbose {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

fn console_logger(verbose: u8) -> env_logger::Logger {
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(console_level(verbose).to_string()),
    )
    .format(|buf, record| {
        writeln!(buf, "{} - {} - {}", record.target(), record.level(), record.args())
    })
    .build()
}

fn open_log_file(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create log directory {}", parent.display()))?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open log file {}", path.display()))
}

/// Install the global logger
///
/// A log file that cannot be opened downgrades to console-only logging.
pub fn init(verbose: u8, log_file: &Path) -> Result<()> {
    let console = console_logger(verbose);

    let (file, file_error) = match open_log_file(log_file) {
        Ok(file) => (Some(Mutex::new(file)), None),
        Err(err) => (None, Some(err)),
    };

    let max_level = if file.is_some() {
        console.filter().max(FILE_LEVEL)
    } else {
        console.filter()
    };

    log::set_boxed_logger(Box::new(DualLogger { console, file }))
        .context("Logger already initialized")?;
    log::set_max_level(max_level);

    match file_error {
        Some(err) => log::warn!("Logging to console only: {err:#}"),
        None => log::debug!("Logging to {}", log_file.display()),
    }

    Ok(())
}
