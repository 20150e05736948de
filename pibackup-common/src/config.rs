// Centralized settings for pibackup

use crate::{DEFAULT_API_BASE, DEFAULT_LOCK_FILE, DEFAULT_SOURCE_DEVICE};
use std::path::PathBuf;
use std::time::Duration;

/// Process-wide settings with support for environment variable overrides
#[derive(Debug, Clone)]
pub struct PiBackupConfig {
    /// Lock file guarding against concurrent runs (default: /tmp/backup_manager.lock)
    pub lock_file: PathBuf,

    /// Persistent log file (default: ~/.local/share/pibackup/backup_manager.log)
    pub log_file: PathBuf,

    /// Block device to image (default: /dev/mmcblk0)
    pub source_device: String,

    /// Telegram Bot API base URL
    pub api_base: String,

    /// Timeout for a single notification request
    pub http_timeout: Duration,

    /// Interval between checks on a running child process
    pub poll_interval: Duration,
}

impl Default for PiBackupConfig {
    fn default() -> Self {
        let log_file = dirs::data_local_dir()
            .map(|dir| dir.join("pibackup").join("backup_manager.log"))
            .unwrap_or_else(|| PathBuf::from("/tmp/pibackup-backup_manager.log"));

        Self {
            lock_file: PathBuf::from(DEFAULT_LOCK_FILE),
            log_file,
            source_device: DEFAULT_SOURCE_DEVICE.to_string(),
            api_base: DEFAULT_API_BASE.to_string(),
            http_timeout: Duration::from_secs(30),
            poll_interval: Duration::from_secs(5),
        }
    }
}

impl PiBackupConfig {
    /// Create a new configuration with environment variable overrides
    ///
    /// Supported environment variables:
    /// - PIBACKUP_LOCK_FILE: Override lock file path
    /// - PIBACKUP_LOG_FILE: Override log file path
    /// - PIBACKUP_SOURCE_DEVICE: Override the device to image
    /// - PIBACKUP_API_BASE: Override the Bot API base URL
    /// - PIBACKUP_HTTP_TIMEOUT_SECS: Override the notification request timeout
    /// - PIBACKUP_POLL_INTERVAL_SECS: Override the process polling interval
    pub fn new() -> Self {
        let mut config = Self::default();

        if let Ok(file) = std::env::var("PIBACKUP_LOCK_FILE") {
            config.lock_file = PathBuf::from(file);
        }

        if let Ok(file) = std::env::var("PIBACKUP_LOG_FILE") {
            config.log_file = PathBuf::from(file);
        }

        if let Ok(device) = std::env::var("PIBACKUP_SOURCE_DEVICE") {
            config.source_device = device;
        }

        if let Ok(base) = std::env::var("PIBACKUP_API_BASE") {
            config.api_base = base.trim_end_matches('/').to_string();
        }

        if let Some(secs) = env_secs("PIBACKUP_HTTP_TIMEOUT_SECS") {
            config.http_timeout = Duration::from_secs(secs);
        }

        if let Some(secs) = env_secs("PIBACKUP_POLL_INTERVAL_SECS").filter(|secs| *secs > 0) {
            config.poll_interval = Duration::from_secs(secs);
        }

        config
    }
}

fn env_secs(name: &str) -> Option<u64> {
    let value = std::env::var(name).ok()?;
    match value.trim().parse::<u64>() {
        Ok(secs) => Some(secs),
        Err(_) => {
            log::warn!("Ignoring {name}={value}: not a number of seconds");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PiBackupConfig::default();
        assert_eq!(config.lock_file, PathBuf::from("/tmp/backup_manager.lock"));
        assert_eq!(config.source_device, "/dev/mmcblk0");
        assert_eq!(config.api_base, "https://api.telegram.org");
        assert_eq!(config.poll_interval, Duration::from_secs(5));
        assert!(config.log_file.ends_with("backup_manager.log"));
    }
}
