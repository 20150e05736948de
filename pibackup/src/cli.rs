//! Command-line interface

use clap::{ArgAction, Parser};
use pibackup_common::{BackupTask, CompressionMode, PiBackupConfig};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(
    name = "pibackup",
    version,
    about = "Image an SD card, gzip it and report progress to Telegram"
)]
pub struct Cli {
    /// Directory the image is written to
    #[arg(long = "backup-dest", alias = "backup_dest")]
    pub backup_dest: PathBuf,

    /// INI file with a [Telegram] section holding bot_token and chat_id
    #[arg(long = "config-file", alias = "config_file")]
    pub config_file: PathBuf,

    /// Name used in notifications and in the image file name
    #[arg(long = "device-name", alias = "device_name", default_value = "device1")]
    pub device_name: String,

    /// Timeout for each of the backup and compression commands, in seconds
    #[arg(long, default_value_t = 3600, value_parser = clap::value_parser!(u64).range(1..))]
    pub timeout: u64,

    /// Block size for dd, in bytes
    #[arg(
        long = "block-size",
        alias = "block_size",
        default_value_t = 4096,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub block_size: u64,

    /// Seconds between progress checks [default: 5]
    #[arg(long = "poll-interval", value_parser = clap::value_parser!(u64).range(1..))]
    pub poll_interval: Option<u64>,

    /// Block device to image [default: /dev/mmcblk0]
    #[arg(long = "source-device")]
    pub source_device: Option<String>,

    /// keep: retain the raw image next to the .gz; replace: keep only the .gz
    #[arg(long, default_value = "keep")]
    pub compression: CompressionMode,

    /// Do not abort when the image stops growing between checks
    #[arg(long = "no-stall-check")]
    pub no_stall_check: bool,

    /// Log file path (overrides PIBACKUP_LOG_FILE)
    #[arg(long = "log-file")]
    pub log_file: Option<PathBuf>,

    /// Increase console verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    /// Build the backup task, CLI flags taking precedence over settings
    pub fn task(&self, config: &PiBackupConfig) -> BackupTask {
        let poll_interval = self
            .poll_interval
            .map(Duration::from_secs)
            .unwrap_or(config.poll_interval);

        BackupTask::builder(&self.backup_dest)
            .device_name(&self.device_name)
            .source_device(
                self.source_device
                    .clone()
                    .unwrap_or_else(|| config.source_device.clone()),
            )
            .timeout(Duration::from_secs(self.timeout))
            .poll_interval(poll_interval)
            .block_size(self.block_size)
            .stall_detection(!self.no_stall_check)
            .compression_mode(self.compression)
            .use_sudo(!nix::unistd::geteuid().is_root())
            .build()
    }

    pub fn log_file(&self, config: &PiBackupConfig) -> PathBuf {
        self.log_file
            .clone()
            .unwrap_or_else(|| config.log_file.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_clap_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_defaults() {
        let cli = Cli::parse_from(["pibackup", "--backup-dest", "/mnt/b", "--config-file", "/etc/t.ini"]);
        assert_eq!(cli.device_name, "device1");
        assert_eq!(cli.timeout, 3600);
        assert_eq!(cli.block_size, 4096);
        assert_eq!(cli.compression, CompressionMode::Keep);
        assert!(!cli.no_stall_check);

        let task = cli.task(&PiBackupConfig::default());
        assert_eq!(task.timeout, Duration::from_secs(3600));
        assert_eq!(task.poll_interval, Duration::from_secs(5));
        assert_eq!(task.source_device, "/dev/mmcblk0");
        assert!(task.imaging.args.iter().any(|a| a == "bs=4096"));
    }

    #[test]
    fn test_underscore_aliases() {
        let cli = Cli::parse_from([
            "pibackup",
            "--backup_dest",
            "/mnt/b",
            "--config_file",
            "/etc/t.ini",
            "--device_name",
            "kitchen",
            "--block_size",
            "1048576",
            "--timeout",
            "120",
            "--compression",
            "replace",
            "--no-stall-check",
        ]);
        let task = cli.task(&PiBackupConfig::default());
        assert_eq!(task.device_name, "kitchen");
        assert_eq!(task.block_size, 1_048_576);
        assert_eq!(task.timeout, Duration::from_secs(120));
        assert_eq!(task.compression_mode, CompressionMode::Replace);
        assert!(!task.stall_detection);
    }

    #[test]
    fn test_required_flags() {
        assert!(Cli::try_parse_from(["pibackup", "--backup-dest", "/mnt/b"]).is_err());
        assert!(
            Cli::try_parse_from([
                "pibackup",
                "--backup-dest",
                "/b",
                "--config-file",
                "/c",
                "--timeout",
                "0"
            ])
            .is_err()
        );
    }
}
