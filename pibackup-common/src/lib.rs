// Shared types and utilities for pibackup

pub mod config;
pub mod credentials;
pub mod error;
pub mod format;
pub mod outcome;
pub mod task;
pub mod validation;

pub use config::PiBackupConfig;
pub use credentials::Credentials;
pub use error::{CleanupError, ConfigError, NotificationError, ProcessError};
pub use format::{format_bytes, format_elapsed_time};
pub use outcome::{PipelineState, RunOutcome, Step};
pub use task::{BackupTask, CommandLine, CompressionMode};
pub use validation::validate_device_name;

/// Section of the credentials file holding the bot settings
pub const CREDENTIALS_SECTION: &str = "Telegram";

/// Default lock file guarding against concurrent runs
pub const DEFAULT_LOCK_FILE: &str = "/tmp/backup_manager.lock";

/// Default Telegram Bot API endpoint
pub const DEFAULT_API_BASE: &str = "https://api.telegram.org";

/// Default device to image (Raspberry Pi SD card)
pub const DEFAULT_SOURCE_DEVICE: &str = "/dev/mmcblk0";
