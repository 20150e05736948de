//! Error taxonomy shared by the pipeline components
//!
//! Only [`ConfigError`] ever stops the program before a run starts. The other
//! kinds are logged and folded into a [`crate::RunOutcome`] or swallowed.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Failure to load the bot credentials or the task settings
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("the config file does not exist `{}`", .0.display())]
    NotFound(PathBuf),
    #[error("failed to read config file `{}`: {source}", path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed config line {line}: {content}")]
    Malformed { line: usize, content: String },
    #[error("section [{0}] not found in config file")]
    MissingSection(String),
    #[error("Telegram bot token or chat ID not found: missing `{0}`")]
    MissingKey(String),
    #[error("invalid backup destination `{}`: {reason}", path.display())]
    InvalidDestination { path: PathBuf, reason: String },
    #[error("invalid device name: {0}")]
    InvalidDeviceName(String),
}

/// Failure to deliver a chat notification (always non-fatal)
#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("notification rejected with status code {0}")]
    Status(u16),
    #[error("notification transport failed: {0}")]
    Transport(String),
}

/// Failure while running an external command
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("could not start `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("timed out after {}s", .0.as_secs())]
    Timeout(Duration),
    #[error("no output growth for {}s", .0.as_secs())]
    Stall(Duration),
    #[error("{0}")]
    Exit(String),
    #[error("stopped by signal")]
    Interrupted,
}

/// Failure to delete a partial artifact (best effort, never escalated)
#[derive(Debug, Error)]
#[error("failed to delete incomplete backup file `{}`: {source}", path.display())]
pub struct CleanupError {
    pub path: PathBuf,
    #[source]
    pub source: std::io::Error,
}
