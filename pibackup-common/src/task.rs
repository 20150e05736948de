//! The backup task: what to image, where to, and with which commands

use crate::error::ConfigError;
use crate::validation::validate_device_name;
use chrono::NaiveDate;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::str::FromStr;
use std::time::Duration;

/// An external command, spawned directly without a shell
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandLine {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn to_command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command.args(&self.args);
        command
    }
}

impl std::fmt::Display for CommandLine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// How gzip treats the raw image
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CompressionMode {
    /// `gzip -k`: the raw image and its `.gz` sibling are both kept
    #[default]
    Keep,
    /// Plain `gzip`: the raw image is replaced once compression succeeds
    Replace,
}

impl CompressionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompressionMode::Keep => "keep",
            CompressionMode::Replace => "replace",
        }
    }
}

impl FromStr for CompressionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "keep" => Ok(CompressionMode::Keep),
            "replace" => Ok(CompressionMode::Replace),
            other => Err(format!("unknown compression mode `{other}` (expected keep or replace)")),
        }
    }
}

/// One backup run, built once from CLI input and immutable afterwards
#[derive(Debug, Clone)]
pub struct BackupTask {
    pub destination: PathBuf,
    pub device_name: String,
    pub source_device: String,
    pub timeout: Duration,
    pub poll_interval: Duration,
    pub block_size: u64,
    pub stall_detection: bool,
    pub compression_mode: CompressionMode,
    pub date: NaiveDate,
    pub imaging: CommandLine,
    pub compression: CommandLine,
}

impl BackupTask {
    pub fn builder(destination: impl Into<PathBuf>) -> BackupTaskBuilder {
        BackupTaskBuilder::new(destination.into())
    }

    /// Raw image: `<dest>/<YYYY-MM-DD>_<device>-backup.img`
    pub fn image_path(&self) -> PathBuf {
        image_path(&self.destination, &self.device_name, self.date)
    }

    /// Compressed sibling of the raw image
    pub fn compressed_path(&self) -> PathBuf {
        gz_sibling(&self.image_path())
    }

    /// Check the destination directory and the device name
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_device_name(&self.device_name).map_err(ConfigError::InvalidDeviceName)?;

        if !self.destination.is_dir() {
            return Err(ConfigError::InvalidDestination {
                path: self.destination.clone(),
                reason: "does not exist or is not a directory".to_string(),
            });
        }

        Ok(())
    }
}

fn image_path(destination: &Path, device_name: &str, date: NaiveDate) -> PathBuf {
    destination.join(format!(
        "{}_{}-backup.img",
        date.format("%Y-%m-%d"),
        device_name
    ))
}

fn gz_sibling(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".gz");
    PathBuf::from(name)
}

/// Builder for [`BackupTask`]
///
/// The imaging and compression commands are derived from the other fields
/// at `build()` time unless replaced explicitly.
#[derive(Debug, Clone)]
pub struct BackupTaskBuilder {
    destination: PathBuf,
    device_name: String,
    source_device: String,
    timeout: Duration,
    poll_interval: Duration,
    block_size: u64,
    stall_detection: bool,
    compression_mode: CompressionMode,
    use_sudo: bool,
    date: Option<NaiveDate>,
    imaging: Option<CommandLine>,
    compression: Option<CommandLine>,
}

impl BackupTaskBuilder {
    fn new(destination: PathBuf) -> Self {
        Self {
            destination,
            device_name: "device1".to_string(),
            source_device: crate::DEFAULT_SOURCE_DEVICE.to_string(),
            timeout: Duration::from_secs(3600),
            poll_interval: Duration::from_secs(5),
            block_size: 4096,
            stall_detection: true,
            compression_mode: CompressionMode::Keep,
            use_sudo: false,
            date: None,
            imaging: None,
            compression: None,
        }
    }

    pub fn device_name(mut self, name: impl Into<String>) -> Self {
        self.device_name = name.into();
        self
    }

    pub fn source_device(mut self, device: impl Into<String>) -> Self {
        self.source_device = device.into();
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn block_size(mut self, bytes: u64) -> Self {
        self.block_size = bytes;
        self
    }

    pub fn stall_detection(mut self, enabled: bool) -> Self {
        self.stall_detection = enabled;
        self
    }

    pub fn compression_mode(mut self, mode: CompressionMode) -> Self {
        self.compression_mode = mode;
        self
    }

    /// Prefix the imaging command with `sudo`
    pub fn use_sudo(mut self, enabled: bool) -> Self {
        self.use_sudo = enabled;
        self
    }

    /// Date stamped into the image file name (default: today, local time)
    pub fn date(mut self, date: NaiveDate) -> Self {
        self.date = Some(date);
        self
    }

    pub fn imaging_command(mut self, command: CommandLine) -> Self {
        self.imaging = Some(command);
        self
    }

    pub fn compression_command(mut self, command: CommandLine) -> Self {
        self.compression = Some(command);
        self
    }

    pub fn build(self) -> BackupTask {
        let date = self
            .date
            .unwrap_or_else(|| chrono::Local::now().date_naive());
        let image = image_path(&self.destination, &self.device_name, date);
        let image_arg = image.to_string_lossy().to_string();

        let imaging = self.imaging.unwrap_or_else(|| {
            let dd = [
                format!("if={}", self.source_device),
                format!("of={image_arg}"),
                format!("bs={}", self.block_size),
            ];
            if self.use_sudo {
                CommandLine::new("sudo").arg("dd").args(dd)
            } else {
                CommandLine::new("dd").args(dd)
            }
        });

        let compression = self.compression.unwrap_or_else(|| match self.compression_mode {
            CompressionMode::Keep => CommandLine::new("gzip").args(["-k", "-f", image_arg.as_str()]),
            CompressionMode::Replace => CommandLine::new("gzip").args(["-f", image_arg.as_str()]),
        });

        BackupTask {
            destination: self.destination,
            device_name: self.device_name,
            source_device: self.source_device,
            timeout: self.timeout,
            poll_interval: self.poll_interval,
            block_size: self.block_size,
            stall_detection: self.stall_detection,
            compression_mode: self.compression_mode,
            date,
            imaging,
            compression,
        }
    }
}
