//! Notification texts (Telegram Markdown, bold via `*`)

use pibackup_common::{Step, format_bytes, format_elapsed_time};
use std::path::Path;
use std::time::Duration;

pub const ROLLING_BACK: &str =
    "*FAIL* - Backup was not completed successfully, rolling back changes...";

pub const CLEANING_DONE: &str = "*Cleaning Done.*";

/// Backslash-escape the characters legacy Markdown treats as entity markers
///
/// Free text such as stderr lines or panic messages routinely contains `_`
/// (image paths do), and an unbalanced marker makes Telegram reject the
/// whole message.
pub fn escape_markdown(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '_' | '*' | '`' | '[') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Inline code span; backticks cannot be escaped inside one, so they go
fn code_span(text: &str) -> String {
    format!("`{}`", text.replace('`', ""))
}

pub fn backup_starting(device: &str) -> String {
    format!("Starting Backup for device: {}...", code_span(device))
}

pub fn step_started(step: Step) -> String {
    format!("*{} process started.*", step.label())
}

pub fn step_completed(step: Step) -> String {
    format!("*{} process completed.*", step.label())
}

pub fn step_timed_out(step: Step) -> String {
    format!("*ERROR*: {} process timed out.", step.label())
}

pub fn step_stalled(step: Step) -> String {
    format!("*ERROR*: {} process stalled.", step.label())
}

pub fn step_failed(step: Step, reason: &str) -> String {
    format!(
        "*ERROR*: {} process failed: {}.",
        step.label(),
        escape_markdown(reason)
    )
}

pub fn step_not_started(step: Step, error: &str) -> String {
    format!(
        "*ERROR*: {} process could not be started: {}.",
        step.label(),
        escape_markdown(error)
    )
}

pub fn stopped(step: Step) -> String {
    format!("*STOPPED* - {} process stopped by signal.", step.label())
}

pub fn unexpected_error(message: &str) -> String {
    format!(
        "Backup failed due to an unexpected error: {}",
        escape_markdown(message)
    )
}

pub fn completed(device: &str, artifact: &Path, size: Option<u64>, elapsed: Duration) -> String {
    let name = artifact
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| artifact.display().to_string());
    let size = size.map(format_bytes).unwrap_or_else(|| "unknown size".to_string());
    format!(
        "*DONE* - Backup for device {} completed successfully.\n{} ({size}) in {}",
        code_span(device),
        code_span(&name),
        format_elapsed_time(elapsed.as_secs())
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_messages() {
        assert_eq!(step_started(Step::Imaging), "*Backup process started.*");
        assert_eq!(
            step_timed_out(Step::Compression),
            "*ERROR*: Compression process timed out."
        );
        assert_eq!(
            stopped(Step::Imaging),
            "*STOPPED* - Backup process stopped by signal."
        );
    }

    #[test]
    fn test_failure_reason_is_markdown_safe() {
        let text = step_failed(
            Step::Imaging,
            "exit code 1: dd: error writing '/mnt/backup/2024-03-09_device1-backup.img': \
             No space left on device",
        );
        assert_eq!(
            text,
            "*ERROR*: Backup process failed: exit code 1: dd: error writing \
             '/mnt/backup/2024-03-09\\_device1-backup.img': No space left on device."
        );
        // No bare underscore left to open an italic entity
        let unescaped = text
            .char_indices()
            .filter(|&(i, c)| c == '_' && !text[..i].ends_with('\\'))
            .count();
        assert_eq!(unescaped, 0);
    }

    #[test]
    fn test_unexpected_error_is_escaped() {
        assert_eq!(
            unexpected_error("bad *glob* in [x] `y` a_b"),
            "Backup failed due to an unexpected error: bad \\*glob\\* in \\[x] \\`y\\` a\\_b"
        );
        assert_eq!(
            step_not_started(Step::Compression, "could not start `gzip_x`"),
            "*ERROR*: Compression process could not be started: could not start \\`gzip\\_x\\`."
        );
    }

    #[test]
    fn test_code_span_drops_backticks() {
        assert_eq!(backup_starting("my_pi"), "Starting Backup for device: `my_pi`...");
        assert_eq!(backup_starting("a`b"), "Starting Backup for device: `ab`...");
    }

    #[test]
    fn test_completed_message() {
        let text = completed(
            "pi4",
            Path::new("/mnt/b/2024-03-09_pi4-backup.img.gz"),
            Some(1536),
            Duration::from_secs(90),
        );
        assert_eq!(
            text,
            "*DONE* - Backup for device `pi4` completed successfully.\n\
             `2024-03-09_pi4-backup.img.gz` (1.50 KiB) in 1m 30s"
        );
    }
}
