//! Formatting utilities for notification and log text

/// Format bytes as human-readable size using binary units (KiB, MiB, GiB)
///
/// # Examples
/// ```
/// use pibackup_common::format_bytes;
/// assert_eq!(format_bytes(1024), "1.00 KiB");
/// assert_eq!(format_bytes(15_931_539_456), "14.84 GiB");
/// ```
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KiB", "MiB", "GiB", "TiB"];
    let mut size = bytes as f64;
    let mut unit_idx = 0;

    while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
        size /= 1024.0;
        unit_idx += 1;
    }

    format!("{size:.2} {}", UNITS[unit_idx])
}

/// Format elapsed seconds the way run summaries show them
///
/// # Examples
/// ```
/// use pibackup_common::format_elapsed_time;
/// assert_eq!(format_elapsed_time(90), "1m 30s");
/// assert_eq!(format_elapsed_time(3665), "1h 1m");
/// ```
pub fn format_elapsed_time(seconds: u64) -> String {
    if seconds < 60 {
        return format!("{seconds}s");
    }
    if seconds < 3600 {
        let (mins, secs) = (seconds / 60, seconds % 60);
        return if secs == 0 {
            format!("{mins}m")
        } else {
            format!("{mins}m {secs}s")
        };
    }
    let (hours, mins) = (seconds / 3600, (seconds % 3600) / 60);
    if mins == 0 {
        format!("{hours}h")
    } else {
        format!("{hours}h {mins}m")
    }
}
