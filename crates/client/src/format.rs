//! Pure formatting helpers used by the view layer. No I/O, no state.

use chrono::{DateTime, Utc};

const UNITS: &[&str] = &["B", "KiB", "MiB", "GiB", "TiB", "PiB"];

/// Format a byte count as a human-scaled size, e.g. `1536` -> `"1.5 KiB"`.
pub fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        return format!("{bytes} B");
    }
    let mut value = bytes as f64;
    let mut unit_idx = 0;
    while value >= 1024.0 && unit_idx < UNITS.len() - 1 {
        value /= 1024.0;
        unit_idx += 1;
    }
    format!("{value:.1} {}", UNITS[unit_idx])
}

/// Format a byte-per-second rate using the same scale as [`format_bytes`].
pub fn format_speed(bytes_per_sec: f64) -> String {
    if !bytes_per_sec.is_finite() || bytes_per_sec < 0.0 {
        return "0 B/s".to_string();
    }
    format!("{}/s", format_bytes(bytes_per_sec as u64))
}

/// Render a percentage in `[0, 100]` from a `current`/`total` pair, treating
/// `total == 0` as fully complete.
pub fn format_percent(current: u64, total: u64) -> u16 {
    if total == 0 {
        return 100;
    }
    ((current.saturating_mul(100) / total).min(100)) as u16
}

/// Timestamp for filenames and the CloudInfo screen, matching the
/// `YYYY-MM-DD-HH-MM-SS` shape used by the object-list generator.
pub fn format_timestamp_for_filename(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d-%H-%M-%S").to_string()
}

pub fn format_timestamp_display(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_sizes_are_shown_in_bytes() {
        assert_eq!(format_bytes(0), "0 B");
        assert_eq!(format_bytes(1023), "1023 B");
    }

    #[test]
    fn sizes_scale_up_through_units() {
        assert_eq!(format_bytes(1536), "1.5 KiB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.0 MiB");
    }

    #[test]
    fn percent_is_saturated_and_handles_zero_total() {
        assert_eq!(format_percent(0, 0), 100);
        assert_eq!(format_percent(50, 100), 50);
        assert_eq!(format_percent(200, 100), 100);
    }
}
