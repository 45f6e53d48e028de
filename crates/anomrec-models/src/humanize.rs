//! Human-readable formatting for status lines and the event log.

use chrono::{DateTime, TimeZone};
use std::fmt::Display;

const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];

/// Format a byte count with binary units: `512 B`, `3 KB`, `2.5 GB`.
///
/// Bytes and kilobytes are whole numbers; from megabytes upward one decimal
/// is kept unless it is zero.
pub fn format_bytes(num_bytes: u64) -> String {
    let mut value = num_bytes as f64;
    let mut idx = 0;
    while value >= 1024.0 && idx < UNITS.len() - 1 {
        value /= 1024.0;
        idx += 1;
    }

    if idx >= 2 {
        let rounded = (value * 10.0).round() / 10.0;
        if (rounded - rounded.trunc()).abs() < 1e-6 {
            format!("{} {}", rounded as u64, UNITS[idx])
        } else {
            format!("{:.1} {}", rounded, UNITS[idx])
        }
    } else {
        format!("{} {}", value.round() as u64, UNITS[idx])
    }
}

/// Format `part / total` as a whole percent clamped to 0-100.
pub fn format_percentage(part: f64, total: f64) -> String {
    if total <= 0.0 || !total.is_finite() || !part.is_finite() {
        return "0%".to_string();
    }
    let pct = (part / total * 100.0).clamp(0.0, 100.0);
    format!("{}%", pct.round() as u32)
}

/// Format a timestamp as `YYYY-MM-DD HH:MM:SS`.
pub fn format_timestamp<Tz>(ts: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    ts.format("%Y-%m-%d %H:%M:%S").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(0), "0 B");
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(1536), "2 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5 MB");
        assert_eq!(format_bytes(2_254_857_830), "2.1 GB");
        assert_eq!(format_bytes(3 * 1024_u64.pow(4)), "3 TB");
        assert_eq!(format_bytes(5000 * 1024_u64.pow(4)), "5000 TB");
    }

    #[test]
    fn test_format_percentage() {
        assert_eq!(format_percentage(1.0, 4.0), "25%");
        assert_eq!(format_percentage(5.0, 4.0), "100%");
        assert_eq!(format_percentage(-1.0, 4.0), "0%");
        assert_eq!(format_percentage(1.0, 0.0), "0%");
    }

    #[test]
    fn test_format_timestamp() {
        let ts = Utc.with_ymd_and_hms(2024, 5, 1, 9, 5, 7).unwrap();
        assert_eq!(format_timestamp(&ts), "2024-05-01 09:05:07");
    }
}
