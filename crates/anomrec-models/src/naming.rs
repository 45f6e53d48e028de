//! Recording and snapshot file naming.
//!
//! Recordings are named `recording_cam{slot}_{YYYYMMDD_HHMMSS}.avi`, with a
//! `_N` suffix before the extension when several events start in the same
//! second. Snapshots use `snapshot_cam{slot}_{YYYYMMDD_HHMMSS}.png`.

use chrono::NaiveDateTime;
use std::path::Path;

pub const RECORDING_PREFIX: &str = "recording_cam";
pub const RECORDING_EXTENSION: &str = "avi";
pub const SNAPSHOT_PREFIX: &str = "snapshot_cam";
pub const SNAPSHOT_EXTENSION: &str = "png";

const STAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Parsed components of a recording file name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordingName {
    pub slot: u32,
    pub started: NaiveDateTime,
    /// Collision suffix, 0 when absent
    pub sequence: u32,
}

/// File name for a recording started at `at` on `slot`.
pub fn recording_file_name(slot: u32, at: &NaiveDateTime) -> String {
    recording_file_name_with_sequence(slot, at, 0)
}

/// Like [`recording_file_name`], with a `_N` collision suffix when `sequence > 0`.
pub fn recording_file_name_with_sequence(slot: u32, at: &NaiveDateTime, sequence: u32) -> String {
    let stamp = at.format(STAMP_FORMAT);
    if sequence == 0 {
        format!("{RECORDING_PREFIX}{slot}_{stamp}.{RECORDING_EXTENSION}")
    } else {
        format!("{RECORDING_PREFIX}{slot}_{stamp}_{sequence}.{RECORDING_EXTENSION}")
    }
}

/// File name for a snapshot taken at `at` on `slot`.
pub fn snapshot_file_name(slot: u32, at: &NaiveDateTime) -> String {
    format!(
        "{SNAPSHOT_PREFIX}{slot}_{}.{SNAPSHOT_EXTENSION}",
        at.format(STAMP_FORMAT)
    )
}

/// Parse a recording file name (no directory) back into its components.
///
/// Returns `None` for anything that is not a recording produced by
/// [`recording_file_name_with_sequence`].
pub fn parse_recording_file_name(name: &str) -> Option<RecordingName> {
    let rest = name.strip_prefix(RECORDING_PREFIX)?;
    let rest = rest.strip_suffix(RECORDING_EXTENSION)?.strip_suffix('.')?;

    let (slot, rest) = rest.split_once('_')?;
    let slot = slot.parse::<u32>().ok()?;

    // rest is "YYYYMMDD_HHMMSS" or "YYYYMMDD_HHMMSS_N"
    let (stamp, sequence) = match rest.len() {
        15 => (rest, 0),
        n if n > 16 && rest.as_bytes()[15] == b'_' => (&rest[..15], rest[16..].parse().ok()?),
        _ => return None,
    };
    let started = NaiveDateTime::parse_from_str(stamp, STAMP_FORMAT).ok()?;

    Some(RecordingName {
        slot,
        started,
        sequence,
    })
}

/// Whether `path` names a recording file.
pub fn is_recording_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| parse_recording_file_name(n).is_some())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(9, 5, 7)
            .unwrap()
    }

    #[test]
    fn test_recording_name() {
        assert_eq!(recording_file_name(0, &at()), "recording_cam0_20240501_090507.avi");
        assert_eq!(
            recording_file_name_with_sequence(1, &at(), 2),
            "recording_cam1_20240501_090507_2.avi"
        );
    }

    #[test]
    fn test_snapshot_name() {
        assert_eq!(snapshot_file_name(1, &at()), "snapshot_cam1_20240501_090507.png");
    }

    #[test]
    fn test_parse_recording_name() {
        let parsed = parse_recording_file_name("recording_cam1_20240501_090507.avi").unwrap();
        assert_eq!(parsed.slot, 1);
        assert_eq!(parsed.started, at());
        assert_eq!(parsed.sequence, 0);

        let parsed = parse_recording_file_name("recording_cam0_20240501_090507_3.avi").unwrap();
        assert_eq!(parsed.sequence, 3);
    }

    #[test]
    fn test_parse_rejects_foreign_files() {
        for name in [
            "snapshot_cam0_20240501_090507.png",
            "recording_cam0_20240501_090507.mp4",
            "recording_camX_20240501_090507.avi",
            "recording_cam0_2024050_090507.avi",
            "recording_cam0_20241301_090507.avi",
            "recording_cam0_20240501_090507_.avi",
            "notes.txt",
        ] {
            assert!(parse_recording_file_name(name).is_none(), "{name}");
        }
    }

    #[test]
    fn test_is_recording_file() {
        assert!(is_recording_file(Path::new(
            "/data/recordings/recording_cam0_20240501_090507.avi"
        )));
        assert!(!is_recording_file(Path::new("/data/recordings/")));
    }
}
