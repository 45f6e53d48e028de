//! Engine settings.
//!
//! Settings are read-only inputs to the recording engine. Loading and
//! persisting them is the caller's concern; this module only defines the
//! shape, defaults and validation rules.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::camera::CameraSource;

/// Number of camera slots the engine drives.
pub const MAX_SLOTS: usize = 2;

const BYTES_PER_GB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Smallest storage limit honoured, so a zero entry never wipes the directory.
const MIN_STORAGE_LIMIT_GB: f64 = 0.0001;

/// Recording engine settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema, Validate)]
#[serde(default)]
pub struct Settings {
    /// Camera per slot, in slot order.
    #[validate(length(min = 1, max = 2))]
    pub cameras: Vec<CameraSource>,

    /// Foreground fraction above which a frame counts as motion.
    #[validate(range(min = 0.0, max = 0.3))]
    pub motion_threshold: f64,

    /// Seconds of footage kept before a trigger.
    #[validate(range(min = 0.0, max = 60.0))]
    pub pre_seconds: f64,

    /// Seconds recording continues after the last trigger.
    #[validate(range(min = 0.0, max = 600.0))]
    pub post_seconds: f64,

    /// Nominal capture rate; sizes the pre-roll buffer and the output stream.
    #[validate(range(min = 1, max = 120))]
    pub target_fps: u32,

    /// Recording directory quota in gigabytes.
    #[validate(range(min = 0.0001))]
    pub storage_limit_gb: f64,

    pub enable_motion: bool,
    pub enable_person: bool,

    /// Treat a detected person as a trigger, in addition to motion.
    pub person_triggers_recording: bool,

    pub autoreconnect: bool,

    #[validate(range(min = 1, max = 100))]
    pub reconnect_max_attempts: u32,

    #[validate(range(min = 0.0))]
    pub reconnect_base_delay_secs: f64,

    #[validate(range(min = 0.0))]
    pub reconnect_max_delay_secs: f64,

    /// JPEG quality of recorded frames.
    #[validate(range(min = 1, max = 100))]
    pub jpeg_quality: u8,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            cameras: vec![CameraSource::usb(0)],
            motion_threshold: 0.05,
            pre_seconds: 3.0,
            post_seconds: 5.0,
            target_fps: 30,
            storage_limit_gb: 5.0,
            enable_motion: true,
            enable_person: true,
            person_triggers_recording: false,
            autoreconnect: true,
            reconnect_max_attempts: 5,
            reconnect_base_delay_secs: 1.0,
            reconnect_max_delay_secs: 30.0,
            jpeg_quality: 85,
        }
    }
}

impl Settings {
    /// Storage quota in bytes.
    pub fn storage_limit_bytes(&self) -> u64 {
        (self.storage_limit_gb.max(MIN_STORAGE_LIMIT_GB) * BYTES_PER_GB) as u64
    }

    /// Number of frames the pre-roll buffer holds.
    pub fn prebuffer_capacity(&self) -> usize {
        (self.pre_seconds.max(0.0) * self.target_fps as f64).round() as usize
    }

    /// Motion threshold as whole percent, e.g. `5 %`.
    pub fn motion_threshold_label(&self) -> String {
        format!("{} %", (self.motion_threshold * 100.0) as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let settings = Settings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.prebuffer_capacity(), 90);
        assert_eq!(settings.storage_limit_bytes(), 5 * 1024 * 1024 * 1024);
        assert_eq!(settings.motion_threshold_label(), "5 %");
    }

    #[test]
    fn test_prebuffer_capacity_rounds() {
        let settings = Settings {
            pre_seconds: 0.57,
            target_fps: 100,
            ..Settings::default()
        };
        assert_eq!(settings.prebuffer_capacity(), 57);
    }

    #[test]
    fn test_threshold_out_of_range() {
        let settings = Settings {
            motion_threshold: 0.5,
            ..Settings::default()
        };
        let errors = settings.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("motion_threshold"));
    }

    #[test]
    fn test_too_many_cameras() {
        let settings = Settings {
            cameras: vec![CameraSource::usb(0), CameraSource::usb(1), CameraSource::usb(2)],
            ..Settings::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_zero_limit_is_floored() {
        let settings = Settings {
            storage_limit_gb: 0.0,
            ..Settings::default()
        };
        assert!(settings.storage_limit_bytes() > 0);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let settings: Settings =
            serde_json::from_str(r#"{"motion_threshold": 0.1, "post_seconds": 8}"#).unwrap();
        assert_eq!(settings.motion_threshold, 0.1);
        assert_eq!(settings.post_seconds, 8.0);
        assert_eq!(settings.pre_seconds, 3.0);
        assert_eq!(settings.cameras, vec![CameraSource::usb(0)]);
    }
}
