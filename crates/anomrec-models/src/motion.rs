//! Per-frame motion signal.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Highest motion threshold the settings accept.
pub const MOTION_THRESHOLD_MAX: f64 = 0.3;

/// Motion estimate for one frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema, Default)]
pub struct MotionSignal {
    /// Fraction of foreground pixels (0-1)
    pub level: f64,
    /// `level > threshold`
    pub trigger: bool,
}

impl MotionSignal {
    /// Derive the signal from a raw foreground fraction.
    pub fn evaluate(level: f64, threshold: f64) -> Self {
        let level = if level.is_finite() {
            level.clamp(0.0, 1.0)
        } else {
            0.0
        };
        Self {
            level,
            trigger: level > threshold,
        }
    }

    /// A frame with no motion estimate (motion detection disabled).
    pub fn none() -> Self {
        Self::default()
    }

    /// Level as whole percent, e.g. for a status line.
    pub fn percent(&self) -> u32 {
        (self.level * 100.0).round() as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trigger_is_strictly_greater() {
        assert!(!MotionSignal::evaluate(0.05, 0.05).trigger);
        assert!(MotionSignal::evaluate(0.0501, 0.05).trigger);
        assert!(!MotionSignal::evaluate(0.01, 0.05).trigger);
    }

    #[test]
    fn test_level_is_clamped() {
        assert_eq!(MotionSignal::evaluate(1.7, 0.1).level, 1.0);
        assert_eq!(MotionSignal::evaluate(-0.2, 0.1).level, 0.0);
        assert_eq!(MotionSignal::evaluate(f64::NAN, 0.1).level, 0.0);
    }

    #[test]
    fn test_zero_threshold_triggers_on_any_motion() {
        assert!(MotionSignal::evaluate(0.001, 0.0).trigger);
        assert!(!MotionSignal::evaluate(0.0, 0.0).trigger);
    }

    #[test]
    fn test_percent() {
        assert_eq!(MotionSignal::evaluate(0.054, 0.1).percent(), 5);
    }
}
