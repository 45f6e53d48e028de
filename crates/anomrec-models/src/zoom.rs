//! Zoom and pan view state.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Per-slot digital zoom/pan state.
///
/// Pan offsets are normalized: `pan_x = 1.0` moves the crop center by half
/// the frame width to the right, `-1.0` by half the width to the left.
/// The crop transform clamps the rectangle inside the frame, so any pan in
/// `[-1, 1]` is safe.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ZoomState {
    pub factor: f64,
    pub min_factor: f64,
    pub max_factor: f64,
    pub step: f64,
    pub pan_x: f64,
    pub pan_y: f64,
}

/// Default pan increment for keyboard-style panning.
pub const DEFAULT_PAN_STEP: f64 = 0.1;

impl Default for ZoomState {
    fn default() -> Self {
        Self {
            factor: 1.0,
            min_factor: 0.5,
            max_factor: 4.0,
            step: 0.25,
            pan_x: 0.0,
            pan_y: 0.0,
        }
    }
}

impl ZoomState {
    /// Create a state with explicit bounds, starting at 1.0x.
    pub fn with_bounds(min_factor: f64, max_factor: f64, step: f64) -> Self {
        let min_factor = min_factor.min(max_factor);
        Self {
            factor: 1.0_f64.clamp(min_factor, max_factor),
            min_factor,
            max_factor,
            step: step.abs(),
            ..Self::default()
        }
    }

    pub fn zoom_in(&mut self) -> f64 {
        self.factor = (self.factor + self.step).min(self.max_factor);
        self.factor
    }

    pub fn zoom_out(&mut self) -> f64 {
        self.factor = (self.factor - self.step).max(self.min_factor);
        self.factor
    }

    /// Back to 1.0x, centered.
    pub fn reset(&mut self) -> f64 {
        self.factor = 1.0_f64.clamp(self.min_factor, self.max_factor);
        self.pan_x = 0.0;
        self.pan_y = 0.0;
        self.factor
    }

    /// Pan by a normalized offset, clamped to `[-1, 1]` on each axis.
    pub fn pan(&mut self, dx: f64, dy: f64) {
        if dx.is_finite() {
            self.pan_x = (self.pan_x + dx).clamp(-1.0, 1.0);
        }
        if dy.is_finite() {
            self.pan_y = (self.pan_y + dy).clamp(-1.0, 1.0);
        }
    }

    pub fn pan_left(&mut self) {
        self.pan(-DEFAULT_PAN_STEP, 0.0);
    }

    pub fn pan_right(&mut self) {
        self.pan(DEFAULT_PAN_STEP, 0.0);
    }

    pub fn pan_up(&mut self) {
        self.pan(0.0, -DEFAULT_PAN_STEP);
    }

    pub fn pan_down(&mut self) {
        self.pan(0.0, DEFAULT_PAN_STEP);
    }

    /// True when the transform would be the identity.
    pub fn is_identity(&self) -> bool {
        self.factor == 1.0 && self.pan_x == 0.0 && self.pan_y == 0.0
    }

    /// Label like `1.5x`.
    pub fn label(&self) -> String {
        format!("{:.1}x", self.factor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zoom_in_sequence_clamps_at_max() {
        let mut zoom = ZoomState {
            max_factor: 2.0,
            ..ZoomState::default()
        };

        let steps: Vec<f64> = (0..4).map(|_| zoom.zoom_in()).collect();
        assert_eq!(steps, vec![1.25, 1.5, 1.75, 2.0]);
        assert_eq!(zoom.zoom_in(), 2.0);
    }

    #[test]
    fn test_zoom_out_clamps_at_min() {
        let mut zoom = ZoomState::default();
        for _ in 0..10 {
            zoom.zoom_out();
        }
        assert_eq!(zoom.factor, 0.5);
    }

    #[test]
    fn test_factor_never_leaves_bounds() {
        let mut zoom = ZoomState::with_bounds(0.75, 3.0, 0.4);
        for i in 0..50 {
            if i % 3 == 0 {
                zoom.zoom_out();
            } else {
                zoom.zoom_in();
            }
            assert!(zoom.factor >= zoom.min_factor && zoom.factor <= zoom.max_factor);
        }
        for _ in 0..20 {
            zoom.zoom_out();
            assert!(zoom.factor >= zoom.min_factor);
        }
    }

    #[test]
    fn test_reset_restores_center() {
        let mut zoom = ZoomState::default();
        zoom.zoom_in();
        zoom.pan(0.3, -0.2);
        assert!(!zoom.is_identity());

        assert_eq!(zoom.reset(), 1.0);
        assert!(zoom.is_identity());
    }

    #[test]
    fn test_pan_is_clamped() {
        let mut zoom = ZoomState::default();
        for _ in 0..30 {
            zoom.pan_right();
            zoom.pan_up();
        }
        assert_eq!(zoom.pan_x, 1.0);
        assert_eq!(zoom.pan_y, -1.0);

        zoom.pan(f64::NAN, 0.0);
        assert_eq!(zoom.pan_x, 1.0);
    }

    #[test]
    fn test_label() {
        let mut zoom = ZoomState::default();
        zoom.zoom_in();
        zoom.zoom_in();
        assert_eq!(zoom.label(), "1.5x");
    }
}
