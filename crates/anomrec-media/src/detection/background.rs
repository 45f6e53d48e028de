//! Running Gaussian background model.
//!
//! Each pixel keeps a running mean and variance of its grayscale value. A
//! pixel is foreground when its squared distance from the mean exceeds
//! `var_threshold` times the variance. The learning rate starts at 1 and
//! decays to `1 / history`, so the model settles quickly after start-up and
//! then adapts slowly to lighting changes.

use image::imageops::{self, FilterType};
use image::GrayImage;
use ndarray::{Array2, Zip};

use super::MotionEstimator;
use crate::error::MediaResult;

/// Background model parameters.
#[derive(Debug, Clone, Copy)]
pub struct BackgroundConfig {
    /// Number of frames the model effectively remembers
    pub history: u32,
    /// Squared Mahalanobis distance above which a pixel is foreground
    pub var_threshold: f32,
    /// Variance assigned to a fresh model
    pub var_init: f32,
    pub var_min: f32,
    pub var_max: f32,
    /// Frames wider than this are downscaled before modelling
    pub max_width: u32,
}

impl Default for BackgroundConfig {
    fn default() -> Self {
        Self {
            history: 300,
            var_threshold: 16.0,
            var_init: 225.0,
            var_min: 4.0,
            var_max: 75.0 * 75.0,
            max_width: 320,
        }
    }
}

/// Per-pixel Gaussian background subtractor.
pub struct GaussianBackgroundModel {
    config: BackgroundConfig,
    mean: Array2<f32>,
    var: Array2<f32>,
    frames_seen: u32,
}

impl GaussianBackgroundModel {
    pub fn new(config: BackgroundConfig) -> Self {
        Self {
            config,
            mean: Array2::zeros((0, 0)),
            var: Array2::zeros((0, 0)),
            frames_seen: 0,
        }
    }

    /// Number of frames folded into the current model.
    pub fn frames_seen(&self) -> u32 {
        self.frames_seen
    }

    fn prepare(&self, gray: &GrayImage) -> Array2<f32> {
        let (width, height) = gray.dimensions();
        let scaled;
        let source = if width > self.config.max_width {
            let new_height =
                ((height as u64 * self.config.max_width as u64) / width as u64).max(1) as u32;
            scaled = imageops::resize(gray, self.config.max_width, new_height, FilterType::Triangle);
            &scaled
        } else {
            gray
        };

        let (w, h) = source.dimensions();
        Array2::from_shape_fn((h as usize, w as usize), |(y, x)| {
            source.get_pixel(x as u32, y as u32).0[0] as f32
        })
    }

    fn reinitialize(&mut self, pixels: Array2<f32>) {
        self.var = Array2::from_elem(pixels.raw_dim(), self.config.var_init);
        self.mean = pixels;
        self.frames_seen = 1;
    }
}

impl Default for GaussianBackgroundModel {
    fn default() -> Self {
        Self::new(BackgroundConfig::default())
    }
}

impl MotionEstimator for GaussianBackgroundModel {
    fn estimate(&mut self, gray: &GrayImage) -> MediaResult<f64> {
        let pixels = self.prepare(gray);
        let total = pixels.len();
        if total == 0 {
            return Ok(0.0);
        }

        // First frame, or the camera changed resolution.
        if self.frames_seen == 0 || self.mean.dim() != pixels.dim() {
            self.reinitialize(pixels);
            return Ok(0.0);
        }

        self.frames_seen = self.frames_seen.saturating_add(1);
        let alpha = 1.0 / self.frames_seen.min(self.config.history.max(1)) as f32;
        let BackgroundConfig {
            var_threshold,
            var_min,
            var_max,
            ..
        } = self.config;

        let mut foreground = 0usize;
        Zip::from(&mut self.mean)
            .and(&mut self.var)
            .and(&pixels)
            .for_each(|mean, var, &value| {
                let diff = value - *mean;
                let dist2 = diff * diff;
                if dist2 > var_threshold * *var {
                    foreground += 1;
                }
                *mean += alpha * diff;
                *var = (*var + alpha * (dist2 - *var)).clamp(var_min, var_max);
            });

        Ok(foreground as f64 / total as f64)
    }

    fn reset(&mut self) {
        self.frames_seen = 0;
        self.mean = Array2::zeros((0, 0));
        self.var = Array2::zeros((0, 0));
    }

    fn name(&self) -> &'static str {
        "gaussian_background"
    }
}
