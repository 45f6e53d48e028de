//! Sliding-window person detector on histogram-of-oriented-gradients features.
//!
//! # Descriptor layout
//! - 8x8 pixel cells, 9 unsigned orientation bins over 0-180 degrees,
//!   votes split linearly between the two nearest bins
//! - 2x2 cell blocks with a one-cell stride, L2-Hys normalized (clip 0.2)
//! - 64x128 detection window: 7x15 blocks, 3780 values, blocks in
//!   row-major order, cells row-major inside a block, then bins
//!
//! The classifier is a linear model (`weights` in descriptor order plus
//! `bias`) loaded from JSON. Windows whose margin exceeds `hit_threshold`
//! become detections with logistic confidence; an image pyramid with
//! factor `scale` finds people larger than the window.

use std::path::Path;

use image::imageops::{self, FilterType};
use image::GrayImage;
use ndarray::{s, Array1, Array3, ArrayView1};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::bbox::{non_maximum_suppression, sigmoid, BoundingBox, PersonDetection};
use super::PersonDetector;
use crate::error::{MediaError, MediaResult};

pub const CELL_SIZE: usize = 8;
pub const NBINS: usize = 9;
pub const BLOCK_CELLS: usize = 2;
pub const WINDOW_WIDTH: u32 = 64;
pub const WINDOW_HEIGHT: u32 = 128;

const BLOCK_LEN: usize = BLOCK_CELLS * BLOCK_CELLS * NBINS;
const WINDOW_BLOCKS_X: usize = WINDOW_WIDTH as usize / CELL_SIZE - BLOCK_CELLS + 1;
const WINDOW_BLOCKS_Y: usize = WINDOW_HEIGHT as usize / CELL_SIZE - BLOCK_CELLS + 1;

/// Length of a window descriptor.
pub const DESCRIPTOR_LEN: usize = WINDOW_BLOCKS_X * WINDOW_BLOCKS_Y * BLOCK_LEN;

const L2HYS_CLIP: f32 = 0.2;
const NORM_EPS: f32 = 1e-3;

/// Linear classifier over window descriptors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearSvm {
    pub weights: Vec<f32>,
    pub bias: f32,
}

impl LinearSvm {
    /// Load a model from a JSON file `{"weights": [...], "bias": ...}`.
    pub fn from_json_file(path: &Path) -> MediaResult<Self> {
        if !path.exists() {
            return Err(MediaError::model_not_found(path.display().to_string()));
        }
        let raw = std::fs::read_to_string(path)?;
        let model: LinearSvm = serde_json::from_str(&raw)?;
        model.validate()?;
        Ok(model)
    }

    pub fn validate(&self) -> MediaResult<()> {
        if self.weights.len() != DESCRIPTOR_LEN {
            return Err(MediaError::detection_failed(format!(
                "person model has {} weights, expected {}",
                self.weights.len(),
                DESCRIPTOR_LEN
            )));
        }
        if !self.bias.is_finite() || self.weights.iter().any(|w| !w.is_finite()) {
            return Err(MediaError::detection_failed("person model has non-finite values"));
        }
        Ok(())
    }
}

/// Detector parameters.
#[derive(Debug, Clone, Copy)]
pub struct HogConfig {
    /// Minimum classifier margin for a window to count
    pub hit_threshold: f32,
    /// Pyramid downscale factor between levels
    pub scale: f64,
    /// Window stride in cells
    pub stride_cells: usize,
    /// IoU above which overlapping detections are merged
    pub nms_threshold: f64,
    /// Frames wider than this are downscaled before the pyramid
    pub max_width: u32,
    /// Pyramid depth cap
    pub max_levels: usize,
}

impl Default for HogConfig {
    fn default() -> Self {
        Self {
            hit_threshold: 0.0,
            scale: 1.05,
            stride_cells: 1,
            nms_threshold: 0.4,
            max_width: 320,
            max_levels: 64,
        }
    }
}

/// HOG + linear model person detector.
pub struct HogPersonDetector {
    model: LinearSvm,
    config: HogConfig,
}

impl HogPersonDetector {
    pub fn new(model: LinearSvm, config: HogConfig) -> MediaResult<Self> {
        model.validate()?;
        if config.scale.is_nan() || config.scale <= 1.0 {
            return Err(MediaError::detection_failed(format!(
                "pyramid scale must exceed 1.0, got {}",
                config.scale
            )));
        }
        Ok(Self { model, config })
    }

    /// Load the model from JSON with default parameters.
    pub fn from_model_file(path: &Path) -> MediaResult<Self> {
        let model = LinearSvm::from_json_file(path)?;
        info!(path = %path.display(), "Loaded person detection model");
        Self::new(model, HogConfig::default())
    }

    /// Score every window of one pyramid level.
    fn detect_level(&self, image: &GrayImage, level_scale: f64, out: &mut Vec<PersonDetection>) {
        let blocks = block_descriptors(image);
        let (blocks_y, blocks_x, _) = blocks.dim();
        if blocks_y < WINDOW_BLOCKS_Y || blocks_x < WINDOW_BLOCKS_X {
            return;
        }

        let weights = ArrayView1::from(&self.model.weights[..]);
        let stride = self.config.stride_cells.max(1);

        for wy in (0..=blocks_y - WINDOW_BLOCKS_Y).step_by(stride) {
            for wx in (0..=blocks_x - WINDOW_BLOCKS_X).step_by(stride) {
                let mut score = self.model.bias;
                for by in 0..WINDOW_BLOCKS_Y {
                    for bx in 0..WINDOW_BLOCKS_X {
                        let offset = (by * WINDOW_BLOCKS_X + bx) * BLOCK_LEN;
                        let block = blocks.slice(s![wy + by, wx + bx, ..]);
                        score += block.dot(&weights.slice(s![offset..offset + BLOCK_LEN]));
                    }
                }

                if score > self.config.hit_threshold {
                    let bbox = BoundingBox::new(
                        (wx * CELL_SIZE) as f64,
                        (wy * CELL_SIZE) as f64,
                        WINDOW_WIDTH as f64,
                        WINDOW_HEIGHT as f64,
                    )
                    .scale(level_scale);
                    out.push(PersonDetection::new(bbox, sigmoid(score as f64)));
                }
            }
        }
    }
}

impl PersonDetector for HogPersonDetector {
    fn detect(&self, gray: &GrayImage) -> MediaResult<Vec<PersonDetection>> {
        let (width, height) = gray.dimensions();
        if width < WINDOW_WIDTH || height < WINDOW_HEIGHT {
            return Ok(Vec::new());
        }

        // Work on a bounded-size copy and map boxes back afterwards.
        let (base, base_scale) = if width > self.config.max_width {
            let factor = width as f64 / self.config.max_width as f64;
            let new_height = ((height as f64 / factor).round() as u32).max(1);
            (
                imageops::resize(gray, self.config.max_width, new_height, FilterType::Triangle),
                factor,
            )
        } else {
            (gray.clone(), 1.0)
        };

        let mut raw = Vec::new();
        let mut level_scale = 1.0_f64;
        for _ in 0..self.config.max_levels {
            let level_w = (base.width() as f64 / level_scale).round() as u32;
            let level_h = (base.height() as f64 / level_scale).round() as u32;
            if level_w < WINDOW_WIDTH || level_h < WINDOW_HEIGHT {
                break;
            }

            if level_scale == 1.0 {
                self.detect_level(&base, level_scale, &mut raw);
            } else {
                let level = imageops::resize(&base, level_w, level_h, FilterType::Triangle);
                self.detect_level(&level, level_scale, &mut raw);
            }
            level_scale *= self.config.scale;
        }

        let candidates = raw.len();
        let detections: Vec<PersonDetection> =
            non_maximum_suppression(raw, self.config.nms_threshold)
                .into_iter()
                .map(|d| PersonDetection {
                    bbox: d.bbox.scale(base_scale).clip(width, height),
                    ..d
                })
                .collect();

        debug!(candidates, kept = detections.len(), "Person detection pass");
        Ok(detections)
    }

    fn name(&self) -> &'static str {
        "hog"
    }
}

/// Compute the full-image descriptor of one window-sized image.
///
/// `image` must be exactly 64x128; used for training data export and tests.
pub fn window_descriptor(image: &GrayImage) -> MediaResult<Array1<f32>> {
    if image.dimensions() != (WINDOW_WIDTH, WINDOW_HEIGHT) {
        return Err(MediaError::invalid_frame(format!(
            "descriptor window must be {}x{}, got {}x{}",
            WINDOW_WIDTH,
            WINDOW_HEIGHT,
            image.width(),
            image.height()
        )));
    }
    let blocks = block_descriptors(image);
    Ok(Array1::from_iter(blocks.iter().copied()))
}

/// Orientation histograms per cell, shape `(cells_y, cells_x, NBINS)`.
fn cell_histograms(image: &GrayImage) -> Array3<f32> {
    let (width, height) = (image.width() as usize, image.height() as usize);
    let cells_x = width / CELL_SIZE;
    let cells_y = height / CELL_SIZE;
    let mut hist = Array3::<f32>::zeros((cells_y, cells_x, NBINS));
    if cells_x == 0 || cells_y == 0 {
        return hist;
    }

    let px = |x: usize, y: usize| image.get_pixel(x as u32, y as u32).0[0] as f32;
    let bin_width = 180.0 / NBINS as f32;

    for y in 0..cells_y * CELL_SIZE {
        let up = y.saturating_sub(1);
        let down = (y + 1).min(height - 1);
        for x in 0..cells_x * CELL_SIZE {
            let left = x.saturating_sub(1);
            let right = (x + 1).min(width - 1);

            let gx = px(right, y) - px(left, y);
            let gy = px(x, down) - px(x, up);
            let magnitude = (gx * gx + gy * gy).sqrt();
            if magnitude == 0.0 {
                continue;
            }

            let mut angle = gy.atan2(gx).to_degrees();
            if angle < 0.0 {
                angle += 180.0;
            }
            if angle >= 180.0 {
                angle -= 180.0;
            }

            // Bin centers sit at (i + 0.5) * bin_width.
            let position = angle / bin_width - 0.5;
            let lower = position.floor();
            let upper_weight = position - lower;
            let lower_bin = (lower as i32).rem_euclid(NBINS as i32) as usize;
            let upper_bin = (lower_bin + 1) % NBINS;

            let (cy, cx) = (y / CELL_SIZE, x / CELL_SIZE);
            hist[[cy, cx, lower_bin]] += magnitude * (1.0 - upper_weight);
            hist[[cy, cx, upper_bin]] += magnitude * upper_weight;
        }
    }
    hist
}

/// L2-Hys normalized block vectors, shape `(blocks_y, blocks_x, BLOCK_LEN)`.
fn block_descriptors(image: &GrayImage) -> Array3<f32> {
    let cells = cell_histograms(image);
    let (cells_y, cells_x, _) = cells.dim();
    if cells_y < BLOCK_CELLS || cells_x < BLOCK_CELLS {
        return Array3::zeros((0, 0, BLOCK_LEN));
    }

    let blocks_y = cells_y - BLOCK_CELLS + 1;
    let blocks_x = cells_x - BLOCK_CELLS + 1;
    let mut blocks = Array3::<f32>::zeros((blocks_y, blocks_x, BLOCK_LEN));

    for by in 0..blocks_y {
        for bx in 0..blocks_x {
            let mut block = blocks.slice_mut(s![by, bx, ..]);
            let mut i = 0;
            for cy in 0..BLOCK_CELLS {
                for cx in 0..BLOCK_CELLS {
                    for bin in 0..NBINS {
                        block[i] = cells[[by + cy, bx + cx, bin]];
                        i += 1;
                    }
                }
            }

            let norm = (block.iter().map(|v| v * v).sum::<f32>() + NORM_EPS * NORM_EPS).sqrt();
            block.mapv_inplace(|v| (v / norm).min(L2HYS_CLIP));
            let norm = (block.iter().map(|v| v * v).sum::<f32>() + NORM_EPS * NORM_EPS).sqrt();
            block.mapv_inplace(|v| v / norm);
        }
    }
    blocks
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn model(bias: f32) -> LinearSvm {
        LinearSvm {
            weights: vec![0.0; DESCRIPTOR_LEN],
            bias,
        }
    }

    #[test]
    fn test_descriptor_length() {
        assert_eq!(DESCRIPTOR_LEN, 3780);
        let window = GrayImage::from_pixel(WINDOW_WIDTH, WINDOW_HEIGHT, Luma([128]));
        assert_eq!(window_descriptor(&window).unwrap().len(), 3780);
    }

    #[test]
    fn test_flat_window_has_empty_descriptor() {
        let window = GrayImage::from_pixel(WINDOW_WIDTH, WINDOW_HEIGHT, Luma([77]));
        let descriptor = window_descriptor(&window).unwrap();
        assert!(descriptor.iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_vertical_edge_votes_horizontal_gradient() {
        let window = GrayImage::from_fn(WINDOW_WIDTH, WINDOW_HEIGHT, |x, _| {
            if x < 32 {
                Luma([0])
            } else {
                Luma([255])
            }
        });
        let hist = cell_histograms(&window);
        // Cell straddling the edge at x = 32 (cells 3 and 4).
        let cell = hist.slice(s![0, 4, ..]);
        let (best, _) = cell
            .iter()
            .enumerate()
            .fold((0, f32::MIN), |acc, (i, v)| if *v > acc.1 { (i, *v) } else { acc });
        assert!(best == 0 || best == NBINS - 1, "best bin {best}");
        assert!(hist.slice(s![0, 0, ..]).iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_descriptor_values_are_bounded() {
        let window = GrayImage::from_fn(WINDOW_WIDTH, WINDOW_HEIGHT, |x, y| {
            Luma([((x * 7 + y * 13) % 256) as u8])
        });
        let descriptor = window_descriptor(&window).unwrap();
        assert!(descriptor.iter().all(|v| (0.0..=1.0).contains(v)));
    }

    #[test]
    fn test_single_window_detection() {
        let detector = HogPersonDetector::new(model(1.0), HogConfig::default()).unwrap();
        let image = GrayImage::from_pixel(WINDOW_WIDTH, WINDOW_HEIGHT, Luma([10]));
        let detections = detector.detect(&image).unwrap();
        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].bbox, BoundingBox::new(0.0, 0.0, 64.0, 128.0));
        assert!((detections[0].confidence - sigmoid(1.0)).abs() < 1e-6);
    }

    #[test]
    fn test_negative_bias_detects_nothing() {
        let detector = HogPersonDetector::new(model(-1.0), HogConfig::default()).unwrap();
        let image = GrayImage::from_pixel(200, 300, Luma([10]));
        assert!(detector.detect(&image).unwrap().is_empty());
    }

    #[test]
    fn test_small_image_detects_nothing() {
        let detector = HogPersonDetector::new(model(5.0), HogConfig::default()).unwrap();
        let image = GrayImage::from_pixel(40, 200, Luma([10]));
        assert!(detector.detect(&image).unwrap().is_empty());
    }

    #[test]
    fn test_boxes_map_back_to_source_resolution() {
        let config = HogConfig {
            max_width: 64,
            ..HogConfig::default()
        };
        let detector = HogPersonDetector::new(model(1.0), config).unwrap();
        let image = GrayImage::from_pixel(128, 256, Luma([10]));
        let detections = detector.detect(&image).unwrap();
        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].bbox, BoundingBox::new(0.0, 0.0, 128.0, 256.0));
    }

    #[test]
    fn test_model_validation() {
        let bad = LinearSvm {
            weights: vec![0.0; 10],
            bias: 0.0,
        };
        assert!(HogPersonDetector::new(bad, HogConfig::default()).is_err());
        assert!(HogPersonDetector::new(
            model(0.0),
            HogConfig {
                scale: 1.0,
                ..HogConfig::default()
            }
        )
        .is_err());
    }

    #[test]
    fn test_model_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("person.json");
        std::fs::write(&path, serde_json::to_string(&model(0.5)).unwrap()).unwrap();
        let detector = HogPersonDetector::from_model_file(&path).unwrap();
        assert_eq!(detector.name(), "hog");

        assert!(matches!(
            HogPersonDetector::from_model_file(&dir.path().join("missing.json")),
            Err(MediaError::ModelNotFound(_))
        ));
    }
}
