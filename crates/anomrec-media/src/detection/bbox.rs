//! Bounding boxes and person detections.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Bounding box in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    /// Left edge x-coordinate
    pub x: f64,
    /// Top edge y-coordinate
    pub y: f64,
    /// Box width
    pub width: f64,
    /// Box height
    pub height: f64,
}

impl BoundingBox {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Right edge x-coordinate.
    #[inline]
    pub fn x2(&self) -> f64 {
        self.x + self.width
    }

    /// Bottom edge y-coordinate.
    #[inline]
    pub fn y2(&self) -> f64 {
        self.y + self.height
    }

    #[inline]
    pub fn area(&self) -> f64 {
        self.width * self.height
    }

    /// Intersection over Union with another box.
    pub fn iou(&self, other: &BoundingBox) -> f64 {
        let x1 = self.x.max(other.x);
        let y1 = self.y.max(other.y);
        let x2 = self.x2().min(other.x2());
        let y2 = self.y2().min(other.y2());

        if x2 <= x1 || y2 <= y1 {
            return 0.0;
        }

        let intersection = (x2 - x1) * (y2 - y1);
        let union = self.area() + other.area() - intersection;

        if union > 0.0 {
            intersection / union
        } else {
            0.0
        }
    }

    /// Multiply every coordinate by `factor`.
    pub fn scale(&self, factor: f64) -> BoundingBox {
        BoundingBox {
            x: self.x * factor,
            y: self.y * factor,
            width: self.width * factor,
            height: self.height * factor,
        }
    }

    /// Intersect with the frame rectangle.
    pub fn clip(&self, frame_width: u32, frame_height: u32) -> BoundingBox {
        let x = self.x.clamp(0.0, frame_width as f64);
        let y = self.y.clamp(0.0, frame_height as f64);
        let x2 = self.x2().clamp(0.0, frame_width as f64);
        let y2 = self.y2().clamp(0.0, frame_height as f64);
        BoundingBox {
            x,
            y,
            width: (x2 - x).max(0.0),
            height: (y2 - y).max(0.0),
        }
    }
}

/// A detected person.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PersonDetection {
    pub bbox: BoundingBox,
    /// Logistic-mapped classifier score in [0, 1]
    pub confidence: f64,
}

impl PersonDetection {
    pub fn new(bbox: BoundingBox, confidence: f64) -> Self {
        Self { bbox, confidence }
    }
}

/// Map a raw classifier margin to [0, 1].
pub fn sigmoid(score: f64) -> f64 {
    if !score.is_finite() {
        return if score > 0.0 { 1.0 } else if score < 0.0 { 0.0 } else { 0.5 };
    }
    (1.0 / (1.0 + (-score).exp())).clamp(0.0, 1.0)
}

/// Greedy non-maximum suppression: keep the most confident box, drop
/// every remaining box overlapping it by more than `iou_threshold`.
pub fn non_maximum_suppression(
    mut detections: Vec<PersonDetection>,
    iou_threshold: f64,
) -> Vec<PersonDetection> {
    if detections.len() < 2 {
        return detections;
    }

    detections.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(Ordering::Equal)
    });

    let mut keep: Vec<PersonDetection> = Vec::new();
    for candidate in detections {
        if keep
            .iter()
            .all(|kept| kept.bbox.iou(&candidate.bbox) <= iou_threshold)
        {
            keep.push(candidate);
        }
    }
    keep
}
