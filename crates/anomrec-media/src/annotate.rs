//! Detection overlays drawn onto recorded frames.

use image::{Rgb, RgbImage};

use crate::detection::PersonDetection;

/// Confidence at or above which a box is drawn in the "sure" color.
pub const CONFIDENT_THRESHOLD: f64 = 0.6;

pub const CONFIDENT_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
pub const UNSURE_COLOR: Rgb<u8> = Rgb([255, 180, 0]);

const LINE_WIDTH: u32 = 2;

/// Box color for a detection confidence.
pub fn detection_color(confidence: f64) -> Rgb<u8> {
    if confidence >= CONFIDENT_THRESHOLD {
        CONFIDENT_COLOR
    } else {
        UNSURE_COLOR
    }
}

/// Draw a box outline for every detection, in place.
pub fn annotate_detections(image: &mut RgbImage, detections: &[PersonDetection]) {
    let (width, height) = image.dimensions();
    for detection in detections {
        let bbox = detection.bbox.clip(width, height);
        if bbox.width < 1.0 || bbox.height < 1.0 {
            continue;
        }
        let x0 = bbox.x.floor() as u32;
        let y0 = bbox.y.floor() as u32;
        let x1 = (bbox.x2().ceil() as u32).min(width) - 1;
        let y1 = (bbox.y2().ceil() as u32).min(height) - 1;
        draw_rect(image, x0, y0, x1, y1, detection_color(detection.confidence));
    }
}

/// Outline the inclusive rectangle `(x0, y0)..=(x1, y1)`.
fn draw_rect(image: &mut RgbImage, x0: u32, y0: u32, x1: u32, y1: u32, color: Rgb<u8>) {
    for t in 0..LINE_WIDTH {
        let top = y0 + t;
        let bottom = y1.saturating_sub(t);
        let left = x0 + t;
        let right = x1.saturating_sub(t);
        if top > bottom || left > right {
            break;
        }
        for x in x0..=x1 {
            image.put_pixel(x, top, color);
            image.put_pixel(x, bottom, color);
        }
        for y in y0..=y1 {
            image.put_pixel(left, y, color);
            image.put_pixel(right, y, color);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::BoundingBox;

    #[test]
    fn test_colors_follow_confidence() {
        assert_eq!(detection_color(0.6), CONFIDENT_COLOR);
        assert_eq!(detection_color(0.59), UNSURE_COLOR);
    }

    #[test]
    fn test_box_outline_is_drawn() {
        let mut image = RgbImage::new(40, 40);
        let detection = PersonDetection::new(BoundingBox::new(10.0, 10.0, 10.0, 10.0), 0.9);
        annotate_detections(&mut image, &[detection]);

        assert_eq!(*image.get_pixel(10, 10), CONFIDENT_COLOR);
        assert_eq!(*image.get_pixel(19, 15), CONFIDENT_COLOR);
        assert_eq!(*image.get_pixel(11, 11), CONFIDENT_COLOR);
        assert_eq!(*image.get_pixel(15, 15), Rgb([0, 0, 0]));
        assert_eq!(*image.get_pixel(5, 5), Rgb([0, 0, 0]));
    }

    #[test]
    fn test_box_outside_frame_is_clipped() {
        let mut image = RgbImage::new(20, 20);
        let detection = PersonDetection::new(BoundingBox::new(15.0, -5.0, 30.0, 10.0), 0.3);
        annotate_detections(&mut image, &[detection]);
        assert_eq!(*image.get_pixel(19, 0), UNSURE_COLOR);

        let gone = PersonDetection::new(BoundingBox::new(50.0, 50.0, 10.0, 10.0), 0.9);
        annotate_detections(&mut image, &[gone]);
    }
}
