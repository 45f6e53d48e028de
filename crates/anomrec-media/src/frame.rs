//! Captured frame type.

use chrono::{DateTime, Utc};
use image::{DynamicImage, GrayImage, ImageBuffer, Luma, Rgb, RgbImage, Rgba};

use crate::error::{MediaError, MediaResult};

/// A captured RGB frame.
///
/// `timestamp` is monotonic seconds and drives all recorder timing;
/// `captured_at` is the wall-clock time used for file names and events.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub image: RgbImage,
    pub timestamp: f64,
    pub captured_at: DateTime<Utc>,
}

impl Frame {
    pub fn new(image: RgbImage, timestamp: f64, captured_at: DateTime<Utc>) -> Self {
        Self {
            image,
            timestamp,
            captured_at,
        }
    }

    /// Build a frame from a raw interleaved pixel buffer.
    ///
    /// Accepts 1 (gray), 3 (RGB) or 4 (RGBA) channels. The buffer length
    /// must be exactly `width * height * channels`.
    pub fn from_raw(
        width: u32,
        height: u32,
        channels: u8,
        data: Vec<u8>,
        timestamp: f64,
        captured_at: DateTime<Utc>,
    ) -> MediaResult<Self> {
        if width == 0 || height == 0 {
            return Err(MediaError::invalid_frame(format!(
                "empty frame {}x{}",
                width, height
            )));
        }

        let expected = width as usize * height as usize * channels as usize;
        if data.len() != expected {
            return Err(MediaError::invalid_frame(format!(
                "buffer holds {} bytes, {}x{}x{} needs {}",
                data.len(),
                width,
                height,
                channels,
                expected
            )));
        }

        let image = match channels {
            1 => ImageBuffer::<Luma<u8>, _>::from_raw(width, height, data)
                .map(|img| DynamicImage::ImageLuma8(img).to_rgb8()),
            3 => ImageBuffer::<Rgb<u8>, _>::from_raw(width, height, data),
            4 => ImageBuffer::<Rgba<u8>, _>::from_raw(width, height, data)
                .map(|img| DynamicImage::ImageRgba8(img).to_rgb8()),
            other => {
                return Err(MediaError::invalid_frame(format!(
                    "unsupported channel count {}",
                    other
                )))
            }
        }
        .ok_or_else(|| MediaError::invalid_frame("buffer does not match dimensions"))?;

        Ok(Self::new(image, timestamp, captured_at))
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// (width, height)
    pub fn size(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }

    /// Grayscale copy for detection.
    pub fn to_gray(&self) -> GrayImage {
        image::imageops::grayscale(&self.image)
    }
}
