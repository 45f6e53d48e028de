//! Digital zoom and pan over a single frame.
//!
//! - Zoom above 1.0 crops a `floor(w/z) x floor(h/z)` window around the
//!   panned center, clamped inside the frame.
//! - Zoom below 1.0 keeps the frame size: the frame is shrunk and placed on
//!   a black canvas around the panned center, clamped inside the canvas.
//! - Zoom 1.0 with no pan borrows the input unchanged.

use std::borrow::Cow;

use anomrec_models::ZoomState;
use image::imageops::{self, FilterType};
use image::RgbImage;

use crate::error::{MediaError, MediaResult};

/// Apply zoom and pan to `image`.
///
/// `pan_x`/`pan_y` are normalized: 1.0 shifts the center by half the frame
/// width (height). Errors on an empty image, a non-finite pan or a zoom
/// factor that is not a positive finite number.
pub fn crop_zoom(
    image: &RgbImage,
    zoom: f64,
    pan_x: f64,
    pan_y: f64,
) -> MediaResult<Cow<'_, RgbImage>> {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return Err(MediaError::invalid_frame("empty frame"));
    }
    if !zoom.is_finite() || zoom <= 0.0 {
        return Err(MediaError::invalid_zoom(format!("zoom factor {}", zoom)));
    }
    if !pan_x.is_finite() || !pan_y.is_finite() {
        return Err(MediaError::invalid_zoom(format!("pan ({}, {})", pan_x, pan_y)));
    }

    if zoom == 1.0 && pan_x == 0.0 && pan_y == 0.0 {
        return Ok(Cow::Borrowed(image));
    }

    if zoom >= 1.0 {
        let crop_w = ((width as f64 / zoom).floor() as u32).clamp(1, width);
        let crop_h = ((height as f64 / zoom).floor() as u32).clamp(1, height);
        if crop_w == width && crop_h == height {
            return Ok(Cow::Borrowed(image));
        }

        let x = panned_origin(width, crop_w, pan_x);
        let y = panned_origin(height, crop_h, pan_y);
        Ok(Cow::Owned(
            imageops::crop_imm(image, x, y, crop_w, crop_h).to_image(),
        ))
    } else {
        let scaled_w = ((width as f64 * zoom).floor() as u32).max(1);
        let scaled_h = ((height as f64 * zoom).floor() as u32).max(1);
        let scaled = imageops::resize(image, scaled_w, scaled_h, FilterType::Triangle);

        let x = panned_origin(width, scaled_w, pan_x);
        let y = panned_origin(height, scaled_h, pan_y);
        let mut canvas = RgbImage::new(width, height);
        imageops::replace(&mut canvas, &scaled, x as i64, y as i64);
        Ok(Cow::Owned(canvas))
    }
}

/// [`crop_zoom`] driven by a slot's zoom state.
pub fn apply_zoom<'a>(image: &'a RgbImage, state: &ZoomState) -> MediaResult<Cow<'a, RgbImage>> {
    crop_zoom(image, state.factor, state.pan_x, state.pan_y)
}

/// Top-left coordinate of a `inner`-long window inside `outer`, centered on
/// `outer/2 + pan * outer/2` and clamped so the window stays inside.
fn panned_origin(outer: u32, inner: u32, pan: f64) -> u32 {
    let center = outer as f64 / 2.0 + pan * outer as f64 * 0.5;
    let origin = (center - inner as f64 / 2.0).round();
    let max_origin = outer.saturating_sub(inner) as f64;
    origin.clamp(0.0, max_origin) as u32
}
