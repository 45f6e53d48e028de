//! USB cameras through Video4Linux.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use image::{ImageFormat, RgbImage};
use tracing::{debug, info};
use v4l::buffer::Type;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;
use v4l::FourCC;

use super::FrameSource;
use crate::clock::Clock;
use crate::error::{MediaError, MediaResult};
use crate::frame::Frame;

const STREAM_BUFFERS: u32 = 4;

struct Capturing {
    // Keeps the device handle alive for the stream.
    _device: Device,
    stream: MmapStream<'static>,
    width: u32,
    height: u32,
    fourcc: FourCC,
}

/// Memory-mapped capture from `/dev/video{index}`, MJPEG or YUYV.
pub struct V4lSource {
    index: u32,
    clock: Arc<dyn Clock>,
    capturing: Option<Capturing>,
}

impl V4lSource {
    pub fn new(index: u32, clock: Arc<dyn Clock>) -> Self {
        Self {
            index,
            clock,
            capturing: None,
        }
    }

    fn lost(&self, e: impl std::fmt::Display) -> MediaError {
        MediaError::source_unavailable(self.label(), e.to_string())
    }
}

#[async_trait]
impl FrameSource for V4lSource {
    fn label(&self) -> String {
        format!("usb-{}", self.index + 1)
    }

    fn is_open(&self) -> bool {
        self.capturing.is_some()
    }

    async fn open(&mut self) -> MediaResult<()> {
        if self.capturing.is_some() {
            return Ok(());
        }

        let device = Device::new(self.index as usize).map_err(|e| self.lost(e))?;
        let mut format = device.format().map_err(|e| self.lost(e))?;
        format.fourcc = FourCC::new(b"MJPG");
        let format = device.set_format(&format).map_err(|e| self.lost(e))?;

        if format.fourcc != FourCC::new(b"MJPG") && format.fourcc != FourCC::new(b"YUYV") {
            return Err(MediaError::UnsupportedSource(format!(
                "{}: pixel format {}",
                self.label(),
                format.fourcc
            )));
        }

        let stream = MmapStream::with_buffers(&device, Type::VideoCapture, STREAM_BUFFERS)
            .map_err(|e| self.lost(e))?;

        info!(
            camera = %self.label(),
            width = format.width,
            height = format.height,
            fourcc = %format.fourcc,
            "USB camera opened"
        );
        self.capturing = Some(Capturing {
            _device: device,
            stream,
            width: format.width,
            height: format.height,
            fourcc: format.fourcc,
        });
        Ok(())
    }

    async fn read(&mut self) -> MediaResult<Frame> {
        let label = self.label();
        let Some(capturing) = self.capturing.as_mut() else {
            return Err(MediaError::source_unavailable(label, "not open"));
        };

        let (buf, meta) = capturing
            .stream
            .next()
            .map_err(|e| MediaError::source_unavailable(label.clone(), e.to_string()))?;
        let data = &buf[..(meta.bytesused as usize).min(buf.len())];

        let image = if capturing.fourcc == FourCC::new(b"MJPG") {
            image::load_from_memory_with_format(data, ImageFormat::Jpeg)?.to_rgb8()
        } else {
            yuyv_to_rgb(data, capturing.width, capturing.height)?
        };

        Ok(Frame::new(image, self.clock.now(), Utc::now()))
    }

    async fn release(&mut self) {
        if self.capturing.take().is_some() {
            debug!(camera = %self.label(), "USB camera released");
        }
    }
}

/// Packed YUYV 4:2:2 to RGB (BT.601).
fn yuyv_to_rgb(data: &[u8], width: u32, height: u32) -> MediaResult<RgbImage> {
    let expected = width as usize * height as usize * 2;
    if data.len() < expected {
        return Err(MediaError::invalid_frame(format!(
            "YUYV buffer holds {} bytes, {}x{} needs {}",
            data.len(),
            width,
            height,
            expected
        )));
    }

    let mut rgb = Vec::with_capacity(width as usize * height as usize * 3);
    for chunk in data[..expected].chunks_exact(4) {
        let (y0, u, y1, v) = (chunk[0], chunk[1], chunk[2], chunk[3]);
        for y in [y0, y1] {
            rgb.extend_from_slice(&yuv_pixel(y, u, v));
        }
    }

    RgbImage::from_raw(width, height, rgb)
        .ok_or_else(|| MediaError::invalid_frame("YUYV conversion size mismatch"))
}

fn yuv_pixel(y: u8, u: u8, v: u8) -> [u8; 3] {
    let c = y as f32 - 16.0;
    let d = u as f32 - 128.0;
    let e = v as f32 - 128.0;
    let r = 1.164 * c + 1.596 * e;
    let g = 1.164 * c - 0.392 * d - 0.813 * e;
    let b = 1.164 * c + 2.017 * d;
    [
        r.round().clamp(0.0, 255.0) as u8,
        g.round().clamp(0.0, 255.0) as u8,
        b.round().clamp(0.0, 255.0) as u8,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_yuyv_gray() {
        // Y=126 with neutral chroma is mid gray.
        let data = [126u8, 128, 126, 128].repeat(4);
        let img = yuyv_to_rgb(&data, 4, 2).unwrap();
        let px = img.get_pixel(3, 1).0;
        assert_eq!(px[0], px[1]);
        assert_eq!(px[1], px[2]);
        assert!((px[0] as i32 - 128).abs() <= 1);
    }

    #[test]
    fn test_yuyv_short_buffer() {
        assert!(yuyv_to_rgb(&[0u8; 6], 2, 2).is_err());
    }
}
