//! Media writers for recorded events.
//!
//! The recorder only sees the [`MediaWriter`] / [`WriterFactory`] pair, so
//! tests can swap in an in-memory writer and the container format can change
//! without touching the state machine.

pub mod avi;
pub mod memory;

use std::path::Path;

use image::RgbImage;

use crate::error::MediaResult;

pub use avi::{probe_avi, read_avi_frames, AviInfo, MjpegAviWriter};
pub use memory::{MemoryWriter, MemoryWriterFactory, WriterJournal, WriterRecord};

/// An open recording file.
pub trait MediaWriter: Send {
    /// Append one frame.
    fn write(&mut self, image: &RgbImage) -> MediaResult<()>;

    /// Finish the file. Further writes fail; closing twice is a no-op.
    fn close(&mut self) -> MediaResult<()>;

    fn path(&self) -> &Path;

    fn frames_written(&self) -> u64;
}

/// Opens writers at trigger time.
pub trait WriterFactory: Send + Sync {
    /// `size` is `(width, height)` of the frames that will be written.
    fn open(&self, path: &Path, size: (u32, u32), fps: u32) -> MediaResult<Box<dyn MediaWriter>>;
}

/// Factory for motion-JPEG AVI files.
#[derive(Debug, Clone, Copy)]
pub struct MjpegWriterFactory {
    quality: u8,
}

impl MjpegWriterFactory {
    pub fn new(quality: u8) -> Self {
        Self {
            quality: quality.clamp(1, 100),
        }
    }

    pub fn quality(&self) -> u8 {
        self.quality
    }
}

impl Default for MjpegWriterFactory {
    fn default() -> Self {
        Self::new(85)
    }
}

impl WriterFactory for MjpegWriterFactory {
    fn open(&self, path: &Path, size: (u32, u32), fps: u32) -> MediaResult<Box<dyn MediaWriter>> {
        let writer = MjpegAviWriter::create(path, size.0, size.1, fps, self.quality)?;
        Ok(Box::new(writer))
    }
}
