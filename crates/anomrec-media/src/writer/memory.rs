//! In-memory writer for tests and dry runs.
//!
//! Nothing touches the disk. The factory keeps a shared journal of every
//! writer it opened, so callers can assert on frame counts and closes after
//! the recorder has dropped its handle.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use image::RgbImage;

use super::{MediaWriter, WriterFactory};
use crate::error::{MediaError, MediaResult};

/// What happened to one writer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriterRecord {
    pub path: PathBuf,
    pub size: (u32, u32),
    pub fps: u32,
    pub frames: u64,
    pub closed: bool,
}

/// Shared list of writers opened by a [`MemoryWriterFactory`].
#[derive(Debug, Clone, Default)]
pub struct WriterJournal {
    records: Arc<Mutex<Vec<WriterRecord>>>,
}

impl WriterJournal {
    fn lock(&self) -> MutexGuard<'_, Vec<WriterRecord>> {
        // A poisoned journal only means a test already panicked.
        match self.records.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn records(&self) -> Vec<WriterRecord> {
        self.lock().clone()
    }

    pub fn opened(&self) -> usize {
        self.lock().len()
    }

    pub fn open_writers(&self) -> usize {
        self.lock().iter().filter(|r| !r.closed).count()
    }

    pub fn total_frames(&self) -> u64 {
        self.lock().iter().map(|r| r.frames).sum()
    }

    fn update(&self, index: usize, f: impl FnOnce(&mut WriterRecord)) {
        if let Some(record) = self.lock().get_mut(index) {
            f(record);
        }
    }
}

/// Factory producing [`MemoryWriter`]s, with optional failure injection.
#[derive(Debug, Clone, Default)]
pub struct MemoryWriterFactory {
    journal: WriterJournal,
    fail_open: bool,
    fail_after: Option<u64>,
}

impl MemoryWriterFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every `open` fails.
    pub fn failing_open() -> Self {
        Self {
            fail_open: true,
            ..Self::default()
        }
    }

    /// Writers fail once they hold `frames` frames.
    pub fn failing_after(frames: u64) -> Self {
        Self {
            fail_after: Some(frames),
            ..Self::default()
        }
    }

    pub fn journal(&self) -> WriterJournal {
        self.journal.clone()
    }
}

impl WriterFactory for MemoryWriterFactory {
    fn open(&self, path: &Path, size: (u32, u32), fps: u32) -> MediaResult<Box<dyn MediaWriter>> {
        if self.fail_open {
            return Err(MediaError::writer_open_failed(path, "writer disabled"));
        }
        let index = {
            let mut records = self.journal.lock();
            records.push(WriterRecord {
                path: path.to_path_buf(),
                size,
                fps,
                ..WriterRecord::default()
            });
            records.len() - 1
        };
        Ok(Box::new(MemoryWriter {
            path: path.to_path_buf(),
            journal: self.journal.clone(),
            index,
            frames: 0,
            closed: false,
            fail_after: self.fail_after,
        }))
    }
}

/// Writer that only counts frames.
pub struct MemoryWriter {
    path: PathBuf,
    journal: WriterJournal,
    index: usize,
    frames: u64,
    closed: bool,
    fail_after: Option<u64>,
}

impl MediaWriter for MemoryWriter {
    fn write(&mut self, _image: &RgbImage) -> MediaResult<()> {
        if self.closed {
            return Err(MediaError::WriterClosed);
        }
        if self.fail_after.is_some_and(|limit| self.frames >= limit) {
            return Err(MediaError::write_failed(&self.path, "injected write failure"));
        }
        self.frames += 1;
        self.journal.update(self.index, |r| r.frames += 1);
        Ok(())
    }

    fn close(&mut self) -> MediaResult<()> {
        if !self.closed {
            self.closed = true;
            self.journal.update(self.index, |r| r.closed = true);
        }
        Ok(())
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn frames_written(&self) -> u64 {
        self.frames
    }
}
