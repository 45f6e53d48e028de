//! Scripted frame source for tests and demos.
//!
//! Plays back a queue of steps, then keeps yielding blank frames. Open
//! failures and read failures can be injected; counters are shared with the
//! test through [`SourceStats`].

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use image::RgbImage;

use super::FrameSource;
use crate::clock::Clock;
use crate::error::{MediaError, MediaResult};
use crate::frame::Frame;

/// One scripted read.
#[derive(Debug, Clone)]
pub enum ScriptStep {
    Frame(RgbImage),
    /// The read fails as if the camera was unplugged.
    Lost,
}

/// Call counters shared between a [`ScriptedSource`] and its observers.
#[derive(Debug, Default)]
pub struct SourceStats {
    opens: AtomicU32,
    failed_opens: AtomicU32,
    reads: AtomicU32,
    releases: AtomicU32,
}

impl SourceStats {
    pub fn opens(&self) -> u32 {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn failed_opens(&self) -> u32 {
        self.failed_opens.load(Ordering::SeqCst)
    }

    pub fn reads(&self) -> u32 {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn releases(&self) -> u32 {
        self.releases.load(Ordering::SeqCst)
    }
}

pub struct ScriptedSource {
    label: String,
    size: (u32, u32),
    steps: VecDeque<ScriptStep>,
    open_failures: u32,
    open: bool,
    clock: Arc<dyn Clock>,
    stats: Arc<SourceStats>,
}

impl ScriptedSource {
    /// Source yielding black `width x height` frames.
    pub fn new(label: impl Into<String>, width: u32, height: u32, clock: Arc<dyn Clock>) -> Self {
        Self {
            label: label.into(),
            size: (width, height),
            steps: VecDeque::new(),
            open_failures: 0,
            open: false,
            clock,
            stats: Arc::new(SourceStats::default()),
        }
    }

    pub fn with_steps(mut self, steps: impl IntoIterator<Item = ScriptStep>) -> Self {
        self.steps.extend(steps);
        self
    }

    /// The next `count` opens fail.
    pub fn failing_opens(mut self, count: u32) -> Self {
        self.open_failures = count;
        self
    }

    pub fn stats(&self) -> Arc<SourceStats> {
        self.stats.clone()
    }

    pub fn push_step(&mut self, step: ScriptStep) {
        self.steps.push_back(step);
    }
}

#[async_trait]
impl FrameSource for ScriptedSource {
    fn label(&self) -> String {
        self.label.clone()
    }

    fn is_open(&self) -> bool {
        self.open
    }

    async fn open(&mut self) -> MediaResult<()> {
        if self.open {
            return Ok(());
        }
        if self.open_failures > 0 {
            self.open_failures -= 1;
            self.stats.failed_opens.fetch_add(1, Ordering::SeqCst);
            return Err(MediaError::source_unavailable(&self.label, "scripted open failure"));
        }
        self.open = true;
        self.stats.opens.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn read(&mut self) -> MediaResult<Frame> {
        if !self.open {
            return Err(MediaError::source_unavailable(&self.label, "not open"));
        }
        self.stats.reads.fetch_add(1, Ordering::SeqCst);

        let image = match self.steps.pop_front() {
            Some(ScriptStep::Frame(image)) => image,
            Some(ScriptStep::Lost) => {
                return Err(MediaError::source_unavailable(&self.label, "scripted loss"))
            }
            None => RgbImage::new(self.size.0, self.size.1),
        };
        Ok(Frame::new(image, self.clock.now(), Utc::now()))
    }

    async fn release(&mut self) {
        if self.open {
            self.open = false;
            self.stats.releases.fetch_add(1, Ordering::SeqCst);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use image::Rgb;

    #[tokio::test]
    async fn test_plays_script_then_blank() {
        let clock = ManualClock::new(1.0);
        let white = RgbImage::from_pixel(4, 4, Rgb([255, 255, 255]));
        let mut source = ScriptedSource::new("fake", 4, 4, Arc::new(clock.clone()))
            .with_steps([ScriptStep::Frame(white.clone()), ScriptStep::Lost]);
        let stats = source.stats();

        assert!(source.read().await.is_err());
        source.open().await.unwrap();

        let frame = source.read().await.unwrap();
        assert_eq!(frame.image, white);
        assert_eq!(frame.timestamp, 1.0);

        assert!(source.read().await.unwrap_err().is_source_lost());

        clock.advance(0.5);
        let blank = source.read().await.unwrap();
        assert_eq!(blank.image.get_pixel(0, 0), &Rgb([0, 0, 0]));
        assert_eq!(blank.timestamp, 1.5);

        source.release().await;
        source.release().await;
        assert_eq!(stats.opens(), 1);
        assert_eq!(stats.reads(), 3);
        assert_eq!(stats.releases(), 1);
    }

    #[tokio::test]
    async fn test_open_failures() {
        let mut source =
            ScriptedSource::new("fake", 2, 2, Arc::new(ManualClock::new(0.0))).failing_opens(2);
        assert!(source.open().await.is_err());
        assert!(source.open().await.is_err());
        source.open().await.unwrap();
        assert!(source.is_open());
        assert_eq!(source.stats().failed_opens(), 2);
    }
}
