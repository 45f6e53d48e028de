//! Bounded pre-roll frame buffer.

use std::collections::VecDeque;

use image::RgbImage;

/// A buffered frame copy with its capture timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct PrebufferEntry {
    pub timestamp: f64,
    pub image: RgbImage,
}

/// Ring of the most recent frames, oldest evicted first.
///
/// Capacity is `pre_seconds * target_fps` frames, rounded to the nearest
/// whole frame; a capacity of zero keeps
/// nothing.
#[derive(Debug)]
pub struct Prebuffer {
    entries: VecDeque<PrebufferEntry>,
    capacity: usize,
    pre_seconds: f64,
}

impl Prebuffer {
    pub fn new(pre_seconds: f64, target_fps: u32) -> Self {
        let pre_seconds = if pre_seconds.is_finite() {
            pre_seconds.max(0.0)
        } else {
            0.0
        };
        let capacity = (pre_seconds * target_fps as f64).round() as usize;
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
            pre_seconds,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Store a copy of the frame, evicting the oldest entry when full.
    pub fn push(&mut self, timestamp: f64, image: &RgbImage) {
        if self.capacity == 0 {
            return;
        }
        // Reuse the evicted buffer when the size matches.
        let entry = if self.entries.len() >= self.capacity {
            self.entries.pop_front().map(|mut old| {
                if old.image.dimensions() == image.dimensions() {
                    old.image.copy_from_slice(image.as_raw());
                    old.timestamp = timestamp;
                    old
                } else {
                    PrebufferEntry {
                        timestamp,
                        image: image.clone(),
                    }
                }
            })
        } else {
            None
        };

        self.entries.push_back(entry.unwrap_or_else(|| PrebufferEntry {
            timestamp,
            image: image.clone(),
        }));
    }

    /// Remove and return the entries captured within `pre_seconds` of `now`,
    /// oldest first. Older entries are discarded.
    pub fn drain_recent(&mut self, now: f64) -> Vec<PrebufferEntry> {
        let cutoff = now - self.pre_seconds;
        self.entries
            .drain(..)
            .filter(|entry| entry.timestamp >= cutoff)
            .collect()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Timestamps currently held, oldest first.
    pub fn timestamps(&self) -> impl Iterator<Item = f64> + '_ {
        self.entries.iter().map(|e| e.timestamp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn image(shade: u8) -> RgbImage {
        RgbImage::from_pixel(4, 4, Rgb([shade, shade, shade]))
    }

    #[test]
    fn test_capacity_is_bounded() {
        let mut buffer = Prebuffer::new(3.0, 30);
        assert_eq!(buffer.capacity(), 90);
        for i in 0..500 {
            buffer.push(i as f64 / 30.0, &image(i as u8));
            assert!(buffer.len() <= 90);
        }
        assert_eq!(buffer.len(), 90);
        assert_eq!(buffer.timestamps().next(), Some(410.0 / 30.0));
    }

    #[test]
    fn test_drain_recent_filters_old_entries() {
        let mut buffer = Prebuffer::new(1.0, 10);
        buffer.push(0.0, &image(1));
        buffer.push(5.0, &image(2));
        buffer.push(5.5, &image(3));

        let drained = buffer.drain_recent(6.0);
        let stamps: Vec<f64> = drained.iter().map(|e| e.timestamp).collect();
        assert_eq!(stamps, vec![5.0, 5.5]);
        assert_eq!(drained[1].image, image(3));
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_capacity_rounds_float_error() {
        assert_eq!(Prebuffer::new(0.57, 100).capacity(), 57);
        assert_eq!(Prebuffer::new(0.1, 30).capacity(), 3);
    }

    #[test]
    fn test_zero_capacity_keeps_nothing() {
        let mut buffer = Prebuffer::new(0.0, 30);
        buffer.push(1.0, &image(1));
        assert!(buffer.is_empty());
        assert!(buffer.drain_recent(1.0).is_empty());
    }

    #[test]
    fn test_entries_are_copies() {
        let mut buffer = Prebuffer::new(1.0, 2);
        let mut source = image(10);
        buffer.push(0.0, &source);
        source.put_pixel(0, 0, Rgb([99, 99, 99]));
        buffer.push(0.5, &image(20));
        buffer.push(1.0, &image(30));

        let drained = buffer.drain_recent(1.0);
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].image, image(20));
        assert_eq!(drained[1].image, image(30));
    }
}
