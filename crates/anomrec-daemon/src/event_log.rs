//! Numbered log of recording events.
//!
//! Start and finish notifications are paired by file path: a finished event
//! replaces the entry that was opened for the same path. Recordings already
//! on disk at startup are imported from their file names.

use std::fmt;
use std::path::Path;

use anomrec_media::{list_recordings, probe_avi};
use anomrec_models::{
    format_timestamp, parse_recording_file_name, EventStatus, RecordingEvent,
};
use chrono::{Duration as ChronoDuration, Local, TimeZone, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::DaemonResult;

/// One row of the log.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventEntry {
    /// 1-based, in order of appearance
    pub number: u32,
    pub event: RecordingEvent,
}

impl fmt::Display for EventEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let event = &self.event;
        write!(
            f,
            "#{} {} {} cam{}",
            self.number,
            event.file_name(),
            format_timestamp(&event.start.with_timezone(&Local)),
            event.slot
        )?;
        match event.duration_secs {
            Some(d) => write!(f, " {:.1} s", d)?,
            None => write!(f, " ...")?,
        }
        write!(f, " persons {} [{}]", event.persons_max, event.status.as_str())?;
        if let Some(note) = &event.note {
            write!(f, " \"{}\"", note)?;
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct EventLog {
    entries: Vec<EventEntry>,
    next_number: u32,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&mut self, event: RecordingEvent) -> u32 {
        self.next_number += 1;
        let number = self.next_number;
        self.entries.push(EventEntry { number, event });
        number
    }

    /// Add a newly started event. Returns its number.
    pub fn record_started(&mut self, event: RecordingEvent) -> u32 {
        let number = self.push(event);
        debug!(number, "Event opened");
        number
    }

    /// Replace the open entry with the same path by the finished event.
    ///
    /// A finish without a matching start is appended as a new entry.
    pub fn record_finished(&mut self, event: RecordingEvent) -> u32 {
        let open = self
            .entries
            .iter_mut()
            .rev()
            .find(|entry| entry.event.path == event.path && !entry.event.is_finalized());

        match open {
            Some(entry) => {
                let note = entry.event.note.take();
                entry.event = event;
                if entry.event.note.is_none() {
                    entry.event.note = note;
                }
                entry.number
            }
            None => {
                warn!(path = %event.path.display(), "Finished event had no matching start");
                self.push(event)
            }
        }
    }

    /// Attach an operator note. Returns false for an unknown number.
    pub fn add_note(&mut self, number: u32, note: &str) -> bool {
        match self.entries.iter_mut().find(|e| e.number == number) {
            Some(entry) => {
                entry.event = entry.event.with_note(note.trim());
                true
            }
            None => false,
        }
    }

    /// Import recordings already present in `dir`, oldest first.
    ///
    /// Files whose names do not parse are skipped. Durations come from the
    /// AVI headers when they can be read.
    pub fn load_existing(&mut self, dir: &Path) -> DaemonResult<usize> {
        let mut imported = 0;
        for file in list_recordings(dir)? {
            let Some(name) = file
                .path
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(parse_recording_file_name)
            else {
                debug!(path = %file.path.display(), "Skipping unrecognised file");
                continue;
            };
            if self.find_by_path(&file.path).is_some() {
                continue;
            }

            let start = Local
                .from_local_datetime(&name.started)
                .earliest()
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_else(|| name.started.and_utc());
            let duration = probe_avi(&file.path).ok().map(|info| info.duration);

            let mut event = RecordingEvent::started(name.slot, &file.path, start, 0);
            event.status = EventStatus::Imported;
            event.duration_secs = duration;
            event.end = duration.map(|d| start + ChronoDuration::milliseconds((d * 1000.0) as i64));
            self.push(event);
            imported += 1;
        }

        if imported > 0 {
            info!(dir = %dir.display(), imported, "Loaded existing recordings");
        }
        Ok(imported)
    }

    pub fn find_by_path(&self, path: &Path) -> Option<&EventEntry> {
        self.entries.iter().rev().find(|e| e.event.path == path)
    }

    pub fn get(&self, number: u32) -> Option<&EventEntry> {
        self.entries.iter().find(|e| e.number == number)
    }

    pub fn entries(&self) -> &[EventEntry] {
        &self.entries
    }

    /// Entries still being recorded.
    pub fn open_entries(&self) -> impl Iterator<Item = &EventEntry> {
        self.entries.iter().filter(|e| !e.event.is_finalized())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Forget finished entries, e.g. after the recordings were cleared.
    /// Events still being recorded stay.
    pub fn clear_finished(&mut self) {
        self.entries.retain(|e| !e.event.is_finalized());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anomrec_media::{MediaWriter, MjpegAviWriter};
    use image::RgbImage;

    fn started(path: &str) -> RecordingEvent {
        RecordingEvent::started(0, path, Utc::now(), 1)
    }

    #[test]
    fn test_start_finish_pairing() {
        let mut log = EventLog::new();
        let a = started("/r/a.avi");
        let b = started("/r/b.avi");
        assert_eq!(log.record_started(a.clone()), 1);
        assert_eq!(log.record_started(b.clone()), 2);
        assert_eq!(log.open_entries().count(), 2);

        let finished = a.finalized(Utc::now(), 5.0, 3, EventStatus::Completed);
        assert_eq!(log.record_finished(finished), 1);

        let entry = log.get(1).unwrap();
        assert_eq!(entry.event.status, EventStatus::Completed);
        assert_eq!(entry.event.persons_max, 3);
        assert_eq!(log.len(), 2);
        assert_eq!(log.open_entries().count(), 1);
    }

    #[test]
    fn test_unmatched_finish_is_appended() {
        let mut log = EventLog::new();
        let orphan = started("/r/x.avi").finalized(Utc::now(), 1.0, 0, EventStatus::Stopped);
        assert_eq!(log.record_finished(orphan), 1);
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn test_note_survives_finish() {
        let mut log = EventLog::new();
        let event = started("/r/a.avi");
        let number = log.record_started(event.clone());
        assert!(log.add_note(number, "  delivery van  "));
        assert!(!log.add_note(99, "nope"));

        log.record_finished(event.finalized(Utc::now(), 2.0, 1, EventStatus::Completed));
        let entry = log.get(number).unwrap();
        assert_eq!(entry.event.note.as_deref(), Some("delivery van"));
        assert!(entry.to_string().contains("\"delivery van\""));
        assert!(entry.to_string().contains("[completed]"));
    }

    #[test]
    fn test_load_existing_recordings() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("recording_cam1_20240501_120000.avi");
        let mut writer = MjpegAviWriter::create(&path, 8, 8, 10, 80).unwrap();
        for _ in 0..20 {
            writer.write(&RgbImage::new(8, 8)).unwrap();
        }
        writer.close().unwrap();
        std::fs::write(dir.path().join("holiday.avi"), b"junk").unwrap();

        let mut log = EventLog::new();
        assert_eq!(log.load_existing(dir.path()).unwrap(), 1);
        let entry = &log.entries()[0];
        assert_eq!(entry.event.slot, 1);
        assert_eq!(entry.event.status, EventStatus::Imported);
        assert!((entry.event.duration_secs.unwrap() - 2.0).abs() < 1e-9);

        // Loading twice does not duplicate.
        assert_eq!(log.load_existing(dir.path()).unwrap(), 0);
        assert!(log.find_by_path(&path).is_some());
    }
}
