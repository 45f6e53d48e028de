//! Motion-triggered rolling recorder.
//!
//! One recorder per camera slot:
//!
//! ```text
//! Idle --(trigger, writer opened)--> Active --(no trigger for post_seconds)--> Idle
//! ```
//!
//! Every frame goes into a bounded pre-roll buffer. On the trigger tick the
//! buffered frames from the last `pre_seconds` are flushed into a new file
//! ahead of the trigger frame, so recordings start before the motion did.
//! All timing uses frame timestamps, never the wall clock.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anomrec_models::{
    recording_file_name_with_sequence, EventStatus, RecordingEvent, RecordingState, Settings,
};
use chrono::{DateTime, Local, Utc};
use tracing::{error, info, warn};

use crate::error::{MediaError, MediaResult};
use crate::frame::Frame;
use crate::metrics;
use crate::prebuffer::Prebuffer;
use crate::writer::{MediaWriter, WriterFactory};

/// Absorbs float error when comparing elapsed time against post-roll.
const TIME_EPSILON: f64 = 1e-6;

/// Same-second collision suffixes tried before giving up.
const MAX_PATH_SEQUENCE: u32 = 1000;

/// Recorder settings for one slot.
#[derive(Debug, Clone, PartialEq)]
pub struct RecorderConfig {
    pub slot: u32,
    pub output_dir: PathBuf,
    pub pre_seconds: f64,
    pub post_seconds: f64,
    pub target_fps: u32,
}

impl RecorderConfig {
    pub fn new(slot: u32, output_dir: impl Into<PathBuf>) -> Self {
        Self::from_settings(slot, output_dir, &Settings::default())
    }

    pub fn from_settings(slot: u32, output_dir: impl Into<PathBuf>, settings: &Settings) -> Self {
        Self {
            slot,
            output_dir: output_dir.into(),
            pre_seconds: settings.pre_seconds,
            post_seconds: settings.post_seconds,
            target_fps: settings.target_fps,
        }
    }
}

/// Lifecycle output of one [`RollingRecorder::update`] call.
///
/// At most one of the two fields is set. Every `finished_event` belongs to
/// an event reported earlier through `new_event`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecorderUpdate {
    pub new_event: Option<RecordingEvent>,
    pub finished_event: Option<RecordingEvent>,
}

impl RecorderUpdate {
    pub fn is_empty(&self) -> bool {
        self.new_event.is_none() && self.finished_event.is_none()
    }
}

struct ActiveRecording {
    writer: Box<dyn MediaWriter>,
    event: RecordingEvent,
    start_ts: f64,
    last_motion_ts: f64,
    persons_max: u32,
    last_ts: f64,
    last_captured_at: DateTime<Utc>,
}

/// Pre-roll buffer plus recording state machine for one slot.
pub struct RollingRecorder {
    config: RecorderConfig,
    factory: Arc<dyn WriterFactory>,
    prebuffer: Prebuffer,
    active: Option<ActiveRecording>,
}

impl RollingRecorder {
    /// Create a recorder, making sure the output directory exists.
    pub fn new(config: RecorderConfig, factory: Arc<dyn WriterFactory>) -> MediaResult<Self> {
        std::fs::create_dir_all(&config.output_dir)?;
        let prebuffer = Prebuffer::new(config.pre_seconds, config.target_fps);
        Ok(Self {
            config,
            factory,
            prebuffer,
            active: None,
        })
    }

    pub fn config(&self) -> &RecorderConfig {
        &self.config
    }

    pub fn slot(&self) -> u32 {
        self.config.slot
    }

    pub fn state(&self) -> RecordingState {
        if self.active.is_some() {
            RecordingState::Active
        } else {
            RecordingState::Idle
        }
    }

    pub fn is_recording(&self) -> bool {
        self.active.is_some()
    }

    /// The event being recorded, if any.
    pub fn current_event(&self) -> Option<&RecordingEvent> {
        self.active.as_ref().map(|a| &a.event)
    }

    pub fn prebuffer_len(&self) -> usize {
        self.prebuffer.len()
    }

    pub fn prebuffer_capacity(&self) -> usize {
        self.prebuffer.capacity()
    }

    /// Advance the state machine by one tick.
    ///
    /// Returns an error only when a trigger could not start a recording:
    /// the writer failed to open, or writing the pre-roll failed (the partial
    /// file is removed). The recorder then stays Idle and no event is
    /// created. A write failure while Active ends the event with
    /// [`EventStatus::Aborted`] instead.
    pub fn update(
        &mut self,
        frame: &Frame,
        trigger: bool,
        person_count: u32,
    ) -> MediaResult<RecorderUpdate> {
        let result = match self.active.take() {
            None if trigger => self.start(frame, person_count),
            None => Ok(RecorderUpdate::default()),
            Some(active) => Ok(self.continue_recording(active, frame, trigger, person_count)),
        };

        self.prebuffer.push(frame.timestamp, &frame.image);
        result
    }

    /// Close any open writer. Returns the event finalized as
    /// [`EventStatus::Stopped`] when one was active.
    pub fn stop(&mut self) -> Option<RecordingEvent> {
        let mut active = self.active.take()?;
        if let Err(e) = active.writer.close() {
            warn!(slot = self.config.slot, path = %active.event.path.display(), error = %e, "Failed to close writer on stop");
        }

        let finished = active.event.finalized(
            active.last_captured_at,
            active.last_ts - active.start_ts,
            active.persons_max,
            EventStatus::Stopped,
        );
        info!(
            slot = self.config.slot,
            path = %finished.path.display(),
            frames = active.writer.frames_written(),
            "Recording stopped"
        );
        metrics::record_recording_finished(
            self.config.slot,
            finished.status.as_str(),
            finished.duration_secs.unwrap_or(0.0),
        );
        Some(finished)
    }

    /// Stop recording and forget buffered frames, e.g. when the camera changes.
    pub fn reset(&mut self) -> Option<RecordingEvent> {
        let stopped = self.stop();
        self.prebuffer.clear();
        stopped
    }

    fn start(&mut self, frame: &Frame, person_count: u32) -> MediaResult<RecorderUpdate> {
        let slot = self.config.slot;
        let now = frame.timestamp;
        let path = unique_recording_path(&self.config.output_dir, slot, &frame.captured_at)?;

        let mut writer = match self
            .factory
            .open(&path, frame.size(), self.config.target_fps)
        {
            Ok(writer) => writer,
            Err(e) => {
                error!(slot, path = %path.display(), error = %e, "Failed to open writer");
                metrics::record_writer_failure(slot, "open");
                return Err(e);
            }
        };

        let buffered = self.prebuffer.drain_recent(now);
        let preroll = buffered.len();
        let flushed = buffered
            .iter()
            .try_for_each(|entry| writer.write(&entry.image))
            .and_then(|_| writer.write(&frame.image));

        if let Err(e) = flushed {
            error!(slot, path = %path.display(), error = %e, "Pre-roll write failed, discarding recording");
            metrics::record_writer_failure(slot, "write");
            if let Err(close_err) = writer.close() {
                warn!(slot, path = %path.display(), error = %close_err, "Failed to close writer after write failure");
            }
            remove_partial(&path);
            return Err(e);
        }

        let event = RecordingEvent::started(slot, &path, frame.captured_at, person_count);
        metrics::record_recording_started(slot);
        info!(slot, path = %path.display(), preroll, persons = person_count, "Recording started");

        self.active = Some(ActiveRecording {
            writer,
            event: event.clone(),
            start_ts: now,
            last_motion_ts: now,
            persons_max: person_count,
            last_ts: now,
            last_captured_at: frame.captured_at,
        });
        Ok(RecorderUpdate {
            new_event: Some(event),
            finished_event: None,
        })
    }

    fn continue_recording(
        &mut self,
        mut active: ActiveRecording,
        frame: &Frame,
        trigger: bool,
        person_count: u32,
    ) -> RecorderUpdate {
        let now = frame.timestamp;

        if let Err(e) = active.writer.write(&frame.image) {
            return RecorderUpdate {
                new_event: None,
                finished_event: Some(self.abort(active, frame, e)),
            };
        }

        active.last_ts = now;
        active.last_captured_at = frame.captured_at;
        active.persons_max = active.persons_max.max(person_count);
        if trigger {
            active.last_motion_ts = now;
        }

        if now - active.last_motion_ts + TIME_EPSILON < self.config.post_seconds {
            self.active = Some(active);
            return RecorderUpdate::default();
        }

        let slot = self.config.slot;
        if let Err(e) = active.writer.close() {
            warn!(slot, path = %active.event.path.display(), error = %e, "Failed to close writer");
        }

        let finished = active.event.finalized(
            frame.captured_at,
            now - active.start_ts,
            active.persons_max,
            EventStatus::Completed,
        );
        info!(
            slot,
            path = %finished.path.display(),
            duration_secs = finished.duration_secs.unwrap_or(0.0),
            persons_max = finished.persons_max,
            frames = active.writer.frames_written(),
            "Recording finished"
        );
        metrics::record_recording_finished(slot, "completed", now - active.start_ts);

        RecorderUpdate {
            new_event: None,
            finished_event: Some(finished),
        }
    }

    /// End the event after a write failure, keeping what was written.
    fn abort(&mut self, mut active: ActiveRecording, frame: &Frame, cause: MediaError) -> RecordingEvent {
        let slot = self.config.slot;
        error!(slot, path = %active.event.path.display(), error = %cause, "Write failed, aborting recording");
        metrics::record_writer_failure(slot, "write");

        if let Err(e) = active.writer.close() {
            warn!(slot, path = %active.event.path.display(), error = %e, "Failed to close writer after write failure");
        }

        let duration = frame.timestamp - active.start_ts;
        metrics::record_recording_finished(slot, "aborted", duration);
        active.event.finalized(
            frame.captured_at,
            duration,
            active.persons_max,
            EventStatus::Aborted {
                reason: cause.to_string(),
            },
        )
    }
}

fn remove_partial(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove partial recording"),
    }
}

impl Drop for RollingRecorder {
    fn drop(&mut self) {
        if let Some(mut active) = self.active.take() {
            if let Err(e) = active.writer.close() {
                warn!(slot = self.config.slot, error = %e, "Failed to close writer on drop");
            }
        }
    }
}

/// First free `recording_cam{slot}_{stamp}[_N].avi` path in `dir`.
pub fn unique_recording_path(
    dir: &Path,
    slot: u32,
    captured_at: &DateTime<Utc>,
) -> MediaResult<PathBuf> {
    let local = captured_at.with_timezone(&Local).naive_local();
    for sequence in 0..MAX_PATH_SEQUENCE {
        let candidate = dir.join(recording_file_name_with_sequence(slot, &local, sequence));
        if !candidate.exists() {
            return Ok(candidate);
        }
    }
    Err(MediaError::writer_open_failed(
        dir,
        format!("no free recording name for slot {} at {}", slot, local),
    ))
}
