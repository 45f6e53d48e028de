//! Recording event and recorder state models.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Unique identifier for a recording event.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct EventId(pub String);

impl EventId {
    /// Generate a new random event ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Recorder state for a single camera slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum RecordingState {
    /// Buffering pre-roll, no writer open
    #[default]
    Idle,
    /// Writer open, frames are being recorded
    Active,
}

impl RecordingState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordingState::Idle => "idle",
            RecordingState::Active => "active",
        }
    }
}

impl fmt::Display for RecordingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Lifecycle status of a recording event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum EventStatus {
    /// Writer is open and the event is still growing
    #[default]
    Recording,
    /// Post-roll elapsed and the writer was closed normally
    Completed,
    /// A write failed mid-event; the file holds everything written before the failure
    Aborted { reason: String },
    /// The recorder was stopped explicitly (shutdown, camera removed)
    Stopped,
    /// Loaded from disk; only the file name was available
    Imported,
}

impl EventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventStatus::Recording => "recording",
            EventStatus::Completed => "completed",
            EventStatus::Aborted { .. } => "aborted",
            EventStatus::Stopped => "stopped",
            EventStatus::Imported => "imported",
        }
    }

    /// Whether the event can no longer change.
    pub fn is_final(&self) -> bool {
        !matches!(self, EventStatus::Recording)
    }
}

/// A single motion-triggered recording.
///
/// Created when the recorder goes Idle→Active and finalized on Active→Idle.
/// Finalized events are never mutated; annotations produce a new value via
/// [`RecordingEvent::with_note`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RecordingEvent {
    pub id: EventId,
    /// Camera slot that produced the event
    pub slot: u32,
    /// Target file of the media writer
    pub path: PathBuf,
    /// Wall-clock time of the trigger tick
    pub start: DateTime<Utc>,
    /// Wall-clock time of the finishing tick
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<DateTime<Utc>>,
    /// Seconds between the trigger tick and the finishing tick
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<f64>,
    /// Highest person count seen while the event was active
    pub persons_max: u32,
    /// Free-form annotation added by an operator
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    pub status: EventStatus,
}

impl RecordingEvent {
    /// Create a new active event.
    pub fn started(slot: u32, path: impl Into<PathBuf>, start: DateTime<Utc>, persons: u32) -> Self {
        Self {
            id: EventId::new(),
            slot,
            path: path.into(),
            start,
            end: None,
            duration_secs: None,
            persons_max: persons,
            note: None,
            status: EventStatus::Recording,
        }
    }

    /// Produce the finalized copy of an active event.
    pub fn finalized(
        &self,
        end: DateTime<Utc>,
        duration_secs: f64,
        persons_max: u32,
        status: EventStatus,
    ) -> Self {
        Self {
            end: Some(end),
            duration_secs: Some(duration_secs.max(0.0)),
            persons_max: persons_max.max(self.persons_max),
            status,
            ..self.clone()
        }
    }

    /// Return a copy carrying the given operator note.
    pub fn with_note(&self, note: impl Into<String>) -> Self {
        Self {
            note: Some(note.into()),
            ..self.clone()
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_finalized(&self) -> bool {
        self.status.is_final()
    }

    /// File name component of the path, for display.
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample() -> RecordingEvent {
        let start = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        RecordingEvent::started(0, "/tmp/recording_cam0_20240501_120000.avi", start, 1)
    }

    #[test]
    fn test_started_event_is_open() {
        let event = sample();
        assert_eq!(event.status, EventStatus::Recording);
        assert!(!event.is_finalized());
        assert!(event.end.is_none());
        assert!(event.duration_secs.is_none());
        assert_eq!(event.file_name(), "recording_cam0_20240501_120000.avi");
    }

    #[test]
    fn test_finalized_keeps_identity() {
        let event = sample();
        let end = event.start + chrono::Duration::seconds(8);
        let done = event.finalized(end, 8.0, 3, EventStatus::Completed);

        assert_eq!(done.id, event.id);
        assert_eq!(done.path, event.path);
        assert_eq!(done.end, Some(end));
        assert_eq!(done.duration_secs, Some(8.0));
        assert_eq!(done.persons_max, 3);
        assert!(done.is_finalized());
    }

    #[test]
    fn test_finalized_never_lowers_persons() {
        let event = sample();
        let done = event.finalized(event.start, 1.0, 0, EventStatus::Completed);
        assert_eq!(done.persons_max, 1);
    }

    #[test]
    fn test_status_serialization() {
        let event = sample().finalized(Utc::now(), 2.0, 1, EventStatus::Aborted {
            reason: "disk full".into(),
        });
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["status"]["state"], "aborted");
        assert_eq!(json["status"]["reason"], "disk full");

        let back: RecordingEvent = serde_json::from_value(json).unwrap();
        assert_eq!(
            back.status,
            EventStatus::Aborted {
                reason: "disk full".into()
            }
        );
    }

    #[test]
    fn test_with_note() {
        let event = sample();
        let noted = event.with_note("delivery van");
        assert_eq!(noted.note.as_deref(), Some("delivery van"));
        assert!(event.note.is_none());
    }
}
