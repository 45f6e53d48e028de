//! Shared data models for the AnomRec recording engine.
//!
//! This crate provides Serde-serializable types for:
//! - Recording events and recorder state
//! - Zoom/pan view state
//! - Motion signals
//! - Camera sources (USB and network)
//! - Engine settings and their validation
//! - Recording/snapshot file naming and human-readable formatting

pub mod camera;
pub mod event;
pub mod humanize;
pub mod motion;
pub mod naming;
pub mod settings;
pub mod zoom;

// Re-export common types
pub use camera::{CameraSource, CameraSourceParseError, Credentials};
pub use event::{EventId, EventStatus, RecordingEvent, RecordingState};
pub use humanize::{format_bytes, format_percentage, format_timestamp};
pub use motion::{MotionSignal, MOTION_THRESHOLD_MAX};
pub use naming::{
    is_recording_file, parse_recording_file_name, recording_file_name,
    recording_file_name_with_sequence, snapshot_file_name, RecordingName, RECORDING_EXTENSION,
    RECORDING_PREFIX, SNAPSHOT_EXTENSION, SNAPSHOT_PREFIX,
};
pub use settings::{Settings, MAX_SLOTS};
pub use zoom::ZoomState;
