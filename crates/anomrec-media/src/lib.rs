#![deny(unreachable_patterns)]
//! Frame processing and motion-triggered recording.
//!
//! This crate provides:
//! - The captured [`Frame`] type and a monotonic [`Clock`]
//! - Zoom/pan cropping of frames
//! - Background-subtraction motion estimation and HOG person detection
//! - A pre-roll buffer and the rolling recorder state machine
//! - A native motion-JPEG AVI writer
//! - Storage quota enforcement for the recordings directory
//! - Camera frame sources and a reconnect supervisor with backoff

pub mod annotate;
pub mod clock;
pub mod detection;
pub mod error;
pub mod frame;
pub mod metrics;
pub mod prebuffer;
pub mod quota;
pub mod reconnect;
pub mod recorder;
pub mod snapshot;
pub mod source;
pub mod writer;
pub mod zoom_pan;

pub use annotate::annotate_detections;
pub use clock::{Clock, ManualClock, MonotonicClock};
pub use detection::{
    DetectionConfig, DetectionPipeline, FrameAnalysis, MotionEstimator, PersonDetection,
    PersonDetector, PipelineBuilder,
};
pub use error::{MediaError, MediaResult};
pub use frame::Frame;
pub use prebuffer::{Prebuffer, PrebufferEntry};
pub use quota::{
    clear_recordings, directory_usage, list_recordings, QuotaReport, RecordingFile,
    StorageQuotaEnforcer, StorageUsage,
};
pub use reconnect::{ReconnectState, ReconnectStatus, ReconnectSupervisor};
pub use recorder::{unique_recording_path, RecorderConfig, RecorderUpdate, RollingRecorder};
pub use snapshot::save_snapshot;
pub use source::{
    probe_usb_cameras, DefaultSourceFactory, FfmpegCommand, FrameSource, HttpCameraSource,
    PipedJpegSource, ScriptStep, ScriptedSource, SourceFactory,
};
pub use writer::{
    probe_avi, AviInfo, MediaWriter, MemoryWriterFactory, MjpegAviWriter, MjpegWriterFactory,
    WriterFactory,
};
pub use zoom_pan::{apply_zoom, crop_zoom};
