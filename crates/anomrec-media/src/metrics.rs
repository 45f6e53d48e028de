//! Recording engine metrics.
//!
//! Provides standardized metrics for monitoring the engine:
//! - Recording lifecycle counters by slot
//! - Writer failure counters
//! - Quota evictions and bytes freed
//! - Reconnect attempts
//! - Frame throughput and motion level distribution

use metrics::{counter, gauge, histogram};

// =============================================================================
// Metric Names
// =============================================================================

/// Metric name constants for consistency.
pub mod names {
    /// Recordings opened, by slot.
    pub const RECORDINGS_STARTED_TOTAL: &str = "anomrec_recordings_started_total";

    /// Recordings closed, by slot and final status.
    pub const RECORDINGS_FINISHED_TOTAL: &str = "anomrec_recordings_finished_total";

    /// Recording duration in seconds.
    pub const RECORDING_DURATION_SECONDS: &str = "anomrec_recording_duration_seconds";

    /// Writer open/write failures, by slot and stage.
    pub const WRITER_FAILURES_TOTAL: &str = "anomrec_writer_failures_total";

    /// Files deleted by quota enforcement.
    pub const QUOTA_EVICTIONS_TOTAL: &str = "anomrec_quota_evictions_total";

    /// Bytes freed by quota enforcement.
    pub const QUOTA_BYTES_FREED_TOTAL: &str = "anomrec_quota_bytes_freed_total";

    /// Bytes used by recordings after the last quota pass.
    pub const STORAGE_USED_BYTES: &str = "anomrec_storage_used_bytes";

    /// Reconnect attempts, by slot and outcome.
    pub const RECONNECT_ATTEMPTS_TOTAL: &str = "anomrec_reconnect_attempts_total";

    /// Frames processed, by slot.
    pub const FRAMES_PROCESSED_TOTAL: &str = "anomrec_frames_processed_total";

    /// Per-frame motion level.
    pub const MOTION_LEVEL: &str = "anomrec_motion_level";

    /// Detector failures, by detector.
    pub const DETECTOR_ERRORS_TOTAL: &str = "anomrec_detector_errors_total";
}

// =============================================================================
// Recording Functions
// =============================================================================

pub fn record_recording_started(slot: u32) {
    counter!(names::RECORDINGS_STARTED_TOTAL, "slot" => slot.to_string()).increment(1);
}

pub fn record_recording_finished(slot: u32, status: &str, duration_secs: f64) {
    counter!(
        names::RECORDINGS_FINISHED_TOTAL,
        "slot" => slot.to_string(),
        "status" => status.to_string()
    )
    .increment(1);

    histogram!(names::RECORDING_DURATION_SECONDS, "slot" => slot.to_string())
        .record(duration_secs);
}

/// `stage` is `open` or `write`.
pub fn record_writer_failure(slot: u32, stage: &'static str) {
    counter!(
        names::WRITER_FAILURES_TOTAL,
        "slot" => slot.to_string(),
        "stage" => stage
    )
    .increment(1);
}

pub fn record_quota_eviction(bytes: u64) {
    counter!(names::QUOTA_EVICTIONS_TOTAL).increment(1);
    counter!(names::QUOTA_BYTES_FREED_TOTAL).increment(bytes);
}

pub fn record_storage_used(bytes: u64) {
    gauge!(names::STORAGE_USED_BYTES).set(bytes as f64);
}

/// `outcome` is `success` or `failure`.
pub fn record_reconnect_attempt(slot: u32, outcome: &'static str) {
    counter!(
        names::RECONNECT_ATTEMPTS_TOTAL,
        "slot" => slot.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

pub fn record_frame_processed(slot: u32) {
    counter!(names::FRAMES_PROCESSED_TOTAL, "slot" => slot.to_string()).increment(1);
}

pub fn record_motion_level(slot: u32, level: f64) {
    histogram!(names::MOTION_LEVEL, "slot" => slot.to_string()).record(level);
}

pub fn record_detector_error(detector: &'static str) {
    counter!(names::DETECTOR_ERRORS_TOTAL, "detector" => detector).increment(1);
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_names() {
        assert!(names::RECORDINGS_STARTED_TOTAL.starts_with("anomrec_"));
        assert!(names::QUOTA_BYTES_FREED_TOTAL.contains("bytes"));
        assert!(names::RECONNECT_ATTEMPTS_TOTAL.contains("reconnect"));
    }

    #[test]
    fn test_recording_without_recorder_is_noop() {
        // No global recorder installed: calls must not panic.
        record_recording_started(0);
        record_recording_finished(0, "completed", 5.3);
        record_quota_eviction(1024);
        record_motion_level(1, 0.2);
    }
}
