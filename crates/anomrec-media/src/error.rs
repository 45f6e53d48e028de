//! Error types for media operations.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for media operations.
pub type MediaResult<T> = Result<T, MediaError>;

/// Errors that can occur while capturing, analysing or recording frames.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    #[error("Invalid zoom parameters: {0}")]
    InvalidZoom(String),

    #[error("Failed to open writer for {path}: {message}")]
    WriterOpenFailed { path: PathBuf, message: String },

    #[error("Write to {path} failed: {message}")]
    WriteFailed { path: PathBuf, message: String },

    #[error("Writer is closed")]
    WriterClosed,

    #[error("Invalid media file: {0}")]
    InvalidMedia(String),

    #[error("Failed to encode frame: {0}")]
    EncodeFailed(String),

    #[error("Camera {source_label} unavailable: {message}")]
    SourceUnavailable {
        source_label: String,
        message: String,
    },

    #[error("{0} not found on PATH")]
    ProgramNotFound(String),

    #[error("Unsupported camera source: {0}")]
    UnsupportedSource(String),

    #[error("Detection failed: {0}")]
    DetectionFailed(String),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl MediaError {
    /// Create an invalid frame error.
    pub fn invalid_frame(message: impl Into<String>) -> Self {
        Self::InvalidFrame(message.into())
    }

    /// Create an invalid zoom error.
    pub fn invalid_zoom(message: impl Into<String>) -> Self {
        Self::InvalidZoom(message.into())
    }

    /// Create a writer open failure error.
    pub fn writer_open_failed(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::WriterOpenFailed {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a mid-recording write failure error.
    pub fn write_failed(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::WriteFailed {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a source unavailable error.
    pub fn source_unavailable(source_label: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SourceUnavailable {
            source_label: source_label.into(),
            message: message.into(),
        }
    }

    /// Create a detection failure error.
    pub fn detection_failed(message: impl Into<String>) -> Self {
        Self::DetectionFailed(message.into())
    }

    /// Create a model not found error.
    pub fn model_not_found(path: impl Into<String>) -> Self {
        Self::ModelNotFound(path.into())
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Whether the error means the camera went away and a reconnect is due.
    pub fn is_source_lost(&self) -> bool {
        matches!(self, Self::SourceUnavailable { .. } | Self::Http(_))
    }
}
