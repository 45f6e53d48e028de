//! Daemon error types.

use thiserror::Error;

pub type DaemonResult<T> = Result<T, DaemonError>;

#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid settings: {0}")]
    InvalidSettings(#[from] validator::ValidationErrors),

    #[error("Unknown camera slot: {0}")]
    UnknownSlot(u32),

    #[error("No frame available on slot {0}")]
    NoFrame(u32),

    #[error("Metrics exporter failed: {0}")]
    Metrics(String),

    #[error("Media error: {0}")]
    Media(#[from] anomrec_media::MediaError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl DaemonError {
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn metrics(msg: impl Into<String>) -> Self {
        Self::Metrics(msg.into())
    }
}
