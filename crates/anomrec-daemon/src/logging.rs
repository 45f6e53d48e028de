//! Tracing setup and structured per-slot logging.

use anomrec_models::CameraSource;
use tracing::{error, info, warn, Span};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Install the global subscriber.
///
/// `LOG_FORMAT=json` switches to JSON lines; otherwise output is colored
/// text. `RUST_LOG` directives are honored on top of the defaults.
pub fn init_tracing() {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("anomrec=info,anomrec_media=info,anomrec_daemon=info,reqwest=warn")
    });

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }
}

/// Logger for one camera slot.
///
/// Every line carries the slot number and camera label so interleaved
/// output from two cameras stays readable.
#[derive(Debug, Clone)]
pub struct SlotLogger {
    slot: u32,
    camera: String,
}

impl SlotLogger {
    pub fn new(slot: u32, camera: &CameraSource) -> Self {
        Self {
            slot,
            camera: camera.label(),
        }
    }

    pub fn log_connected(&self, message: &str) {
        info!(slot = self.slot, camera = %self.camera, "Camera connected: {}", message);
    }

    pub fn log_lost(&self, message: &str) {
        warn!(slot = self.slot, camera = %self.camera, "Camera lost: {}", message);
    }

    pub fn log_warning(&self, message: &str) {
        warn!(slot = self.slot, camera = %self.camera, "Slot warning: {}", message);
    }

    pub fn log_error(&self, message: &str) {
        error!(slot = self.slot, camera = %self.camera, "Slot error: {}", message);
    }

    pub fn log_event(&self, message: &str) {
        info!(slot = self.slot, camera = %self.camera, "Event: {}", message);
    }

    pub fn slot(&self) -> u32 {
        self.slot
    }

    pub fn camera(&self) -> &str {
        &self.camera
    }

    /// Span for work done on behalf of this slot.
    pub fn create_span(&self) -> Span {
        tracing::info_span!("slot", slot = self.slot, camera = %self.camera)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_logger() {
        let logger = SlotLogger::new(1, &CameraSource::usb(0));
        assert_eq!(logger.slot(), 1);
        assert_eq!(logger.camera(), "usb-1");

        // No subscriber installed: logging must not panic.
        logger.log_connected("ok");
        logger.log_lost("gone");
        let _guard = logger.create_span().entered();
    }
}
