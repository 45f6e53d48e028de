//! Background camera discovery.
//!
//! Enumerating capture devices blocks, so it runs on the blocking pool and
//! reports back over a bounded channel. At most one refresh is in flight;
//! results are applied by the control loop when it polls.

use std::sync::Arc;

use anomrec_media::source::{probe_usb_cameras, MAX_USB_PROBE};
use anomrec_models::CameraSource;
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tracing::{debug, warn};

type Probe = Arc<dyn Fn() -> Vec<CameraSource> + Send + Sync>;

/// Cameras found by one refresh.
#[derive(Debug, Clone, PartialEq)]
pub struct DiscoveryResult {
    pub cameras: Vec<CameraSource>,
    pub finished_at: DateTime<Utc>,
}

pub struct DiscoveryWorker {
    probe: Probe,
    tx: mpsc::Sender<DiscoveryResult>,
    rx: mpsc::Receiver<DiscoveryResult>,
    in_flight: bool,
}

impl DiscoveryWorker {
    /// Worker probing `/dev/video*`.
    pub fn usb() -> Self {
        Self::with_probe(|| probe_usb_cameras(MAX_USB_PROBE))
    }

    pub fn with_probe<F>(probe: F) -> Self
    where
        F: Fn() -> Vec<CameraSource> + Send + Sync + 'static,
    {
        let (tx, rx) = mpsc::channel(1);
        Self {
            probe: Arc::new(probe),
            tx,
            rx,
            in_flight: false,
        }
    }

    pub fn in_flight(&self) -> bool {
        self.in_flight
    }

    /// Start a refresh unless one is already running. Must be called from
    /// within a tokio runtime.
    pub fn request_refresh(&mut self) -> bool {
        if self.in_flight {
            debug!("Camera discovery already running");
            return false;
        }
        self.in_flight = true;

        let probe = Arc::clone(&self.probe);
        let tx = self.tx.clone();
        tokio::task::spawn_blocking(move || {
            let result = DiscoveryResult {
                cameras: probe(),
                finished_at: Utc::now(),
            };
            if tx.blocking_send(result).is_err() {
                warn!("Discovery result dropped, receiver gone");
            }
        });
        true
    }

    /// Take a finished result, if any, without waiting.
    pub fn try_collect(&mut self) -> Option<DiscoveryResult> {
        match self.rx.try_recv() {
            Ok(result) => {
                self.in_flight = false;
                debug!(found = result.cameras.len(), "Camera discovery finished");
                Some(result)
            }
            Err(_) => None,
        }
    }

    /// Wait for the running refresh to finish.
    pub async fn collect(&mut self) -> Option<DiscoveryResult> {
        if !self.in_flight {
            return None;
        }
        let result = self.rx.recv().await;
        self.in_flight = false;
        result
    }
}
