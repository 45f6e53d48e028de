//! Camera frame sources.
//!
//! Every camera, USB or network, is driven through [`FrameSource`]:
//! `open`, then `read` once per tick, then `release`. A read error means the
//! camera is gone; the caller releases it and hands the slot to the
//! reconnect supervisor.

pub mod ffmpeg;
pub mod http;
pub mod mjpeg;
pub mod scripted;
#[cfg(feature = "v4l")]
pub mod usb;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anomrec_models::{CameraSource, Credentials};
use async_trait::async_trait;
use tracing::debug;
use url::Url;

use crate::clock::Clock;
use crate::error::{MediaError, MediaResult};
use crate::frame::Frame;

pub use ffmpeg::{url_with_credentials, FfmpegCommand, PipedJpegSource};
pub use http::HttpCameraSource;
pub use scripted::{ScriptStep, ScriptedSource, SourceStats};
#[cfg(feature = "v4l")]
pub use usb::V4lSource;

/// Highest `/dev/videoN` index probed during discovery.
pub const MAX_USB_PROBE: u32 = 10;

/// A camera that yields frames.
#[async_trait]
pub trait FrameSource: Send {
    /// Short human label for logs.
    fn label(&self) -> String;

    fn is_open(&self) -> bool;

    /// Connect to the camera. Opening an open source is a no-op.
    async fn open(&mut self) -> MediaResult<()>;

    /// Grab the next frame.
    async fn read(&mut self) -> MediaResult<Frame>;

    /// Drop the connection. Safe to call on a closed source.
    async fn release(&mut self);
}

/// Builds the frame source for a configured camera.
pub trait SourceFactory: Send + Sync {
    fn create(&self, slot: u32, camera: &CameraSource) -> MediaResult<Box<dyn FrameSource>>;
}

/// Factory for real cameras.
///
/// `http(s)://` cameras are read as MJPEG streams or snapshots, `rtsp://`
/// cameras through ffmpeg, and with the `v4l` feature USB cameras through
/// Video4Linux.
pub struct DefaultSourceFactory {
    clock: Arc<dyn Clock>,
    http_timeout: Duration,
    rtsp_timeout: Duration,
    target_fps: Option<u32>,
}

impl DefaultSourceFactory {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            http_timeout: Duration::from_secs(5),
            rtsp_timeout: Duration::from_secs(10),
            target_fps: None,
        }
    }

    pub fn with_http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = timeout;
        self
    }

    pub fn with_rtsp_timeout(mut self, timeout: Duration) -> Self {
        self.rtsp_timeout = timeout;
        self
    }

    /// Ask ffmpeg for no more than `fps` frames per second.
    pub fn with_target_fps(mut self, fps: u32) -> Self {
        self.target_fps = Some(fps);
        self
    }

    fn network(
        &self,
        url: &str,
        credentials: Option<&Credentials>,
    ) -> MediaResult<Box<dyn FrameSource>> {
        let scheme = url.split_once("://").map(|(scheme, _)| scheme.to_ascii_lowercase());
        match scheme.as_deref() {
            Some("http" | "https") => Ok(Box::new(
                HttpCameraSource::new(url, self.clock.clone())
                    .with_credentials(credentials.cloned())
                    .with_timeout(self.http_timeout),
            )),
            Some("rtsp") => {
                let mut command = FfmpegCommand::rtsp(url_with_credentials(url, credentials)?);
                if let Some(fps) = self.target_fps {
                    command = command.frame_rate(fps);
                }
                Ok(Box::new(
                    PipedJpegSource::ffmpeg(host_label(url), &command, self.clock.clone())
                        .with_timeout(self.rtsp_timeout),
                ))
            }
            _ => Err(MediaError::UnsupportedSource(format!(
                "{url}: expected an http, https or rtsp url"
            ))),
        }
    }
}

fn host_label(url: &str) -> String {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_else(|| "network".to_string())
}

impl SourceFactory for DefaultSourceFactory {
    fn create(&self, slot: u32, camera: &CameraSource) -> MediaResult<Box<dyn FrameSource>> {
        debug!(slot, camera = %camera, "Creating frame source");
        match camera {
            CameraSource::Network { url, credentials } => self.network(url, credentials.as_ref()),
            CameraSource::Usb { index } => self.usb(*index),
        }
    }
}

impl DefaultSourceFactory {
    #[cfg(feature = "v4l")]
    fn usb(&self, index: u32) -> MediaResult<Box<dyn FrameSource>> {
        Ok(Box::new(V4lSource::new(index, self.clock.clone())))
    }

    #[cfg(not(feature = "v4l"))]
    fn usb(&self, index: u32) -> MediaResult<Box<dyn FrameSource>> {
        Err(MediaError::UnsupportedSource(format!(
            "usb:{index}: built without the v4l feature"
        )))
    }
}

/// USB cameras visible as `/dev/video0` .. `/dev/video{max-1}`.
///
/// Blocking filesystem probe; run it off the control thread.
pub fn probe_usb_cameras(max: u32) -> Vec<CameraSource> {
    probe_usb_cameras_in(Path::new("/dev"), max)
}

fn probe_usb_cameras_in(dev_dir: &Path, max: u32) -> Vec<CameraSource> {
    (0..max)
        .filter(|index| dev_dir.join(format!("video{index}")).exists())
        .map(CameraSource::usb)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    #[test]
    fn test_factory_network_source() {
        let factory = DefaultSourceFactory::new(Arc::new(ManualClock::new(0.0)));
        let camera = CameraSource::network("http://admin:pw@cam.local/snapshot.jpg").unwrap();
        let source = factory.create(0, &camera).unwrap();
        assert_eq!(source.label(), "cam.local");
        assert!(!source.is_open());
    }

    #[test]
    fn test_factory_rtsp_source_hides_credentials() {
        let factory = DefaultSourceFactory::new(Arc::new(ManualClock::new(0.0))).with_target_fps(15);
        let camera = CameraSource::network("rtsp://admin:pw@cam.local:554/stream1").unwrap();
        let source = factory.create(1, &camera).unwrap();
        assert_eq!(source.label(), "cam.local");
        assert!(!source.is_open());
    }

    #[test]
    fn test_factory_rejects_unknown_scheme() {
        let factory = DefaultSourceFactory::new(Arc::new(ManualClock::new(0.0)));
        assert!(matches!(
            factory.network("ftp://cam.local/stream", None),
            Err(MediaError::UnsupportedSource(_))
        ));
    }

    #[cfg(not(feature = "v4l"))]
    #[test]
    fn test_factory_usb_needs_feature() {
        let factory = DefaultSourceFactory::new(Arc::new(ManualClock::new(0.0)));
        assert!(factory.create(0, &CameraSource::usb(0)).is_err());
    }

    #[test]
    fn test_probe_usb_cameras() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("video0"), b"").unwrap();
        std::fs::write(dir.path().join("video2"), b"").unwrap();
        assert_eq!(
            probe_usb_cameras_in(dir.path(), 4),
            vec![CameraSource::usb(0), CameraSource::usb(2)]
        );
    }
}
