//! Daemon configuration.
//!
//! Everything comes from `ANOMREC_*` environment variables (a `.env` file is
//! loaded first by `main`). Unset variables fall back to the defaults of
//! [`Settings`]; malformed values are rejected rather than silently ignored.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anomrec_models::{CameraSource, Settings};
use validator::Validate;

use crate::error::{DaemonError, DaemonResult};

/// Daemon configuration.
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    /// Directory recordings and snapshots are written to
    pub recordings_dir: PathBuf,
    /// Engine settings shared by every slot
    pub settings: Settings,
    /// Linear HOG model (JSON); person detection is off without one
    pub person_model: Option<PathBuf>,
    /// Processing tick
    pub tick_interval: Duration,
    /// How often USB cameras are re-enumerated
    pub discovery_interval: Duration,
    /// Prometheus listener, disabled when unset
    pub metrics_addr: Option<SocketAddr>,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            recordings_dir: PathBuf::from("recordings"),
            settings: Settings::default(),
            person_model: None,
            tick_interval: Duration::from_millis(33),
            discovery_interval: Duration::from_secs(60),
            metrics_addr: None,
        }
    }
}

impl DaemonConfig {
    /// Create config from environment variables.
    pub fn from_env() -> DaemonResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create config from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> DaemonResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let base = Settings::default();
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let cameras = match get("ANOMREC_CAMERAS") {
            Some(list) => parse_cameras(&list)?,
            None => base.cameras.clone(),
        };

        let settings = Settings {
            cameras,
            motion_threshold: parse_or(&get, "ANOMREC_MOTION_THRESHOLD", base.motion_threshold)?,
            pre_seconds: parse_or(&get, "ANOMREC_PRE_SECONDS", base.pre_seconds)?,
            post_seconds: parse_or(&get, "ANOMREC_POST_SECONDS", base.post_seconds)?,
            target_fps: parse_or(&get, "ANOMREC_TARGET_FPS", base.target_fps)?,
            storage_limit_gb: parse_or(&get, "ANOMREC_STORAGE_LIMIT_GB", base.storage_limit_gb)?,
            enable_motion: bool_or(&get, "ANOMREC_ENABLE_MOTION", base.enable_motion)?,
            enable_person: bool_or(&get, "ANOMREC_ENABLE_PERSON", base.enable_person)?,
            person_triggers_recording: bool_or(
                &get,
                "ANOMREC_PERSON_TRIGGERS",
                base.person_triggers_recording,
            )?,
            autoreconnect: bool_or(&get, "ANOMREC_AUTORECONNECT", base.autoreconnect)?,
            reconnect_max_attempts: parse_or(
                &get,
                "ANOMREC_RECONNECT_MAX_ATTEMPTS",
                base.reconnect_max_attempts,
            )?,
            reconnect_base_delay_secs: parse_or(
                &get,
                "ANOMREC_RECONNECT_BASE_DELAY_SECS",
                base.reconnect_base_delay_secs,
            )?,
            reconnect_max_delay_secs: parse_or(
                &get,
                "ANOMREC_RECONNECT_MAX_DELAY_SECS",
                base.reconnect_max_delay_secs,
            )?,
            jpeg_quality: parse_or(&get, "ANOMREC_JPEG_QUALITY", base.jpeg_quality)?,
        };

        let tick_ms: u64 = parse_or(&get, "ANOMREC_TICK_MS", defaults.tick_interval.as_millis() as u64)?;
        if tick_ms == 0 {
            return Err(DaemonError::config_error("ANOMREC_TICK_MS must be positive"));
        }
        let discovery_secs: u64 = parse_or(
            &get,
            "ANOMREC_DISCOVERY_INTERVAL_SECS",
            defaults.discovery_interval.as_secs(),
        )?;

        let config = Self {
            recordings_dir: get("ANOMREC_RECORDINGS_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.recordings_dir),
            settings,
            person_model: get("ANOMREC_PERSON_MODEL").map(PathBuf::from),
            tick_interval: Duration::from_millis(tick_ms),
            discovery_interval: Duration::from_secs(discovery_secs.max(1)),
            metrics_addr: get("ANOMREC_METRICS_ADDR")
                .map(|addr| {
                    addr.parse().map_err(|e| {
                        DaemonError::config_error(format!("ANOMREC_METRICS_ADDR={addr}: {e}"))
                    })
                })
                .transpose()?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate the engine settings.
    pub fn validate(&self) -> DaemonResult<()> {
        self.settings.validate()?;
        Ok(())
    }

    pub fn slot_count(&self) -> usize {
        self.settings.cameras.len()
    }
}

/// Parse a comma-separated camera list such as `usb:0,http://cam/snap.jpg`.
pub fn parse_cameras(list: &str) -> DaemonResult<Vec<CameraSource>> {
    list.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            entry
                .parse::<CameraSource>()
                .map_err(|e| DaemonError::config_error(format!("ANOMREC_CAMERAS entry '{entry}': {e}")))
        })
        .collect()
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> DaemonResult<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw
            .parse()
            .map_err(|e| DaemonError::config_error(format!("{key}={raw}: {e}"))),
        None => Ok(default),
    }
}

fn bool_or<G>(get: &G, key: &str, default: bool) -> DaemonResult<bool>
where
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => match raw.to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(DaemonError::config_error(format!("{key}={raw}: expected a boolean"))),
        },
        None => Ok(default),
    }
}
