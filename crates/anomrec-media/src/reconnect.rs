//! Per-slot camera reconnect supervisor with exponential backoff.
//!
//! The supervisor only decides *when* to try; the caller performs the
//! reopen and reports back with [`ReconnectSupervisor::record_attempt`] and,
//! once frames flow again, [`ReconnectSupervisor::reset`].

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use anomrec_models::Settings;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::clock::Clock;
use crate::metrics;

/// Backoff parameters plus the attempt counter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconnectState {
    pub enabled: bool,
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Attempts since the last confirmed connection.
    pub attempt: u32,
    /// Clock reading of the last attempt, if any.
    pub last_attempt_time: Option<f64>,
}

impl Default for ReconnectState {
    fn default() -> Self {
        Self {
            enabled: true,
            max_attempts: 5,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            attempt: 0,
            last_attempt_time: None,
        }
    }
}

impl ReconnectState {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            enabled: settings.autoreconnect,
            max_attempts: settings.reconnect_max_attempts,
            base_delay: secs_or(settings.reconnect_base_delay_secs, Duration::from_secs(1)),
            max_delay: secs_or(settings.reconnect_max_delay_secs, Duration::from_secs(30)),
            ..Self::default()
        }
    }

    /// Wait required after the last attempt before the next one.
    ///
    /// Zero before the first attempt, then `base * 2^(attempt - 1)` capped
    /// at `max_delay`: 1s, 2s, 4s, 8s... for a one-second base.
    pub fn backoff_window(&self) -> Duration {
        if self.attempt == 0 {
            return Duration::ZERO;
        }
        let exponent = (self.attempt - 1).min(31);
        self.base_delay
            .saturating_mul(2u32.pow(exponent))
            .min(self.max_delay)
    }

    pub fn is_exhausted(&self) -> bool {
        self.attempt >= self.max_attempts
    }

    pub fn status(&self) -> ReconnectStatus {
        if !self.enabled {
            ReconnectStatus::Disabled
        } else if self.attempt == 0 {
            ReconnectStatus::Connected
        } else if self.is_exhausted() {
            ReconnectStatus::Exhausted {
                max: self.max_attempts,
            }
        } else {
            ReconnectStatus::Retrying {
                attempt: self.attempt,
                max: self.max_attempts,
            }
        }
    }
}

fn secs_or(secs: f64, fallback: Duration) -> Duration {
    Duration::try_from_secs_f64(secs).unwrap_or(fallback)
}

/// User-facing reconnect status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ReconnectStatus {
    Disabled,
    Connected,
    Retrying { attempt: u32, max: u32 },
    Exhausted { max: u32 },
}

impl ReconnectStatus {
    /// Terminal until [`ReconnectSupervisor::reset`].
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Exhausted { .. })
    }
}

impl fmt::Display for ReconnectStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disabled => write!(f, "Auto-reconnect: off"),
            Self::Connected => write!(f, "Connected"),
            Self::Retrying { attempt, max } => {
                write!(f, "Reconnecting... (attempt {attempt}/{max})")
            }
            Self::Exhausted { max } => write!(f, "Reconnect failed after {max} attempts"),
        }
    }
}

/// Decides when a lost camera slot may try to reopen.
pub struct ReconnectSupervisor {
    slot: u32,
    state: ReconnectState,
    clock: Arc<dyn Clock>,
}

impl ReconnectSupervisor {
    pub fn new(slot: u32, state: ReconnectState, clock: Arc<dyn Clock>) -> Self {
        Self { slot, state, clock }
    }

    pub fn slot(&self) -> u32 {
        self.slot
    }

    pub fn state(&self) -> &ReconnectState {
        &self.state
    }

    pub fn attempt(&self) -> u32 {
        self.state.attempt
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.state.enabled = enabled;
    }

    /// Enabled, not exhausted, and the backoff window since the last
    /// attempt has elapsed.
    pub fn should_attempt(&self) -> bool {
        if !self.state.enabled || self.state.is_exhausted() {
            return false;
        }
        match self.state.last_attempt_time {
            None => true,
            Some(last) => {
                let elapsed = self.clock.now() - last;
                elapsed >= self.state.backoff_window().as_secs_f64()
            }
        }
    }

    /// Count an attempt and stamp its time.
    pub fn record_attempt(&mut self) {
        self.state.attempt = self.state.attempt.saturating_add(1);
        self.state.last_attempt_time = Some(self.clock.now());
        info!(
            slot = self.slot,
            attempt = self.state.attempt,
            max_attempts = self.state.max_attempts,
            next_window_secs = self.state.backoff_window().as_secs_f64(),
            "Reconnect attempt"
        );
        if self.state.is_exhausted() {
            warn!(
                slot = self.slot,
                attempts = self.state.attempt,
                "Reconnect attempts exhausted"
            );
        }
    }

    /// Record the outcome of an attempt made after [`Self::should_attempt`].
    pub fn record_outcome(&mut self, success: bool) {
        metrics::record_reconnect_attempt(self.slot, if success { "success" } else { "failure" });
        if success {
            self.reset();
        }
    }

    /// Confirmed reconnection (or manual reset after exhaustion).
    pub fn reset(&mut self) {
        if self.state.attempt > 0 {
            info!(slot = self.slot, attempts = self.state.attempt, "Reconnect state reset");
        }
        self.state.attempt = 0;
        self.state.last_attempt_time = None;
    }

    pub fn status(&self) -> ReconnectStatus {
        self.state.status()
    }
}
