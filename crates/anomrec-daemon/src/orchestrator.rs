//! Per-tick control loop over every camera slot.
//!
//! Each tick, for every slot: reconnect if the source is down, read a frame,
//! run detection, annotate persons, update the recorder and keep the zoomed
//! preview. Finished recordings trigger a storage quota pass. Camera
//! discovery runs on the blocking pool and is applied between ticks.

use std::borrow::Cow;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anomrec_media::{
    annotate_detections, apply_zoom, clear_recordings, metrics, save_snapshot, Clock,
    DetectionPipeline, Frame, FrameSource, PipelineBuilder, ReconnectState, ReconnectStatus,
    ReconnectSupervisor, RecorderConfig, RecorderUpdate, RollingRecorder, SourceFactory,
    StorageQuotaEnforcer, StorageUsage, WriterFactory,
};
use anomrec_models::{CameraSource, RecordingEvent, RecordingState, ZoomState};
use serde::Serialize;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn, Instrument};

use crate::config::DaemonConfig;
use crate::discovery::{DiscoveryResult, DiscoveryWorker};
use crate::error::{DaemonError, DaemonResult};
use crate::event_log::EventLog;
use crate::logging::SlotLogger;

/// Point-in-time view of one slot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SlotStatus {
    pub slot: u32,
    pub camera: String,
    pub connected: bool,
    pub recording: RecordingState,
    pub reconnect: ReconnectStatus,
    pub zoom: f64,
}

/// What one [`Orchestrator::tick`] did. Event fields hold log numbers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickReport {
    pub frames: u32,
    pub started: Vec<u32>,
    pub finished: Vec<u32>,
    pub lost: Vec<u32>,
}

enum SlotStep {
    /// Source down and no reconnect attempted or it failed
    Idle,
    /// Read failed; carries the recording it interrupted
    Lost(Option<RecordingEvent>),
    Processed(RecorderUpdate),
}

struct SlotRuntime {
    slot: u32,
    camera: CameraSource,
    source: Box<dyn FrameSource>,
    pipeline: DetectionPipeline,
    recorder: RollingRecorder,
    reconnect: ReconnectSupervisor,
    zoom: ZoomState,
    preview: Option<Frame>,
    logger: SlotLogger,
}

impl SlotRuntime {
    async fn connect(&mut self) {
        match self.source.open().await {
            Ok(()) => self.logger.log_connected(&self.source.label()),
            Err(e) => self.logger.log_warning(&format!("initial open failed: {e}")),
        }
    }

    async fn try_reconnect(&mut self) -> bool {
        if !self.reconnect.should_attempt() {
            return false;
        }
        self.reconnect.record_attempt();

        match self.source.open().await {
            Ok(()) => {
                self.reconnect.record_outcome(true);
                self.pipeline.reset();
                self.logger.log_connected("reconnected");
                true
            }
            Err(e) => {
                self.reconnect.record_outcome(false);
                let status = self.reconnect.status();
                if status.is_terminal() {
                    self.logger.log_error(&status.to_string());
                } else {
                    self.logger.log_warning(&format!("{status}: {e}"));
                }
                false
            }
        }
    }

    async fn step(&mut self) -> SlotStep {
        if !self.source.is_open() && !self.try_reconnect().await {
            return SlotStep::Idle;
        }

        let mut frame = match self.source.read().await {
            Ok(frame) => frame,
            Err(e) => {
                self.logger.log_lost(&e.to_string());
                self.source.release().await;
                self.pipeline.reset();
                return SlotStep::Lost(self.recorder.stop());
            }
        };
        metrics::record_frame_processed(self.slot);

        let analysis = self.pipeline.analyze(&frame);
        if !analysis.persons.is_empty() {
            annotate_detections(&mut frame.image, &analysis.persons);
        }

        let update = match self
            .recorder
            .update(&frame, analysis.trigger, analysis.person_count())
        {
            Ok(update) => update,
            Err(e) => {
                self.logger.log_error(&format!("recording not started: {e}"));
                RecorderUpdate::default()
            }
        };

        let view = apply_zoom(&frame.image, &self.zoom).map(Cow::into_owned);
        self.preview = Some(match view {
            Ok(image) => Frame::new(image, frame.timestamp, frame.captured_at),
            Err(e) => {
                self.logger.log_warning(&format!("zoom failed: {e}"));
                frame
            }
        });
        SlotStep::Processed(update)
    }

    fn status(&self) -> SlotStatus {
        SlotStatus {
            slot: self.slot,
            camera: self.logger.camera().to_string(),
            connected: self.source.is_open(),
            recording: self.recorder.state(),
            reconnect: self.reconnect.status(),
            zoom: self.zoom.factor,
        }
    }
}

/// Drives all camera slots from a single control task.
pub struct Orchestrator {
    config: DaemonConfig,
    slots: Vec<SlotRuntime>,
    events: EventLog,
    quota: StorageQuotaEnforcer,
    discovery: Option<DiscoveryWorker>,
    available: Vec<CameraSource>,
}

impl Orchestrator {
    /// Build one slot per configured camera. Sources are not opened until
    /// [`Orchestrator::start`].
    pub fn new(
        config: DaemonConfig,
        sources: &dyn SourceFactory,
        writers: Arc<dyn WriterFactory>,
        clock: Arc<dyn Clock>,
    ) -> DaemonResult<Self> {
        config.validate()?;
        std::fs::create_dir_all(&config.recordings_dir)?;

        let detection = PipelineBuilder::from_settings(&config.settings)
            .load_person_model(config.person_model.as_deref())?;

        let mut slots = Vec::with_capacity(config.slot_count());
        for (index, camera) in config.settings.cameras.iter().enumerate() {
            let slot = index as u32;
            let recorder = RollingRecorder::new(
                RecorderConfig::from_settings(slot, &config.recordings_dir, &config.settings),
                Arc::clone(&writers),
            )?;
            slots.push(SlotRuntime {
                slot,
                camera: camera.clone(),
                source: sources.create(slot, camera)?,
                pipeline: detection.build(slot),
                recorder,
                reconnect: ReconnectSupervisor::new(
                    slot,
                    ReconnectState::from_settings(&config.settings),
                    Arc::clone(&clock),
                ),
                zoom: ZoomState::default(),
                preview: None,
                logger: SlotLogger::new(slot, camera),
            });
        }

        let quota = StorageQuotaEnforcer::from_settings(&config.recordings_dir, &config.settings);
        Ok(Self {
            config,
            slots,
            events: EventLog::new(),
            quota,
            discovery: None,
            available: Vec::new(),
        })
    }

    pub fn with_discovery(mut self, worker: DiscoveryWorker) -> Self {
        self.discovery = Some(worker);
        self
    }

    /// Import existing recordings, enforce the quota once and open every
    /// source. A source that fails to open is left to the reconnect logic.
    pub async fn start(&mut self) -> DaemonResult<()> {
        self.events.load_existing(&self.config.recordings_dir)?;
        self.enforce_quota();

        for slot in self.slots.iter_mut() {
            let span = slot.logger.create_span();
            slot.connect().instrument(span).await;
        }
        if let Some(discovery) = self.discovery.as_mut() {
            discovery.request_refresh();
        }

        info!(
            slots = self.slots.len(),
            dir = %self.config.recordings_dir.display(),
            events = self.events.len(),
            "Orchestrator started"
        );
        Ok(())
    }

    /// Process one frame per slot.
    pub async fn tick(&mut self) -> TickReport {
        if let Some(result) = self.discovery.as_mut().and_then(|d| d.try_collect()) {
            self.apply_discovery(result);
        }

        let mut report = TickReport::default();
        for slot in self.slots.iter_mut() {
            match slot.step().await {
                SlotStep::Idle => {}
                SlotStep::Lost(stopped) => {
                    report.lost.push(slot.slot);
                    if let Some(event) = stopped {
                        report.finished.push(self.events.record_finished(event));
                    }
                }
                SlotStep::Processed(update) => {
                    report.frames += 1;
                    if let Some(event) = update.new_event {
                        let number = self.events.record_started(event);
                        slot.logger.log_event(&format!("#{number} started"));
                        report.started.push(number);
                    }
                    if let Some(event) = update.finished_event {
                        let number = self.events.record_finished(event);
                        if let Some(entry) = self.events.get(number) {
                            slot.logger.log_event(&entry.to_string());
                        }
                        report.finished.push(number);
                    }
                }
            }
        }

        if !report.finished.is_empty() {
            self.enforce_quota();
        }
        report
    }

    /// Run until `shutdown` resolves, then stop every slot.
    pub async fn run<F>(mut self, shutdown: F) -> DaemonResult<()>
    where
        F: Future<Output = ()>,
    {
        self.start().await?;

        let mut ticker = interval(self.config.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut discovery_ticker = interval(self.config.discovery_interval);
        discovery_ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // start() already requested the first refresh
        discovery_ticker.tick().await;

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown requested");
                    break;
                }
                _ = ticker.tick() => {
                    let report = self.tick().await;
                    if !report.lost.is_empty() {
                        debug!(lost = ?report.lost, "Slots lost this tick");
                    }
                }
                _ = discovery_ticker.tick() => {
                    if let Some(discovery) = self.discovery.as_mut() {
                        discovery.request_refresh();
                    }
                    self.log_status();
                }
            }
        }

        self.shutdown().await;
        Ok(())
    }

    /// Stop every recording and release every source.
    pub async fn shutdown(&mut self) {
        for slot in self.slots.iter_mut() {
            if let Some(event) = slot.recorder.stop() {
                self.events.record_finished(event);
            }
            slot.source.release().await;
        }
        info!(events = self.events.len(), "Orchestrator stopped");
    }

    /// Record the cameras found by a discovery pass. A slot whose reconnect
    /// attempts are exhausted gets a fresh budget when its camera shows up.
    pub fn apply_discovery(&mut self, result: DiscoveryResult) {
        if result.cameras != self.available {
            let labels: Vec<String> = result.cameras.iter().map(CameraSource::label).collect();
            info!(cameras = ?labels, "Available cameras changed");
        }

        for slot in self.slots.iter_mut() {
            if slot.reconnect.status().is_terminal() && result.cameras.contains(&slot.camera) {
                slot.logger.log_warning("camera visible again, resetting reconnect");
                slot.reconnect.reset();
            }
        }
        self.available = result.cameras;
    }

    fn log_status(&self) {
        let usage = match self.quota.usage() {
            Ok(usage) => usage.to_string(),
            Err(e) => format!("unavailable ({e})"),
        };
        match serde_json::to_string(&self.statuses()) {
            Ok(slots) => info!(storage = %usage, slots = %slots, "Status"),
            Err(e) => warn!(error = %e, "Failed to serialize slot status"),
        }
    }

    fn active_paths(&self) -> Vec<PathBuf> {
        self.slots
            .iter()
            .filter_map(|s| s.recorder.current_event().map(|e| e.path.clone()))
            .collect()
    }

    fn enforce_quota(&self) {
        match self.quota.enforce(&self.active_paths()) {
            Ok(report) if report.evicted() > 0 => info!(
                deleted = report.evicted(),
                bytes_freed = report.bytes_freed,
                used_after = report.used_after,
                "Storage quota enforced"
            ),
            Ok(_) => {}
            Err(e) => warn!(error = %e, "Storage quota pass failed"),
        }
    }

    /// Save the latest preview frame of `slot` as a PNG.
    pub fn snapshot(&self, slot: u32) -> DaemonResult<PathBuf> {
        let runtime = self.slot(slot)?;
        let frame = runtime.preview.as_ref().ok_or(DaemonError::NoFrame(slot))?;
        Ok(save_snapshot(&self.config.recordings_dir, slot, frame)?)
    }

    /// Latest zoomed preview of `slot`.
    pub fn preview(&self, slot: u32) -> DaemonResult<Option<&Frame>> {
        Ok(self.slot(slot)?.preview.as_ref())
    }

    pub fn zoom_mut(&mut self, slot: u32) -> DaemonResult<&mut ZoomState> {
        self.slots
            .get_mut(slot as usize)
            .map(|s| &mut s.zoom)
            .ok_or(DaemonError::UnknownSlot(slot))
    }

    /// Change the motion threshold of every slot.
    pub fn set_motion_threshold(&mut self, threshold: f64) {
        for slot in self.slots.iter_mut() {
            slot.pipeline.set_threshold(threshold);
        }
        self.config.settings.motion_threshold = threshold;
    }

    /// Turn automatic reconnection on or off for every slot.
    pub fn set_autoreconnect(&mut self, enabled: bool) {
        for slot in self.slots.iter_mut() {
            slot.reconnect.set_enabled(enabled);
        }
        self.config.settings.autoreconnect = enabled;
    }

    /// Delete every finished recording and drop them from the event log.
    pub fn clear_recordings(&mut self) -> DaemonResult<usize> {
        let removed = clear_recordings(&self.config.recordings_dir, &self.active_paths())?;
        self.events.clear_finished();
        info!(removed, "Recordings cleared");
        Ok(removed)
    }

    pub fn storage_usage(&self) -> DaemonResult<StorageUsage> {
        Ok(self.quota.usage()?)
    }

    pub fn statuses(&self) -> Vec<SlotStatus> {
        self.slots.iter().map(SlotRuntime::status).collect()
    }

    pub fn events(&self) -> &EventLog {
        &self.events
    }

    pub fn events_mut(&mut self) -> &mut EventLog {
        &mut self.events
    }

    pub fn available_cameras(&self) -> &[CameraSource] {
        &self.available
    }

    pub fn recordings_dir(&self) -> &Path {
        &self.config.recordings_dir
    }

    fn slot(&self, slot: u32) -> DaemonResult<&SlotRuntime> {
        self.slots
            .get(slot as usize)
            .ok_or(DaemonError::UnknownSlot(slot))
    }
}
