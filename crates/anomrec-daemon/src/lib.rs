//! Headless recording daemon.
//!
//! Wires camera sources, detection and the rolling recorders of
//! `anomrec-media` into a single control loop configured from the
//! environment.

pub mod config;
pub mod discovery;
pub mod error;
pub mod event_log;
pub mod exporter;
pub mod logging;
pub mod orchestrator;

pub use config::{parse_cameras, DaemonConfig};
pub use discovery::{DiscoveryResult, DiscoveryWorker};
pub use error::{DaemonError, DaemonResult};
pub use event_log::{EventEntry, EventLog};
pub use exporter::init_metrics;
pub use logging::{init_tracing, SlotLogger};
pub use orchestrator::{Orchestrator, SlotStatus, TickReport};
