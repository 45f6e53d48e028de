//! anomrec daemon binary.

use std::sync::Arc;

use anyhow::Context;
use tracing::{error, info};

use anomrec_daemon::{init_metrics, init_tracing, DaemonConfig, DiscoveryWorker, Orchestrator};
use anomrec_media::{Clock, DefaultSourceFactory, MjpegWriterFactory, MonotonicClock, WriterFactory};

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    info!("Starting anomrec");

    let config = DaemonConfig::from_env().context("Failed to load configuration")?;
    info!("Daemon config: {:?}", config);

    if let Some(addr) = config.metrics_addr {
        init_metrics(addr)?;
    }

    let clock: Arc<dyn Clock> = Arc::new(MonotonicClock::new());
    let sources =
        DefaultSourceFactory::new(Arc::clone(&clock)).with_target_fps(config.settings.target_fps);
    let writers: Arc<dyn WriterFactory> =
        Arc::new(MjpegWriterFactory::new(config.settings.jpeg_quality));

    let orchestrator = match Orchestrator::new(config, &sources, writers, clock) {
        Ok(o) => o.with_discovery(DiscoveryWorker::usb()),
        Err(e) => {
            error!("Failed to set up cameras: {}", e);
            return Err(e.into());
        }
    };

    let shutdown = async {
        tokio::signal::ctrl_c().await.ok();
        info!("Received shutdown signal");
    };

    orchestrator.run(shutdown).await?;
    info!("anomrec shut down");
    Ok(())
}
