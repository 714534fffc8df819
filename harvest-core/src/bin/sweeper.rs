use std::sync::Arc;

use dotenv::dotenv;
use harvest_core::config::AppConfig;
use harvest_core::render::{PdfRenderer, RenderPipeline};
use harvest_core::worker::SweepScheduler;
use harvest_core::AppState;
use tokio::signal;
use tracing::{info, level_filters::LevelFilter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Background sweeper for orphaned invoice PDFs.
///
/// Shares the ledger, lock file and PDF directory with the server, so it
/// can run as a separate process next to it.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenv().ok();

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"))
        .add_directive(LevelFilter::INFO.into());

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(filter)
        .init();

    info!("Starting Golden Harvest PDF sweeper...");

    let config = AppConfig::from_env()?;
    let interval = config.sweep_interval;
    info!(
        "Sweeping {:?} every {:?}, orphans older than {:?}",
        config.pdf_dir, interval, config.orphan_min_age
    );

    // Sweeping never renders, but the state carries a renderer
    let scratch_dir = std::env::temp_dir().join("harvest-render");
    let renderer: Arc<dyn PdfRenderer> =
        Arc::new(RenderPipeline::from_settings(&config.render, &scratch_dir));

    let scheduler = Arc::new(SweepScheduler::new(AppState::new(config, renderer), interval));

    let runner = scheduler.clone();
    let scheduler_handle = tokio::spawn(async move { runner.start().await });

    tokio::select! {
        _ = signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down gracefully...");
            scheduler.stop().await;
        }
        _ = scheduler_handle => {
            info!("Scheduler task completed");
        }
    }

    info!("Golden Harvest PDF sweeper stopped");
    Ok(())
}
