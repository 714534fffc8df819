use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::time::sleep;
use tracing::{error, info};

use crate::error::InvoiceError;
use crate::invoices::service;
use crate::AppState;

/// Periodic orphaned-PDF sweeper.
///
/// Runs one sweep per interval against the shared ledger and artifact
/// directory, taking the ledger lock for each pass.
pub struct SweepScheduler {
    state: AppState,

    /// Pause between sweeps
    interval: Duration,

    /// Whether the scheduler is running (wrapped in Arc for sharing)
    running: Arc<RwLock<bool>>,
}

impl SweepScheduler {
    /// Creates a new sweep scheduler.
    ///
    /// # Arguments
    ///
    /// * `state` - Application state holding ledger, lock and PDF store
    /// * `interval` - How long to wait between sweeps
    pub fn new(state: AppState, interval: Duration) -> Self {
        Self {
            state,
            interval,
            running: Arc::new(RwLock::new(false)),
        }
    }

    /// Runs sweeps until stopped.
    ///
    /// A failed sweep is logged and the loop carries on.
    pub async fn start(&self) {
        *self.running.write().await = true;
        info!("SweepScheduler started with interval: {:?}", self.interval);

        while *self.running.read().await {
            match self.run_once().await {
                Ok(removed) if !removed.is_empty() => {
                    info!("Sweep removed {} orphaned PDF(s)", removed.len());
                }
                Ok(_) => {}
                Err(e) => error!("Sweep failed: {}", e),
            }

            sleep(self.interval).await;
        }

        info!("SweepScheduler stopped");
    }

    /// Stops the loop after the current iteration.
    pub async fn stop(&self) {
        info!("Stopping SweepScheduler...");
        *self.running.write().await = false;
    }

    /// One sweep pass.
    pub async fn run_once(&self) -> Result<Vec<String>, InvoiceError> {
        service::sweep(&self.state).await
    }
}
