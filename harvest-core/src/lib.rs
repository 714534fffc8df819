pub mod billing;
pub mod config;
pub mod error;
pub mod invoices;
pub mod ledger;
pub mod models;
pub mod products;
pub mod render;
pub mod worker;

use std::sync::Arc;

use crate::billing::numbering::Reservations;
use crate::config::AppConfig;
use crate::ledger::{LedgerLock, LedgerStore};
use crate::render::{PdfRenderer, PdfStore};

/// Application state containing shared resources.
///
/// This struct holds the ledger, its lock, the PDF artifact directory and
/// the renderer, and is cloned into every route handler.
#[derive(Clone)]
pub struct AppState {
    /// Loaded configuration
    pub config: Arc<AppConfig>,

    /// Ledger file of record
    pub ledger: LedgerStore,

    /// Serializes every ledger mutation
    pub lock: LedgerLock,

    /// Rendered invoice PDFs
    pub pdfs: PdfStore,

    /// Invoice document in, PDF bytes out
    pub renderer: Arc<dyn PdfRenderer>,

    /// Allocated-but-uncommitted invoice numbers
    pub reservations: Reservations,
}

impl AppState {
    /// Builds the state from configuration with the given renderer.
    pub fn new(config: AppConfig, renderer: Arc<dyn PdfRenderer>) -> Self {
        let ledger = LedgerStore::new(&config.ledger_path);
        let lock = LedgerLock::new(&config.lock_path, config.lock.clone());
        let pdfs = PdfStore::new(&config.pdf_dir);
        let reservations = Reservations::new(config.reservation_ttl);

        Self {
            config: Arc::new(config),
            ledger,
            lock,
            pdfs,
            renderer,
            reservations,
        }
    }
}
