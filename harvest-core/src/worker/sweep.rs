use std::collections::HashSet;
use std::time::{Duration, SystemTime};

use tracing::{debug, info, warn};

use crate::error::InvoiceError;
use crate::ledger::{LedgerGuard, LedgerStore};
use crate::render::PdfStore;

/// Deletes PDFs that no ledger row refers to.
///
/// Such files are left behind when a ledger commit fails after the PDF was
/// written and the immediate cleanup failed too. Files younger than
/// `min_age` are skipped so an in-flight create is never raced.
///
/// # Arguments
///
/// * `_guard` - Proof that the ledger lock is held
/// * `ledger` - Ledger deciding which numbers are live
/// * `pdfs` - Artifact directory to sweep
/// * `min_age` - Minimum age of a file before it may be removed
///
/// # Returns
///
/// Invoice numbers whose PDFs were removed.
///
/// # Errors
///
/// Fails without removing anything if the ledger cannot be read.
pub async fn sweep_orphans(
    _guard: &LedgerGuard,
    ledger: &LedgerStore,
    pdfs: &PdfStore,
    min_age: Duration,
) -> Result<Vec<String>, InvoiceError> {
    let live: HashSet<String> = ledger
        .read_all()
        .await?
        .into_iter()
        .map(|record| record.invoice_no)
        .collect();

    let now = SystemTime::now();
    let mut removed = Vec::new();

    for pdf in pdfs.list().await? {
        if live.contains(&pdf.invoice_no) {
            continue;
        }

        let age = now.duration_since(pdf.modified).unwrap_or_default();
        if age < min_age {
            debug!("Orphan {} is only {:?} old, keeping", pdf.invoice_no, age);
            continue;
        }

        match pdfs.remove(&pdf.invoice_no).await {
            Ok(true) => {
                info!("Removed orphaned PDF {:?}", pdf.path);
                removed.push(pdf.invoice_no);
            }
            Ok(false) => {}
            Err(e) => warn!("Failed to remove orphaned PDF {:?}: {}", pdf.path, e),
        }
    }

    Ok(removed)
}
