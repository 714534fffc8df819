use chrono::{DateTime, Local, Utc};
use tracing::{error, info, warn};

use crate::billing::numbering::{allocate_next, Allocation};
use crate::billing::tax::{compute_totals, priced_lines, Totals};
use crate::billing::words::amount_in_words;
use crate::error::InvoiceError;
use crate::invoices::types::{DeleteResponse, SaveResponse};
use crate::ledger::LedgerGuard;
use crate::models::invoice::validate_invoice_no;
use crate::models::{CreateInvoice, InvoiceDocument, InvoiceRecord};
use crate::worker::sweep::sweep_orphans;
use crate::AppState;

/// Download URL stored in the ledger for an invoice.
pub fn pdf_url_for(api_base_url: &str, invoice_no: &str) -> String {
    format!("{}/{}/pdf", api_base_url.trim_end_matches('/'), invoice_no)
}

/// Renderer input for a validated request.
pub fn build_document(
    invoice_no: &str,
    request: &CreateInvoice,
    totals: Totals,
    home_state: &str,
    now: DateTime<Utc>,
) -> InvoiceDocument {
    InvoiceDocument {
        invoice_number: invoice_no.to_string(),
        seller_home_state: home_state.trim().to_string(),
        invoice_date: request.invoice_date_or(now.date_naive()),
        customer: request.customer.clone(),
        items: priced_lines(&request.items),
        totals,
        amount_in_words: amount_in_words(totals.total),
    }
}

/// A rendered invoice ready to be committed.
struct Rendered {
    document: InvoiceDocument,
    bytes: Vec<u8>,
    now: DateTime<Utc>,
}

/// Prices and renders a request. Touches neither the ledger nor the
/// artifact directory.
async fn render(
    state: &AppState,
    invoice_no: &str,
    request: &CreateInvoice,
) -> Result<Rendered, InvoiceError> {
    let totals = compute_totals(
        &request.items,
        &request.customer.state,
        request.shipping.unwrap_or_default(),
        &state.config.seller_home_state,
    );
    let now = Utc::now();
    let document = build_document(
        invoice_no,
        request,
        totals,
        &state.config.seller_home_state,
        now,
    );

    let bytes = state.renderer.render(&document).await?;
    Ok(Rendered {
        document,
        bytes,
        now,
    })
}

/// Writes the PDF and then the ledger row. Caller holds the lock.
///
/// `previous` is the PDF the row pointed at before this commit, if any.
/// When the row cannot be written the artifact directory is put back as
/// it was: the previous PDF is restored, or the new one removed when
/// there was none.
async fn commit(
    state: &AppState,
    guard: &LedgerGuard,
    request: &CreateInvoice,
    rendered: &Rendered,
    previous: Option<Vec<u8>>,
) -> Result<InvoiceRecord, InvoiceError> {
    let invoice_no = &rendered.document.invoice_number;
    state.pdfs.write(invoice_no, &rendered.bytes).await?;

    let pdf_url = pdf_url_for(&state.config.api_base_url, invoice_no);
    let record = InvoiceRecord::from_request(
        invoice_no,
        request,
        &rendered.document.totals,
        Some(pdf_url),
        rendered.now,
    );

    if let Err(e) = state.ledger.upsert(guard, &record).await {
        error!("Ledger commit failed for {}: {}", invoice_no, e);
        roll_back_pdf(state, invoice_no, previous).await;
        return Err(e);
    }

    Ok(record)
}

async fn roll_back_pdf(state: &AppState, invoice_no: &str, previous: Option<Vec<u8>>) {
    match previous {
        Some(bytes) => match state.pdfs.write(invoice_no, &bytes).await {
            Ok(_) => info!("Restored previous PDF for {}", invoice_no),
            Err(e) => error!("Could not restore previous PDF for {}: {}", invoice_no, e),
        },
        None => match state.pdfs.remove(invoice_no).await {
            Ok(_) => info!("Removed uncommitted PDF for {}", invoice_no),
            Err(e) => warn!(
                "Could not remove uncommitted PDF for {}, left for the sweeper: {}",
                invoice_no, e
            ),
        },
    }
}

fn save_response(message: &str, rendered: &Rendered, record: &InvoiceRecord) -> SaveResponse {
    SaveResponse {
        success: true,
        message: message.to_string(),
        invoice_number: record.invoice_no.clone(),
        totals: rendered.document.totals,
        amount_in_words: rendered.document.amount_in_words.clone(),
        pdf_url: record.pdf_url.clone().unwrap_or_default(),
    }
}

/// Creates an invoice: validate, reject duplicates, price, render, then
/// commit PDF and ledger row together under the lock.
///
/// Rendering runs outside the lock so a slow browser does not stall other
/// requests; the duplicate check is repeated under the lock before anything
/// is written.
///
/// # Errors
///
/// * `Validation` - malformed request, nothing touched
/// * `Duplicate` - number already in the ledger, no PDF written
/// * `Render` - every renderer failed, ledger untouched
/// * `LockTimeout` / `Store` - lock or file failure
pub async fn create_invoice(
    state: &AppState,
    request: CreateInvoice,
) -> Result<SaveResponse, InvoiceError> {
    let invoice_no = request
        .invoice_number
        .as_deref()
        .unwrap_or_default()
        .trim()
        .to_string();
    request.validate(&invoice_no)?;

    info!(
        "Creating invoice {} for {} ({} items)",
        invoice_no,
        request.customer.name.trim(),
        request.items.len()
    );

    if state.ledger.exists(&invoice_no).await? {
        warn!("Rejected duplicate invoice {}", invoice_no);
        return Err(InvoiceError::Duplicate(invoice_no));
    }

    let rendered = render(state, &invoice_no, &request).await?;

    let guard = state.lock.acquire().await?;
    if state.ledger.exists(&invoice_no).await? {
        warn!("Invoice {} was committed while rendering, discarding", invoice_no);
        return Err(InvoiceError::Duplicate(invoice_no));
    }
    let record = commit(state, &guard, &request, &rendered, None).await?;
    guard.release();

    state.reservations.release(&invoice_no);
    info!("Invoice {} created, total {}", invoice_no, record.total);

    Ok(save_response("Invoice created successfully", &rendered, &record))
}

/// Re-prices and re-renders an existing invoice and overwrites its row.
///
/// The number comes from the path; any number in the body is ignored.
/// `createdAt` of the existing row is kept.
pub async fn update_invoice(
    state: &AppState,
    invoice_no: &str,
    mut request: CreateInvoice,
) -> Result<SaveResponse, InvoiceError> {
    let invoice_no = invoice_no.trim().to_string();
    request.invoice_number = Some(invoice_no.clone());
    request.validate(&invoice_no)?;

    if !state.ledger.exists(&invoice_no).await? {
        return Err(not_found(&invoice_no));
    }

    info!("Updating invoice {}", invoice_no);
    let rendered = render(state, &invoice_no, &request).await?;

    let guard = state.lock.acquire().await?;
    if !state.ledger.exists(&invoice_no).await? {
        warn!("Invoice {} was deleted while rendering", invoice_no);
        return Err(not_found(&invoice_no));
    }
    let previous = state.pdfs.read(&invoice_no).await?;
    let record = commit(state, &guard, &request, &rendered, previous).await?;
    guard.release();

    info!("Invoice {} updated, total {}", invoice_no, record.total);
    Ok(save_response("Invoice updated successfully", &rendered, &record))
}

/// Removes the ledger row and the PDF, whichever exist.
///
/// # Errors
///
/// Returns `NotFound` only when neither the row nor the PDF existed.
pub async fn delete_invoice(
    state: &AppState,
    invoice_no: &str,
) -> Result<DeleteResponse, InvoiceError> {
    let invoice_no = invoice_no.trim();
    validate_invoice_no(invoice_no)?;

    let guard = state.lock.acquire().await?;

    let row_removed = match state.ledger.remove(&guard, invoice_no).await {
        Ok(_) => true,
        Err(InvoiceError::NotFound(_)) => false,
        Err(e) => return Err(e),
    };

    let pdf_removed = match state.pdfs.remove(invoice_no).await {
        Ok(removed) => removed,
        Err(e) if row_removed => {
            warn!("Row {} removed but its PDF could not be: {}", invoice_no, e);
            false
        }
        Err(e) => return Err(e),
    };
    guard.release();

    if !row_removed && !pdf_removed {
        return Err(not_found(invoice_no));
    }

    info!(
        "Invoice {} deleted (row: {}, pdf: {})",
        invoice_no, row_removed, pdf_removed
    );
    Ok(DeleteResponse {
        success: true,
        message: format!("Invoice {} deleted", invoice_no),
        row_removed,
        pdf_removed,
    })
}

/// Every row with a non-blank invoice number.
pub async fn list_invoices(state: &AppState) -> Result<Vec<InvoiceRecord>, InvoiceError> {
    Ok(state
        .ledger
        .read_all()
        .await?
        .into_iter()
        .filter(|record| !record.invoice_no.is_empty())
        .collect())
}

pub async fn get_invoice(state: &AppState, invoice_no: &str) -> Result<InvoiceRecord, InvoiceError> {
    state
        .ledger
        .find(invoice_no)
        .await?
        .ok_or_else(|| not_found(invoice_no))
}

pub async fn latest_invoice(state: &AppState) -> Result<Option<InvoiceRecord>, InvoiceError> {
    state.ledger.latest().await
}

/// Allocates and reserves the next number for today's server-local date.
pub async fn next_invoice_number(state: &AppState) -> Result<Allocation, InvoiceError> {
    let guard = state.lock.acquire().await?;
    let allocation = allocate_next(
        &guard,
        &state.ledger,
        &state.reservations,
        Local::now().date_naive(),
    )
    .await;
    guard.release();
    Ok(allocation)
}

/// Stored download URL of an invoice whose PDF has been generated.
pub async fn invoice_pdf_url(state: &AppState, invoice_no: &str) -> Result<String, InvoiceError> {
    let record = get_invoice(state, invoice_no).await?;
    match record.pdf_url {
        Some(url) if record.pdf_generated => Ok(url),
        _ => Err(InvoiceError::NotFound(format!(
            "PDF not generated for invoice {}",
            invoice_no
        ))),
    }
}

/// PDF bytes of an invoice.
pub async fn invoice_pdf(state: &AppState, invoice_no: &str) -> Result<Vec<u8>, InvoiceError> {
    state
        .pdfs
        .read(invoice_no.trim())
        .await?
        .ok_or_else(|| InvoiceError::NotFound(format!("PDF not found for invoice {}", invoice_no)))
}

/// Runs one orphan sweep under the ledger lock.
pub async fn sweep(state: &AppState) -> Result<Vec<String>, InvoiceError> {
    let guard = state.lock.acquire().await?;
    let removed = sweep_orphans(
        &guard,
        &state.ledger,
        &state.pdfs,
        state.config.orphan_min_age,
    )
    .await?;
    guard.release();
    Ok(removed)
}

fn not_found(invoice_no: &str) -> InvoiceError {
    InvoiceError::NotFound(format!("Invoice {} not found", invoice_no))
}
