use serde::{Deserialize, Serialize};

use crate::billing::numbering::Allocation;
use crate::billing::tax::Totals;
use crate::models::InvoiceRecord;

/// Response to a successful create or update.
///
/// Carries everything the form needs to show a receipt without another
/// round trip.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveResponse {
    pub success: bool,
    pub message: String,
    pub invoice_number: String,
    pub totals: Totals,
    pub amount_in_words: String,

    /// Where the rendered PDF can be downloaded
    pub pdf_url: String,
}

/// Every ledger row, in file order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoiceListResponse {
    pub success: bool,
    pub invoices: Vec<InvoiceRecord>,
    pub total: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoiceResponse {
    pub success: bool,
    pub invoice: InvoiceRecord,
}

/// Most recently created invoice; `invoice` is `null` on an empty ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LatestInvoiceResponse {
    pub success: bool,
    pub invoice: Option<InvoiceRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NextNumberResponse {
    pub success: bool,

    #[serde(flatten)]
    pub allocation: Allocation,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PdfUrlResponse {
    pub success: bool,
    pub pdf_url: String,
}

/// Outcome of a best-effort delete.
///
/// At least one of the two flags is true; a delete that found neither
/// part is a not-found error instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteResponse {
    pub success: bool,
    pub message: String,
    pub row_removed: bool,
    pub pdf_removed: bool,
}

/// PDFs removed by one reconciliation sweep.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepResponse {
    pub success: bool,
    pub removed: Vec<String>,
}
