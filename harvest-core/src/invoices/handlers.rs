use axum::{
    extract::{Path, State},
    http::header,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use tracing::info;

use crate::error::InvoiceError;
use crate::invoices::service;
use crate::invoices::types::{
    DeleteResponse, InvoiceListResponse, InvoiceResponse, LatestInvoiceResponse,
    NextNumberResponse, PdfUrlResponse, SaveResponse, SweepResponse,
};
use crate::models::CreateInvoice;
use crate::AppState;

/// Routes mounted under `/api/invoices`.
pub fn invoice_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(create_handler).get(list_handler))
        .route("/next-number", get(next_number_handler))
        .route("/latest", get(latest_handler))
        .route("/latest-invoice", get(latest_handler))
        .route("/maintenance/sweep", post(sweep_handler))
        .route(
            "/:invoice_no",
            get(get_handler).put(update_handler).delete(delete_handler),
        )
        .route("/:invoice_no/pdf", get(download_pdf_handler))
        .route("/:invoice_no/view", get(view_pdf_handler))
        .route("/:invoice_no/pdf-url", get(pdf_url_handler))
}

/// Create invoice handler.
///
/// Handles POST requests to `/api/invoices`.
pub async fn create_handler(
    State(state): State<AppState>,
    Json(request): Json<CreateInvoice>,
) -> Result<Json<SaveResponse>, InvoiceError> {
    let response = service::create_invoice(&state, request).await?;
    Ok(Json(response))
}

/// List invoices handler.
///
/// Handles GET requests to `/api/invoices`.
pub async fn list_handler(
    State(state): State<AppState>,
) -> Result<Json<InvoiceListResponse>, InvoiceError> {
    let invoices = service::list_invoices(&state).await?;
    info!("Listing {} invoices", invoices.len());

    Ok(Json(InvoiceListResponse {
        success: true,
        total: invoices.len(),
        invoices,
    }))
}

pub async fn get_handler(
    State(state): State<AppState>,
    Path(invoice_no): Path<String>,
) -> Result<Json<InvoiceResponse>, InvoiceError> {
    let invoice = service::get_invoice(&state, &invoice_no).await?;
    Ok(Json(InvoiceResponse {
        success: true,
        invoice,
    }))
}

pub async fn update_handler(
    State(state): State<AppState>,
    Path(invoice_no): Path<String>,
    Json(request): Json<CreateInvoice>,
) -> Result<Json<SaveResponse>, InvoiceError> {
    let response = service::update_invoice(&state, &invoice_no, request).await?;
    Ok(Json(response))
}

pub async fn delete_handler(
    State(state): State<AppState>,
    Path(invoice_no): Path<String>,
) -> Result<Json<DeleteResponse>, InvoiceError> {
    let response = service::delete_invoice(&state, &invoice_no).await?;
    Ok(Json(response))
}

/// Next invoice number handler.
///
/// Every call reserves the number it returns, so two forms opened one
/// after the other get different numbers.
pub async fn next_number_handler(
    State(state): State<AppState>,
) -> Result<Json<NextNumberResponse>, InvoiceError> {
    let allocation = service::next_invoice_number(&state).await?;
    Ok(Json(NextNumberResponse {
        success: true,
        allocation,
    }))
}

pub async fn latest_handler(
    State(state): State<AppState>,
) -> Result<Json<LatestInvoiceResponse>, InvoiceError> {
    let invoice = service::latest_invoice(&state).await?;
    Ok(Json(LatestInvoiceResponse {
        success: true,
        invoice,
    }))
}

pub async fn pdf_url_handler(
    State(state): State<AppState>,
    Path(invoice_no): Path<String>,
) -> Result<Json<PdfUrlResponse>, InvoiceError> {
    let pdf_url = service::invoice_pdf_url(&state, &invoice_no).await?;
    Ok(Json(PdfUrlResponse {
        success: true,
        pdf_url,
    }))
}

/// PDF as a file download named `Invoice-<no>.pdf`.
pub async fn download_pdf_handler(
    State(state): State<AppState>,
    Path(invoice_no): Path<String>,
) -> Result<Response, InvoiceError> {
    let bytes = service::invoice_pdf(&state, &invoice_no).await?;
    Ok(pdf_response(bytes, "attachment", &invoice_no))
}

/// PDF shown in the browser's viewer.
pub async fn view_pdf_handler(
    State(state): State<AppState>,
    Path(invoice_no): Path<String>,
) -> Result<Response, InvoiceError> {
    let bytes = service::invoice_pdf(&state, &invoice_no).await?;
    Ok(pdf_response(bytes, "inline", &invoice_no))
}

pub async fn sweep_handler(
    State(state): State<AppState>,
) -> Result<Json<SweepResponse>, InvoiceError> {
    let removed = service::sweep(&state).await?;
    info!("Sweep removed {} orphaned PDFs", removed.len());
    Ok(Json(SweepResponse {
        success: true,
        removed,
    }))
}

fn pdf_response(bytes: Vec<u8>, disposition: &str, invoice_no: &str) -> Response {
    (
        [
            (header::CONTENT_TYPE, "application/pdf".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("{}; filename=\"Invoice-{}.pdf\"", disposition, invoice_no.trim()),
            ),
        ],
        bytes,
    )
        .into_response()
}
