use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

/// Errors surfaced by the invoice service and its collaborators.
#[derive(Debug, Error)]
pub enum InvoiceError {
    /// Rejected before any side effect
    #[error("Validation error: {0}")]
    Validation(String),

    /// Invoice number already present in the ledger
    #[error("Invoice number {0} already exists")]
    Duplicate(String),

    #[error("{0}")]
    NotFound(String),

    /// The ledger lock could not be taken within the retry budget
    #[error("Lock timeout: gave up after {attempts} attempts")]
    LockTimeout { attempts: u32 },

    /// Both the preview render and the static fallback failed
    #[error("PDF generation failed: {0}")]
    Render(String),

    /// Ledger or artifact I/O failure
    #[error("Store error: {0}")]
    Store(String),
}

impl InvoiceError {
    /// HTTP status the error maps to.
    pub fn status_code(&self) -> StatusCode {
        match self {
            InvoiceError::Validation(_) => StatusCode::BAD_REQUEST,
            InvoiceError::Duplicate(_) => StatusCode::CONFLICT,
            InvoiceError::NotFound(_) => StatusCode::NOT_FOUND,
            InvoiceError::LockTimeout { .. } => StatusCode::SERVICE_UNAVAILABLE,
            InvoiceError::Render(_) => StatusCode::BAD_GATEWAY,
            InvoiceError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<std::io::Error> for InvoiceError {
    fn from(err: std::io::Error) -> Self {
        InvoiceError::Store(err.to_string())
    }
}

impl From<csv::Error> for InvoiceError {
    fn from(err: csv::Error) -> Self {
        InvoiceError::Store(err.to_string())
    }
}

impl IntoResponse for InvoiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self);
        }

        let body = Json(serde_json::json!({
            "success": false,
            "error": self.to_string(),
        }));

        (status, body).into_response()
    }
}
