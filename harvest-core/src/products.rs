use std::io::ErrorKind;
use std::path::Path;

use axum::{extract::State, response::Json, routing::get, Router};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{debug, warn};

use crate::error::InvoiceError;
use crate::AppState;

/// Pack size of a catalogue entry, as the catalogue file spells it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Quantity {
    Count(Decimal),
    Label(String),
}

impl Default for Quantity {
    fn default() -> Self {
        Quantity::Label(String::new())
    }
}

/// A product offered on the invoice form, with its default rate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub name: String,

    #[serde(default)]
    pub quantity: Quantity,

    pub rate: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductsResponse {
    pub success: bool,
    pub rates: Vec<Product>,
}

/// Reads the product catalogue, a JSON array of products.
///
/// A missing file is an empty catalogue.
///
/// # Errors
///
/// Returns `InvoiceError::Store` if the file cannot be read or parsed.
pub async fn load_products(path: &Path) -> Result<Vec<Product>, InvoiceError> {
    let bytes = match fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!("No product catalogue at {:?}", path);
            return Ok(Vec::new());
        }
        Err(e) => return Err(e.into()),
    };

    serde_json::from_slice(&bytes).map_err(|e| {
        warn!("Product catalogue {:?} is malformed: {}", path, e);
        InvoiceError::Store(format!("Failed to parse product catalogue: {}", e))
    })
}

/// Routes mounted under `/api/products`.
pub fn product_routes() -> Router<AppState> {
    Router::new().route("/", get(list_products_handler))
}

/// List products handler.
///
/// Handles GET requests to `/api/products`. The catalogue is read on every
/// request, so edits to the file show up without a restart.
pub async fn list_products_handler(
    State(state): State<AppState>,
) -> Result<Json<ProductsResponse>, InvoiceError> {
    let rates = load_products(&state.config.products_path).await?;
    Ok(Json(ProductsResponse {
        success: true,
        rates,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_missing_catalogue_is_empty() {
        let dir = TempDir::new().unwrap();
        let products = load_products(&dir.path().join("productRates.json"))
            .await
            .unwrap();
        assert!(products.is_empty());
    }

    #[tokio::test]
    async fn test_catalogue_entries_parsed() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("productRates.json");
        std::fs::write(
            &path,
            r#"[
                {"name": "Turmeric Powder", "quantity": "500g", "rate": 180},
                {"name": "Jaggery", "quantity": 1, "rate": 95.5},
                {"name": "Sample", "rate": 0}
            ]"#,
        )
        .unwrap();

        let products = load_products(&path).await.unwrap();
        assert_eq!(products.len(), 3);
        assert_eq!(products[0].quantity, Quantity::Label("500g".into()));
        assert_eq!(products[0].rate, dec!(180));
        assert_eq!(products[1].quantity, Quantity::Count(dec!(1)));
        assert_eq!(products[1].rate, dec!(95.5));
        assert_eq!(products[2].quantity, Quantity::default());
    }

    #[tokio::test]
    async fn test_malformed_catalogue_is_store_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("productRates.json");
        std::fs::write(&path, "{ not json").unwrap();

        let err = load_products(&path).await.unwrap_err();
        assert!(matches!(err, InvoiceError::Store(_)));
    }
}
