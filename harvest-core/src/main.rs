use std::sync::Arc;

use axum::{extract::State, http::StatusCode, response::Json, routing::get, Router};
use dotenv::dotenv;
use harvest_core::config::AppConfig;
use harvest_core::invoices::invoice_routes;
use harvest_core::products::product_routes;
use harvest_core::render::{PdfRenderer, RenderPipeline};
use harvest_core::AppState;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, level_filters::LevelFilter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Health check endpoint.
///
/// Returns a simple JSON response indicating the server is running.
async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "service": "harvest-core",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Health check under the API prefix, in the shape the invoice form polls.
async fn api_health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "success": true,
        "message": "Server is running",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// Ledger health check endpoint.
///
/// Verifies that the ledger file can be read and parsed.
async fn ledger_health_check(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    let rows = state.ledger.read_all().await.map_err(|e| {
        tracing::error!("Ledger health check failed: {}", e);
        StatusCode::SERVICE_UNAVAILABLE
    })?;

    Ok(Json(serde_json::json!({
        "status": "ok",
        "ledger": "readable",
        "invoices": rows.len()
    })))
}

/// Creates the main application router.
///
/// # Arguments
///
/// * `state` - Shared ledger, lock, PDF store and renderer
///
/// # Returns
///
/// Returns a configured Axum Router.
fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/health/ledger", get(ledger_health_check))
        .route("/api/health", get(api_health_check))
        .nest("/api/invoices", invoice_routes())
        .nest("/api/products", product_routes())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

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

    info!("Starting Golden Harvest invoice server...");

    let config = AppConfig::from_env()?;
    info!(
        "Ledger: {:?}, PDFs: {:?}, home state: {}",
        config.ledger_path, config.pdf_dir, config.seller_home_state
    );

    let scratch_dir = std::env::temp_dir().join("harvest-render");
    let renderer: Arc<dyn PdfRenderer> =
        Arc::new(RenderPipeline::from_settings(&config.render, &scratch_dir));

    let host = config.host.clone();
    let port = config.port;
    let app = create_router(AppState::new(config, renderer));

    let listener = tokio::net::TcpListener::bind(format!("{}:{}", host, port))
        .await
        .map_err(|e| anyhow::anyhow!("Failed to bind to {}:{}: {}", host, port, e))?;

    info!("Server listening on {}:{}", host, port);

    axum::serve(listener, app)
        .await
        .map_err(|e| anyhow::anyhow!("Server error: {}", e))?;

    Ok(())
}
