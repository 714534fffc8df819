use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use tokio::fs;
use tokio::process::Command;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::InvoiceError;
use crate::models::InvoiceDocument;
use crate::render::html::invoice_html;
use crate::render::PdfRenderer;

/// Drives a headless Chromium-family browser in `--print-to-pdf` mode.
#[derive(Debug, Clone)]
pub struct HeadlessChrome {
    executable: String,
    timeout: Duration,
    scratch_dir: PathBuf,
}

impl HeadlessChrome {
    pub fn new(executable: impl Into<String>, timeout: Duration, scratch_dir: impl AsRef<Path>) -> Self {
        Self {
            executable: executable.into(),
            timeout,
            scratch_dir: scratch_dir.as_ref().to_path_buf(),
        }
    }

    fn scratch_file(&self, extension: &str) -> PathBuf {
        self.scratch_dir
            .join(format!("render-{}.{}", Uuid::new_v4(), extension))
    }

    /// Prints `url` to PDF and returns the bytes.
    ///
    /// # Errors
    ///
    /// Returns `InvoiceError::Render` if the browser cannot be started,
    /// exits unsuccessfully, exceeds the timeout, or leaves no PDF behind.
    pub async fn print_to_pdf(&self, url: &str) -> Result<Vec<u8>, InvoiceError> {
        fs::create_dir_all(&self.scratch_dir).await?;
        let output_path = self.scratch_file("pdf");

        let result = self.run(url, &output_path).await;
        let _ = fs::remove_file(&output_path).await;
        result
    }

    async fn run(&self, url: &str, output_path: &Path) -> Result<Vec<u8>, InvoiceError> {
        debug!("Launching {} for {}", self.executable, truncate(url));

        let child = Command::new(&self.executable)
            .arg("--headless")
            .arg("--disable-gpu")
            .arg("--no-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--hide-scrollbars")
            .arg("--no-pdf-header-footer")
            .arg(format!("--print-to-pdf={}", output_path.display()))
            .arg(url)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                InvoiceError::Render(format!("Failed to launch {}: {}", self.executable, e))
            })?;

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| {
                InvoiceError::Render(format!("Browser timed out after {:?}", self.timeout))
            })?
            .map_err(|e| InvoiceError::Render(format!("Browser did not finish: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(InvoiceError::Render(format!(
                "Browser exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        let bytes = fs::read(output_path)
            .await
            .map_err(|e| InvoiceError::Render(format!("No PDF produced: {}", e)))?;
        if !bytes.starts_with(b"%PDF") {
            return Err(InvoiceError::Render(format!(
                "Browser output is not a PDF ({} bytes)",
                bytes.len()
            )));
        }

        Ok(bytes)
    }
}

fn truncate(url: &str) -> &str {
    match url.char_indices().nth(120) {
        Some((index, _)) => &url[..index],
        None => url,
    }
}

/// Base64 payload made safe for a query string.
fn encode_payload(json: &[u8]) -> String {
    STANDARD
        .encode(json)
        .replace('+', "%2B")
        .replace('/', "%2F")
        .replace('=', "%3D")
}

/// Prints the frontend's preview page for the invoice.
///
/// The page receives the whole document as base64 JSON in the `data`
/// query parameter, so it can lay out an invoice that is not yet in the
/// ledger.
pub struct PreviewRenderer {
    chrome: HeadlessChrome,
    frontend_url: String,
}

impl PreviewRenderer {
    pub fn new(chrome: HeadlessChrome, frontend_url: impl Into<String>) -> Self {
        Self {
            chrome,
            frontend_url: frontend_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// URL of the preview page for `document`.
    pub fn preview_url(&self, document: &InvoiceDocument) -> Result<String, InvoiceError> {
        let json = serde_json::to_vec(document)
            .map_err(|e| InvoiceError::Render(format!("Failed to encode invoice: {}", e)))?;
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();

        Ok(format!(
            "{}/preview/{}?data={}&source=pdf&timestamp={}",
            self.frontend_url,
            document.invoice_number,
            encode_payload(&json),
            timestamp
        ))
    }
}

#[async_trait]
impl PdfRenderer for PreviewRenderer {
    async fn render(&self, document: &InvoiceDocument) -> Result<Vec<u8>, InvoiceError> {
        let url = self.preview_url(document)?;
        let bytes = self.chrome.print_to_pdf(&url).await?;
        info!(
            "Preview page printed for {} ({} bytes)",
            document.invoice_number,
            bytes.len()
        );
        Ok(bytes)
    }

    fn name(&self) -> &'static str {
        "preview"
    }
}

/// Prints the built-in invoice template from a local file.
pub struct StaticHtmlRenderer {
    chrome: HeadlessChrome,
}

impl StaticHtmlRenderer {
    pub fn new(chrome: HeadlessChrome) -> Self {
        Self { chrome }
    }
}

#[async_trait]
impl PdfRenderer for StaticHtmlRenderer {
    async fn render(&self, document: &InvoiceDocument) -> Result<Vec<u8>, InvoiceError> {
        fs::create_dir_all(&self.chrome.scratch_dir).await?;
        let html_path = self.chrome.scratch_file("html");
        fs::write(&html_path, invoice_html(document)).await?;

        let absolute = fs::canonicalize(&html_path).await?;
        let url = format!("file://{}", absolute.display());
        let result = self.chrome.print_to_pdf(&url).await;

        let _ = fs::remove_file(&html_path).await;
        result
    }

    fn name(&self) -> &'static str {
        "static-html"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::billing::tax::Totals;
    use crate::models::Customer;
    use tempfile::TempDir;

    fn document() -> InvoiceDocument {
        InvoiceDocument {
            invoice_number: "GH25010101".into(),
            seller_home_state: "Andhra Pradesh".into(),
            invoice_date: "2025-01-01".into(),
            customer: Customer {
                name: "Ravi".into(),
                ..Customer::default()
            },
            items: Vec::new(),
            totals: Totals::default(),
            amount_in_words: "Zero Rupees Only".into(),
        }
    }

    #[test]
    fn test_payload_is_query_safe() {
        let encoded = encode_payload(&[0xfb, 0xff, 0xfe]);
        assert!(!encoded.contains('+'));
        assert!(!encoded.contains('/'));
        assert!(!encoded.contains('='));
    }

    #[test]
    fn test_preview_url_shape() {
        let dir = TempDir::new().unwrap();
        let chrome = HeadlessChrome::new("chromium", Duration::from_secs(1), dir.path());
        let renderer = PreviewRenderer::new(chrome, "http://localhost:5173/");

        let url = renderer.preview_url(&document()).unwrap();
        assert!(url.starts_with("http://localhost:5173/preview/GH25010101?data="));
        assert!(url.contains("&source=pdf&timestamp="));
    }

    #[tokio::test]
    async fn test_missing_browser_is_render_error() {
        let dir = TempDir::new().unwrap();
        let chrome = HeadlessChrome::new(
            "/nonexistent/chromium-binary",
            Duration::from_secs(1),
            dir.path(),
        );
        let renderer = StaticHtmlRenderer::new(chrome);

        let err = renderer.render(&document()).await.unwrap_err();
        assert!(matches!(err, InvoiceError::Render(_)));
        // Scratch files are cleaned up
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
