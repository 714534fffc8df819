use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::config::RenderSettings;
use crate::error::InvoiceError;
use crate::models::InvoiceDocument;
use crate::render::{HeadlessChrome, PdfRenderer, PreviewRenderer, StaticHtmlRenderer};

/// Retry-then-fallback policy around two renderers.
///
/// The primary is tried up to `max_retries` times, sleeping
/// `attempt * retry_delay` between attempts. If every attempt fails the
/// fallback is tried once. Only when both give up does rendering fail.
pub struct RenderPipeline {
    primary: Option<Arc<dyn PdfRenderer>>,
    fallback: Arc<dyn PdfRenderer>,
    max_retries: u32,
    retry_delay: Duration,
}

impl RenderPipeline {
    pub fn new(
        primary: Option<Arc<dyn PdfRenderer>>,
        fallback: Arc<dyn PdfRenderer>,
        max_retries: u32,
        retry_delay: Duration,
    ) -> Self {
        Self {
            primary,
            fallback,
            max_retries,
            retry_delay,
        }
    }

    /// Preview page first (when a frontend URL is configured), built-in
    /// template second, both printed by the configured browser.
    pub fn from_settings(settings: &RenderSettings, scratch_dir: &Path) -> Self {
        let chrome = HeadlessChrome::new(&settings.chrome_path, settings.timeout, scratch_dir);

        let primary = settings.frontend_url.as_ref().map(|url| {
            Arc::new(PreviewRenderer::new(chrome.clone(), url.clone())) as Arc<dyn PdfRenderer>
        });
        if primary.is_none() {
            info!("FRONTEND_URL not set, invoices will use the built-in template");
        }

        Self::new(
            primary,
            Arc::new(StaticHtmlRenderer::new(chrome)),
            settings.max_retries,
            settings.retry_delay,
        )
    }
}

#[async_trait]
impl PdfRenderer for RenderPipeline {
    async fn render(&self, document: &InvoiceDocument) -> Result<Vec<u8>, InvoiceError> {
        let invoice_no = &document.invoice_number;

        if let Some(primary) = &self.primary {
            for attempt in 1..=self.max_retries {
                info!(
                    "Rendering {} with {} (attempt {}/{})",
                    invoice_no,
                    primary.name(),
                    attempt,
                    self.max_retries
                );
                match primary.render(document).await {
                    Ok(bytes) => return Ok(bytes),
                    Err(e) => {
                        warn!("{} attempt {} failed: {}", primary.name(), attempt, e);
                        if attempt < self.max_retries {
                            sleep(self.retry_delay * attempt).await;
                        }
                    }
                }
            }
            warn!(
                "{} exhausted for {}, falling back to {}",
                primary.name(),
                invoice_no,
                self.fallback.name()
            );
        }

        match self.fallback.render(document).await {
            Ok(bytes) => {
                info!("Rendered {} with {}", invoice_no, self.fallback.name());
                Ok(bytes)
            }
            Err(e) => {
                error!("All renderers failed for {}: {}", invoice_no, e);
                Err(InvoiceError::Render(format!(
                    "Unable to generate PDF for {}: {}",
                    invoice_no, e
                )))
            }
        }
    }

    fn name(&self) -> &'static str {
        "pipeline"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::billing::tax::Totals;
    use crate::models::Customer;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct Scripted {
        failures: u32,
        calls: AtomicU32,
        output: &'static [u8],
    }

    impl Scripted {
        fn new(failures: u32, output: &'static [u8]) -> Arc<Self> {
            Arc::new(Self {
                failures,
                calls: AtomicU32::new(0),
                output,
            })
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl PdfRenderer for Scripted {
        async fn render(&self, _document: &InvoiceDocument) -> Result<Vec<u8>, InvoiceError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call <= self.failures {
                Err(InvoiceError::Render("scripted failure".into()))
            } else {
                Ok(self.output.to_vec())
            }
        }

        fn name(&self) -> &'static str {
            "scripted"
        }
    }

    fn document() -> InvoiceDocument {
        InvoiceDocument {
            invoice_number: "GH25010101".into(),
            seller_home_state: "Andhra Pradesh".into(),
            invoice_date: "2025-01-01".into(),
            customer: Customer::default(),
            items: Vec::new(),
            totals: Totals::default(),
            amount_in_words: "Zero Rupees Only".into(),
        }
    }

    fn pipeline(primary: &Arc<Scripted>, fallback: &Arc<Scripted>) -> RenderPipeline {
        RenderPipeline::new(
            Some(primary.clone() as Arc<dyn PdfRenderer>),
            fallback.clone(),
            2,
            Duration::from_millis(1),
        )
    }

    #[tokio::test]
    async fn test_primary_success_skips_fallback() {
        let primary = Scripted::new(0, b"%PDF-primary");
        let fallback = Scripted::new(0, b"%PDF-fallback");

        let bytes = pipeline(&primary, &fallback).render(&document()).await.unwrap();
        assert_eq!(bytes, b"%PDF-primary");
        assert_eq!(fallback.calls(), 0);
    }

    #[tokio::test]
    async fn test_primary_retried_before_fallback() {
        let primary = Scripted::new(1, b"%PDF-primary");
        let fallback = Scripted::new(0, b"%PDF-fallback");

        let bytes = pipeline(&primary, &fallback).render(&document()).await.unwrap();
        assert_eq!(bytes, b"%PDF-primary");
        assert_eq!(primary.calls(), 2);
    }

    #[tokio::test]
    async fn test_fallback_after_retries_exhausted() {
        let primary = Scripted::new(u32::MAX, b"");
        let fallback = Scripted::new(0, b"%PDF-fallback");

        let bytes = pipeline(&primary, &fallback).render(&document()).await.unwrap();
        assert_eq!(bytes, b"%PDF-fallback");
        assert_eq!(primary.calls(), 2);
        assert_eq!(fallback.calls(), 1);
    }

    #[tokio::test]
    async fn test_both_failing_is_render_error() {
        let primary = Scripted::new(u32::MAX, b"");
        let fallback = Scripted::new(u32::MAX, b"");

        let err = pipeline(&primary, &fallback).render(&document()).await.unwrap_err();
        assert!(matches!(err, InvoiceError::Render(_)));
        assert_eq!(fallback.calls(), 1);
    }

    #[tokio::test]
    async fn test_without_primary_goes_straight_to_fallback() {
        let fallback = Scripted::new(0, b"%PDF-fallback");
        let pipeline = RenderPipeline::new(None, fallback.clone(), 2, Duration::from_millis(1));

        assert_eq!(pipeline.render(&document()).await.unwrap(), b"%PDF-fallback");
        assert_eq!(fallback.calls(), 1);
    }
}
