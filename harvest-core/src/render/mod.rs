pub mod artifacts;
pub mod chrome;
pub mod html;
pub mod pipeline;

pub use artifacts::{PdfStore, StoredPdf};
pub use chrome::{HeadlessChrome, PreviewRenderer, StaticHtmlRenderer};
pub use pipeline::RenderPipeline;

use async_trait::async_trait;

use crate::error::InvoiceError;
use crate::models::InvoiceDocument;

/// Turns an invoice into PDF bytes.
///
/// Implementations report every failure (crash, timeout, empty output) as
/// `InvoiceError::Render`; retry and fallback policy lives in
/// [`RenderPipeline`].
#[async_trait]
pub trait PdfRenderer: Send + Sync {
    async fn render(&self, document: &InvoiceDocument) -> Result<Vec<u8>, InvoiceError>;

    /// Short label used in logs.
    fn name(&self) -> &'static str;
}
