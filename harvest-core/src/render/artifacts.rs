use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

use crate::error::InvoiceError;
use crate::models::invoice::validate_invoice_no;

const FILE_PREFIX: &str = "invoice-";
const FILE_SUFFIX: &str = ".pdf";

/// A PDF found in the artifact directory.
#[derive(Debug, Clone)]
pub struct StoredPdf {
    pub invoice_no: String,
    pub path: PathBuf,
    pub modified: SystemTime,
}

/// Flat directory of rendered invoices, one `invoice-<no>.pdf` per number.
#[derive(Debug, Clone)]
pub struct PdfStore {
    dir: Arc<PathBuf>,
}

impl PdfStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: Arc::new(dir.as_ref().to_path_buf()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Deterministic file name for an invoice number.
    pub fn file_name(invoice_no: &str) -> String {
        format!("{}{}{}", FILE_PREFIX, invoice_no, FILE_SUFFIX)
    }

    /// Path of the artifact for `invoice_no`.
    ///
    /// # Errors
    ///
    /// Returns `InvoiceError::Validation` for numbers that are not plain
    /// file-name components.
    pub fn path_for(&self, invoice_no: &str) -> Result<PathBuf, InvoiceError> {
        validate_invoice_no(invoice_no)?;
        Ok(self.dir.join(Self::file_name(invoice_no)))
    }

    /// Writes the artifact durably: temp file, fsync, rename.
    pub async fn write(&self, invoice_no: &str, bytes: &[u8]) -> Result<PathBuf, InvoiceError> {
        let path = self.path_for(invoice_no)?;
        fs::create_dir_all(self.dir.as_ref()).await?;

        let tmp_path = self.dir.join(format!(".{}.tmp", Self::file_name(invoice_no)));
        let written = async {
            let mut file = fs::File::create(&tmp_path).await?;
            file.write_all(bytes).await?;
            file.sync_all().await
        }
        .await;
        if let Err(e) = written {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(e.into());
        }
        fs::rename(&tmp_path, &path).await?;

        info!("PDF saved: {:?} ({} bytes)", path, bytes.len());
        Ok(path)
    }

    /// Artifact bytes, or `None` when no file exists.
    pub async fn read(&self, invoice_no: &str) -> Result<Option<Vec<u8>>, InvoiceError> {
        let path = self.path_for(invoice_no)?;
        match fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn exists(&self, invoice_no: &str) -> Result<bool, InvoiceError> {
        let path = self.path_for(invoice_no)?;
        Ok(fs::try_exists(&path).await?)
    }

    /// Deletes the artifact; `Ok(false)` if there was none.
    pub async fn remove(&self, invoice_no: &str) -> Result<bool, InvoiceError> {
        let path = self.path_for(invoice_no)?;
        match fs::remove_file(&path).await {
            Ok(()) => {
                info!("PDF removed: {:?}", path);
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Every `invoice-*.pdf` in the directory. A missing directory is empty.
    pub async fn list(&self) -> Result<Vec<StoredPdf>, InvoiceError> {
        let mut entries = match fs::read_dir(self.dir.as_ref()).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut found = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(invoice_no) = name
                .to_str()
                .and_then(|n| n.strip_prefix(FILE_PREFIX))
                .and_then(|n| n.strip_suffix(FILE_SUFFIX))
            else {
                continue;
            };

            let modified = match entry.metadata().await.and_then(|m| m.modified()) {
                Ok(modified) => modified,
                Err(e) => {
                    warn!("Skipping {:?}: {}", entry.path(), e);
                    continue;
                }
            };

            found.push(StoredPdf {
                invoice_no: invoice_no.to_string(),
                path: entry.path(),
                modified,
            });
        }
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_write_read_remove() {
        let dir = TempDir::new().unwrap();
        let store = PdfStore::new(dir.path().join("pdf"));

        assert_eq!(store.read("GH25010101").await.unwrap(), None);
        let path = store.write("GH25010101", b"%PDF-1.4 test").await.unwrap();
        assert!(path.ends_with("invoice-GH25010101.pdf"));
        assert!(store.exists("GH25010101").await.unwrap());
        assert_eq!(
            store.read("GH25010101").await.unwrap().as_deref(),
            Some(&b"%PDF-1.4 test"[..])
        );

        assert!(store.remove("GH25010101").await.unwrap());
        assert!(!store.remove("GH25010101").await.unwrap());
        assert!(!store.exists("GH25010101").await.unwrap());
    }

    #[tokio::test]
    async fn test_list_only_invoice_pdfs() {
        let dir = TempDir::new().unwrap();
        let store = PdfStore::new(dir.path());
        store.write("GH25010101", b"%PDF").await.unwrap();
        std::fs::write(dir.path().join("notes.txt"), "x").unwrap();

        let listed = store.list().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].invoice_no, "GH25010101");
    }

    #[tokio::test]
    async fn test_traversal_rejected() {
        let dir = TempDir::new().unwrap();
        let store = PdfStore::new(dir.path());
        assert!(matches!(
            store.read("../secret").await,
            Err(InvoiceError::Validation(_))
        ));
    }
}
