use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use csv::{ReaderBuilder, WriterBuilder};
use tokio::fs;
use tracing::{debug, info};

use crate::error::InvoiceError;
use crate::ledger::lock::LedgerGuard;
use crate::ledger::schema::{canonical_header, from_row, to_row, HeaderMap};
use crate::models::InvoiceRecord;

/// What an upsert did to the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
}

/// The ledger of record: a single CSV sheet with one row per invoice.
///
/// Reads need no lock. Every mutation takes a `&LedgerGuard`, so the
/// read-modify-write cycle can only run while the ledger lock is held.
/// Writes replace the whole file atomically (temp file + rename).
#[derive(Debug, Clone)]
pub struct LedgerStore {
    path: Arc<PathBuf>,
}

impl LedgerStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: Arc::new(path.as_ref().to_path_buf()),
        }
    }

    /// Ledger file location.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Every non-blank row in file order.
    ///
    /// A missing file, an empty file or a header-only file all yield an
    /// empty list.
    ///
    /// # Errors
    ///
    /// Returns `InvoiceError::Store` if the file cannot be read or a row
    /// cannot be parsed.
    pub async fn read_all(&self) -> Result<Vec<InvoiceRecord>, InvoiceError> {
        let bytes = match fs::read(self.path.as_ref()).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("Ledger {:?} not found, treating as empty", self.path);
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };

        parse_ledger(&bytes)
    }

    /// Looks up one row by invoice number.
    pub async fn find(&self, invoice_no: &str) -> Result<Option<InvoiceRecord>, InvoiceError> {
        let invoice_no = invoice_no.trim();
        Ok(self
            .read_all()
            .await?
            .into_iter()
            .find(|record| record.invoice_no == invoice_no))
    }

    /// Whether a row with this invoice number exists.
    pub async fn exists(&self, invoice_no: &str) -> Result<bool, InvoiceError> {
        Ok(self.find(invoice_no).await?.is_some())
    }

    /// All invoice numbers, read under the lock for allocation.
    pub async fn invoice_numbers(&self, _guard: &LedgerGuard) -> Result<Vec<String>, InvoiceError> {
        Ok(self
            .read_all()
            .await?
            .into_iter()
            .map(|record| record.invoice_no)
            .collect())
    }

    /// Row with the latest `created_at`, if any.
    pub async fn latest(&self) -> Result<Option<InvoiceRecord>, InvoiceError> {
        Ok(self
            .read_all()
            .await?
            .into_iter()
            .filter(|record| !record.invoice_no.is_empty())
            .max_by_key(|record| record.created_at))
    }

    /// Replaces the row keyed by `record.invoice_no`, or appends it.
    ///
    /// The existing row's `created_at` is kept on replace. The file is
    /// created with the canonical header if it does not exist yet, and is
    /// always rewritten with the canonical header.
    ///
    /// # Arguments
    ///
    /// * `_guard` - Proof that the ledger lock is held
    /// * `record` - Row to write
    pub async fn upsert(
        &self,
        _guard: &LedgerGuard,
        record: &InvoiceRecord,
    ) -> Result<UpsertOutcome, InvoiceError> {
        let mut rows = self.read_all().await?;

        let outcome = match rows
            .iter_mut()
            .find(|row| row.invoice_no == record.invoice_no)
        {
            Some(existing) => {
                let created_at = existing.created_at;
                *existing = record.clone();
                existing.created_at = created_at;
                UpsertOutcome::Updated
            }
            None => {
                rows.push(record.clone());
                UpsertOutcome::Inserted
            }
        };

        self.write_all(&rows).await?;
        info!("Ledger row {} {:?}", record.invoice_no, outcome);
        Ok(outcome)
    }

    /// Removes the row keyed by `invoice_no` and returns it.
    ///
    /// # Errors
    ///
    /// Returns `InvoiceError::NotFound` (and leaves the file untouched)
    /// when no row matches.
    pub async fn remove(
        &self,
        _guard: &LedgerGuard,
        invoice_no: &str,
    ) -> Result<InvoiceRecord, InvoiceError> {
        let invoice_no = invoice_no.trim();
        let mut rows = self.read_all().await?;

        let position = rows
            .iter()
            .position(|row| row.invoice_no == invoice_no)
            .ok_or_else(|| InvoiceError::NotFound(format!("Invoice {} not found", invoice_no)))?;
        let removed = rows.remove(position);

        self.write_all(&rows).await?;
        info!("Ledger row {} removed", invoice_no);
        Ok(removed)
    }

    async fn write_all(&self, rows: &[InvoiceRecord]) -> Result<(), InvoiceError> {
        let bytes = render_ledger(rows)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }

        let mut tmp_name = self.path.as_os_str().to_owned();
        tmp_name.push(".tmp");
        let tmp_path = PathBuf::from(tmp_name);

        fs::write(&tmp_path, &bytes).await?;
        if let Err(e) = fs::rename(&tmp_path, self.path.as_ref()).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(e.into());
        }
        Ok(())
    }
}

fn parse_ledger(bytes: &[u8]) -> Result<Vec<InvoiceRecord>, InvoiceError> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(Vec::new());
    }

    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(bytes);

    let map = HeaderMap::resolve(reader.headers()?)?;

    let mut records = Vec::new();
    for (index, row) in reader.records().enumerate() {
        let row = row?;
        // header is line 1
        if let Some(record) = from_row(&map, &row, index + 2)? {
            records.push(record);
        }
    }
    Ok(records)
}

fn render_ledger(rows: &[InvoiceRecord]) -> Result<Vec<u8>, InvoiceError> {
    let mut writer = WriterBuilder::new().from_writer(Vec::new());
    writer.write_record(canonical_header())?;
    for row in rows {
        writer.write_record(to_row(row))?;
    }
    writer
        .into_inner()
        .map_err(|e| InvoiceError::Store(e.to_string()))
}
