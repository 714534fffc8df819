use std::str::FromStr;

use chrono::{DateTime, Utc};
use csv::StringRecord;
use rust_decimal::Decimal;

use crate::billing::tax::round2;
use crate::error::InvoiceError;
use crate::models::InvoiceRecord;

/// Ledger columns in canonical order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Column {
    InvoiceNo,
    InvoiceDate,
    CustomerName,
    CustomerPhone,
    CustomerAddress,
    State,
    Subtotal,
    Cgst,
    Sgst,
    Igst,
    Shipping,
    Total,
    PdfGenerated,
    PdfUrl,
    CreatedAt,
}

impl Column {
    pub const ALL: [Column; 15] = [
        Column::InvoiceNo,
        Column::InvoiceDate,
        Column::CustomerName,
        Column::CustomerPhone,
        Column::CustomerAddress,
        Column::State,
        Column::Subtotal,
        Column::Cgst,
        Column::Sgst,
        Column::Igst,
        Column::Shipping,
        Column::Total,
        Column::PdfGenerated,
        Column::PdfUrl,
        Column::CreatedAt,
    ];

    /// Header text written to the file.
    pub fn header(self) -> &'static str {
        match self {
            Column::InvoiceNo => "Invoice No",
            Column::InvoiceDate => "Invoice Date",
            Column::CustomerName => "Customer Name",
            Column::CustomerPhone => "Customer Phone",
            Column::CustomerAddress => "Customer Address",
            Column::State => "State",
            Column::Subtotal => "Subtotal",
            Column::Cgst => "CGST",
            Column::Sgst => "SGST",
            Column::Igst => "IGST",
            Column::Shipping => "Shipping",
            Column::Total => "Total",
            Column::PdfGenerated => "PDF Generated",
            Column::PdfUrl => "PDF URL",
            Column::CreatedAt => "Created At",
        }
    }

    /// Accepted header spellings, in normalized form.
    fn spellings(self) -> &'static [&'static str] {
        match self {
            Column::InvoiceNo => &["invoiceno", "invoicenumber"],
            Column::InvoiceDate => &["invoicedate"],
            Column::CustomerName => &["customername"],
            Column::CustomerPhone => &["customerphone"],
            Column::CustomerAddress => &["customeraddress"],
            Column::State => &["state"],
            Column::Subtotal => &["subtotal"],
            Column::Cgst => &["cgst"],
            Column::Sgst => &["sgst"],
            Column::Igst => &["igst"],
            Column::Shipping => &["shipping", "shippingcharges"],
            Column::Total => &["total"],
            Column::PdfGenerated => &["pdfgenerated"],
            Column::PdfUrl => &["pdfurl"],
            Column::CreatedAt => &["createdat"],
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

/// Header text with case, whitespace, dots and underscores removed.
fn normalize(header: &str) -> String {
    header
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '.' && *c != '_')
        .flat_map(char::to_lowercase)
        .collect()
}

/// The canonical 15-column header.
pub fn canonical_header() -> Vec<&'static str> {
    Column::ALL.iter().map(|c| c.header()).collect()
}

/// Position of each known column in a file's header row.
#[derive(Debug, Clone)]
pub struct HeaderMap {
    positions: [Option<usize>; 15],
}

impl HeaderMap {
    /// Maps a header row onto the typed columns.
    ///
    /// Unknown headers are ignored and missing columns read as blank.
    ///
    /// # Errors
    ///
    /// Returns `InvoiceError::Store` if no invoice-number column exists.
    pub fn resolve(headers: &StringRecord) -> Result<Self, InvoiceError> {
        let mut positions = [None; 15];
        for (position, header) in headers.iter().enumerate() {
            let normalized = normalize(header);
            if let Some(column) = Column::ALL
                .iter()
                .find(|c| c.spellings().contains(&normalized.as_str()))
            {
                if positions[column.index()].is_none() {
                    positions[column.index()] = Some(position);
                }
            }
        }

        if positions[Column::InvoiceNo.index()].is_none() {
            return Err(InvoiceError::Store(
                "Invoice number column not found in ledger header".into(),
            ));
        }

        Ok(Self { positions })
    }

    /// Trimmed cell for `column`, empty when absent.
    pub fn cell<'r>(&self, row: &'r StringRecord, column: Column) -> &'r str {
        self.positions[column.index()]
            .and_then(|position| row.get(position))
            .map(str::trim)
            .unwrap_or("")
    }
}

fn format_amount(value: Decimal) -> String {
    let mut value = round2(value);
    value.rescale(2);
    value.to_string()
}

fn parse_amount(raw: &str, column: Column, line: usize) -> Result<Decimal, InvoiceError> {
    if raw.is_empty() {
        return Ok(Decimal::ZERO);
    }
    Decimal::from_str(raw).map_err(|_| {
        InvoiceError::Store(format!(
            "Ledger line {}: {} value {:?} is not a number",
            line,
            column.header(),
            raw
        ))
    })
}

fn parse_flag(raw: &str) -> bool {
    matches!(raw.to_lowercase().as_str(), "yes" | "true" | "1")
}

fn parse_timestamp(raw: &str, line: usize) -> Result<DateTime<Utc>, InvoiceError> {
    if raw.is_empty() {
        return Ok(DateTime::<Utc>::default());
    }
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|_| {
            InvoiceError::Store(format!(
                "Ledger line {}: Created At value {:?} is not RFC 3339",
                line, raw
            ))
        })
}

/// Serializes a record into canonical column order.
pub fn to_row(record: &InvoiceRecord) -> Vec<String> {
    Column::ALL
        .iter()
        .map(|column| match column {
            Column::InvoiceNo => record.invoice_no.clone(),
            Column::InvoiceDate => record.invoice_date.clone(),
            Column::CustomerName => record.customer_name.clone(),
            Column::CustomerPhone => record.customer_phone.clone(),
            Column::CustomerAddress => record.customer_address.clone(),
            Column::State => record.state.clone(),
            Column::Subtotal => format_amount(record.subtotal),
            Column::Cgst => format_amount(record.cgst),
            Column::Sgst => format_amount(record.sgst),
            Column::Igst => format_amount(record.igst),
            Column::Shipping => format_amount(record.shipping),
            Column::Total => format_amount(record.total),
            Column::PdfGenerated => (if record.pdf_generated { "Yes" } else { "No" }).to_string(),
            Column::PdfUrl => record.pdf_url.clone().unwrap_or_default(),
            Column::CreatedAt => record.created_at.to_rfc3339(),
        })
        .collect()
}

/// Parses one data row; `Ok(None)` for rows where every cell is blank.
///
/// `line` is the 1-based file line, used in error messages.
pub fn from_row(
    map: &HeaderMap,
    row: &StringRecord,
    line: usize,
) -> Result<Option<InvoiceRecord>, InvoiceError> {
    if row.iter().all(|cell| cell.trim().is_empty()) {
        return Ok(None);
    }

    let text = |column| map.cell(row, column).to_string();
    let amount = |column| parse_amount(map.cell(row, column), column, line);
    let pdf_url = Some(text(Column::PdfUrl)).filter(|url| !url.is_empty());

    Ok(Some(InvoiceRecord {
        invoice_no: text(Column::InvoiceNo),
        invoice_date: text(Column::InvoiceDate),
        customer_name: text(Column::CustomerName),
        customer_phone: text(Column::CustomerPhone),
        customer_address: text(Column::CustomerAddress),
        state: text(Column::State),
        subtotal: amount(Column::Subtotal)?,
        cgst: amount(Column::Cgst)?,
        sgst: amount(Column::Sgst)?,
        igst: amount(Column::Igst)?,
        shipping: amount(Column::Shipping)?,
        total: amount(Column::Total)?,
        pdf_generated: parse_flag(map.cell(row, Column::PdfGenerated)),
        pdf_url,
        created_at: parse_timestamp(map.cell(row, Column::CreatedAt), line)?,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_canonical_header_has_fifteen_columns() {
        let header = canonical_header();
        assert_eq!(header.len(), 15);
        assert_eq!(header[0], "Invoice No");
        assert_eq!(header[13], "PDF URL");
    }

    #[test]
    fn test_resolve_tolerates_alternate_spellings() {
        let headers = StringRecord::from(vec!["  INVOICE_NO ", "total", "Pdf Generated"]);
        let map = HeaderMap::resolve(&headers).unwrap();
        let row = StringRecord::from(vec!["GH25010101", "210.00", "Yes"]);
        assert_eq!(map.cell(&row, Column::InvoiceNo), "GH25010101");
        assert_eq!(map.cell(&row, Column::Total), "210.00");
        assert_eq!(map.cell(&row, Column::CustomerName), "");
    }

    #[test]
    fn test_resolve_requires_invoice_column() {
        let headers = StringRecord::from(vec!["Customer Name", "Total"]);
        assert!(matches!(
            HeaderMap::resolve(&headers),
            Err(InvoiceError::Store(_))
        ));
    }

    #[test]
    fn test_legacy_fourteen_column_row_reads_without_url() {
        let mut legacy: Vec<&str> = canonical_header();
        legacy.retain(|h| *h != "PDF URL");
        let map = HeaderMap::resolve(&StringRecord::from(legacy)).unwrap();
        let row = StringRecord::from(vec![
            "GH25010101", "2025-01-01", "Ravi", "9000000000", "Gara", "Andhra Pradesh",
            "200", "5", "5", "0", "", "210", "Yes", "2025-01-01T10:00:00Z",
        ]);
        let record = from_row(&map, &row, 2).unwrap().unwrap();
        assert_eq!(record.pdf_url, None);
        assert!(record.pdf_generated);
        assert_eq!(record.shipping, dec!(0));
        assert_eq!(record.total, dec!(210));
    }

    #[test]
    fn test_blank_row_is_skipped() {
        let map = HeaderMap::resolve(&StringRecord::from(canonical_header())).unwrap();
        let row = StringRecord::from(vec!["", " ", ""]);
        assert!(from_row(&map, &row, 3).unwrap().is_none());
    }

    #[test]
    fn test_bad_amount_is_store_error() {
        let map = HeaderMap::resolve(&StringRecord::from(canonical_header())).unwrap();
        let mut cells = vec![""; 15];
        cells[0] = "GH25010101";
        cells[11] = "lots";
        let err = from_row(&map, &StringRecord::from(cells), 2).unwrap_err();
        assert!(err.to_string().contains("Total"));
    }

    #[test]
    fn test_amounts_written_with_two_decimals() {
        assert_eq!(format_amount(dec!(5)), "5.00");
        assert_eq!(format_amount(dec!(10.005)), "10.01");
    }
}
