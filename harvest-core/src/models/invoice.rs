use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::billing::tax::Totals;
use crate::error::InvoiceError;

/// Largest accepted quantity on one line.
const MAX_QTY: Decimal = Decimal::from_parts(1_000_000_000, 0, 0, false, 0);

/// Largest accepted rate on one line.
const MAX_RATE: Decimal = Decimal::from_parts(3_567_587_328, 232, 0, false, 0);

/// Largest accepted pre-tax invoice amount, shipping included.
const MAX_AMOUNT: Decimal = Decimal::from_parts(2_764_472_320, 232_830, 0, false, 0);

/// Invoice model representing one row of the ledger.
///
/// The ledger is the system of record; a row exists only once the
/// matching PDF has been written to the artifact directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceRecord {
    /// Unique key, `GH` + `YYMMDD` + daily sequence
    pub invoice_no: String,

    /// Calendar date printed on the invoice (`YYYY-MM-DD`)
    pub invoice_date: String,

    pub customer_name: String,
    pub customer_phone: String,
    pub customer_address: String,

    /// Shipping state, decides split vs. unified tax
    pub state: String,

    pub subtotal: Decimal,
    pub cgst: Decimal,
    pub sgst: Decimal,
    pub igst: Decimal,
    pub shipping: Decimal,
    pub total: Decimal,

    /// True once the PDF is durably on disk
    pub pdf_generated: bool,

    /// Where the rendered artifact can be fetched
    pub pdf_url: Option<String>,

    /// Set at first commit, preserved on update
    pub created_at: DateTime<Utc>,
}

impl InvoiceRecord {
    /// Builds a ledger row from a validated request and its computed totals.
    pub fn from_request(
        invoice_no: &str,
        request: &CreateInvoice,
        totals: &Totals,
        pdf_url: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        InvoiceRecord {
            invoice_no: invoice_no.to_string(),
            invoice_date: request.invoice_date_or(now.date_naive()),
            customer_name: request.customer.name.trim().to_string(),
            customer_phone: request.customer.phone.trim().to_string(),
            customer_address: request.customer.address.trim().to_string(),
            state: request.customer.state.trim().to_string(),
            subtotal: totals.subtotal,
            cgst: totals.cgst,
            sgst: totals.sgst,
            igst: totals.igst,
            shipping: totals.shipping,
            total: totals.total,
            pdf_generated: pdf_url.is_some(),
            pdf_url,
            created_at: now,
        }
    }
}

/// Bill-to block of the invoice form.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Customer {
    pub name: String,
    pub phone: String,
    pub address: String,
    pub state: String,
}

/// One product line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineItem {
    #[serde(default)]
    pub name: String,
    pub qty: Decimal,
    pub rate: Decimal,
}

/// Invoice creation / update request as submitted by the form.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateInvoice {
    /// Required on create; the path wins on update
    pub invoice_number: Option<String>,
    pub invoice_date: Option<String>,
    #[serde(default)]
    pub customer: Customer,
    #[serde(default)]
    pub items: Vec<LineItem>,
    /// Caller-supplied shipping charge, defaults to zero
    pub shipping: Option<Decimal>,
}

impl CreateInvoice {
    /// Checks required fields and amounts.
    ///
    /// # Errors
    ///
    /// Returns `InvoiceError::Validation` describing the first problem found.
    pub fn validate(&self, invoice_no: &str) -> Result<(), InvoiceError> {
        if invoice_no.trim().is_empty() {
            return Err(InvoiceError::Validation("invoiceNumber is required".into()));
        }
        validate_invoice_no(invoice_no)?;

        if self.customer.name.trim().is_empty() {
            return Err(InvoiceError::Validation("customer.name is required".into()));
        }

        if self.items.is_empty() {
            return Err(InvoiceError::Validation(
                "Invoice must have at least one item".into(),
            ));
        }

        for (index, item) in self.items.iter().enumerate() {
            if item.name.trim().is_empty() {
                return Err(InvoiceError::Validation(format!(
                    "items[{}].name is required",
                    index
                )));
            }
            if item.qty <= Decimal::ZERO {
                return Err(InvoiceError::Validation(format!(
                    "items[{}].qty must be positive",
                    index
                )));
            }
            if item.qty > MAX_QTY {
                return Err(InvoiceError::Validation(format!(
                    "items[{}].qty must not exceed {}",
                    index, MAX_QTY
                )));
            }
            if item.rate < Decimal::ZERO {
                return Err(InvoiceError::Validation(format!(
                    "items[{}].rate must not be negative",
                    index
                )));
            }
            if item.rate > MAX_RATE {
                return Err(InvoiceError::Validation(format!(
                    "items[{}].rate must not exceed {}",
                    index, MAX_RATE
                )));
            }
        }

        let shipping = self.shipping.unwrap_or_default();
        if shipping < Decimal::ZERO {
            return Err(InvoiceError::Validation(
                "shipping must not be negative".into(),
            ));
        }

        // Pricing uses plain arithmetic, so the whole invoice must fit here
        let total = self
            .items
            .iter()
            .try_fold(shipping, |sum, item| {
                item.qty.checked_mul(item.rate)?.checked_add(sum)
            })
            .filter(|total| *total <= MAX_AMOUNT);
        if total.is_none() {
            return Err(InvoiceError::Validation(format!(
                "Invoice amount must not exceed {}",
                MAX_AMOUNT
            )));
        }

        if let Some(date) = self.invoice_date.as_deref().filter(|d| !d.trim().is_empty()) {
            NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d").map_err(|_| {
                InvoiceError::Validation(format!("invoiceDate {} is not YYYY-MM-DD", date))
            })?;
        }

        Ok(())
    }

    /// Invoice date from the request, or `today` when absent.
    pub fn invoice_date_or(&self, today: NaiveDate) -> String {
        self.invoice_date
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| today.format("%Y-%m-%d").to_string())
    }
}

/// Rejects invoice numbers that cannot safely name a file.
pub fn validate_invoice_no(invoice_no: &str) -> Result<(), InvoiceError> {
    let ok = !invoice_no.is_empty()
        && invoice_no
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if ok {
        Ok(())
    } else {
        Err(InvoiceError::Validation(format!(
            "Invalid invoice number: {}",
            invoice_no
        )))
    }
}

/// A priced line as printed on the PDF.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PricedLine {
    pub name: String,
    pub qty: Decimal,
    pub rate: Decimal,
    pub amount: Decimal,
}

/// Everything the renderer needs to lay out one invoice.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceDocument {
    pub invoice_number: String,

    /// Seller's state, named in the shipping terms
    #[serde(default)]
    pub seller_home_state: String,

    pub invoice_date: String,
    pub customer: Customer,
    pub items: Vec<PricedLine>,
    pub totals: Totals,
    pub amount_in_words: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn request() -> CreateInvoice {
        CreateInvoice {
            invoice_number: Some("GH25010101".into()),
            invoice_date: None,
            customer: Customer {
                name: "Ravi".into(),
                phone: "9000000000".into(),
                address: "Srikakulam".into(),
                state: "Andhra Pradesh".into(),
            },
            items: vec![LineItem {
                name: "Turmeric".into(),
                qty: dec!(2),
                rate: dec!(100),
            }],
            shipping: None,
        }
    }

    #[test]
    fn test_valid_request_passes() {
        assert!(request().validate("GH25010101").is_ok());
    }

    #[test]
    fn test_missing_customer_name_rejected() {
        let mut req = request();
        req.customer.name = "  ".into();
        assert!(matches!(
            req.validate("GH25010101"),
            Err(InvoiceError::Validation(_))
        ));
    }

    #[test]
    fn test_non_positive_quantity_rejected() {
        let mut req = request();
        req.items[0].qty = dec!(0);
        assert!(req.validate("GH25010101").is_err());
    }

    #[test]
    fn test_negative_rate_rejected() {
        let mut req = request();
        req.items[0].rate = dec!(-1);
        assert!(req.validate("GH25010101").is_err());
    }

    #[test]
    fn test_out_of_range_amounts_rejected() {
        let mut req = request();
        req.items[0].qty = dec!(100000000000000000000);
        req.items[0].rate = dec!(100000000000000000000);
        assert!(matches!(
            req.validate("GH25010101"),
            Err(InvoiceError::Validation(_))
        ));

        let mut req = request();
        req.shipping = Some(dec!(1000000000000001));
        assert!(req.validate("GH25010101").is_err());

        // Each line in range, the sum is not
        let mut req = request();
        req.items[0].qty = dec!(1000000000);
        req.items[0].rate = dec!(10000000);
        assert!(req.validate("GH25010101").is_err());

        let mut req = request();
        req.items[0].qty = dec!(1000);
        req.items[0].rate = dec!(1000000);
        assert!(req.validate("GH25010101").is_ok());
    }

    #[test]
    fn test_amount_bounds() {
        assert_eq!(MAX_QTY, dec!(1000000000));
        assert_eq!(MAX_RATE, dec!(1000000000000));
        assert_eq!(MAX_AMOUNT, dec!(1000000000000000));
    }

    #[test]
    fn test_empty_items_rejected() {
        let mut req = request();
        req.items.clear();
        assert!(req.validate("GH25010101").is_err());
    }

    #[test]
    fn test_path_like_invoice_number_rejected() {
        assert!(validate_invoice_no("../etc/passwd").is_err());
        assert!(validate_invoice_no("GH25010101").is_ok());
    }

    #[test]
    fn test_bad_date_rejected() {
        let mut req = request();
        req.invoice_date = Some("01/01/2025".into());
        assert!(req.validate("GH25010101").is_err());
    }

    #[test]
    fn test_invoice_date_defaults_to_today() {
        let today = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        assert_eq!(request().invoice_date_or(today), "2025-01-01");
    }
}
