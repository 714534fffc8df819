use std::fmt::Write;

use rust_decimal::Decimal;

use crate::models::InvoiceDocument;

const SELLER_NAME: &str = "GOLDEN HARVEST";
const SELLER_GSTIN: &str = "37CTWPJ4314B1ZN";
const SELLER_CONTACT: &str = "Mobile: 9949589098 | Mail: goldenharvest0648@gmail.com";
const DEFAULT_HOME_STATE: &str = "Andhra Pradesh";
const SELLER_ADDRESS: &str =
    "SH-31, Chinna Thulugu, Gara, Srikakulam, Andhra Pradesh - 532405";

const STYLE: &str = "\
body{font-family:Arial,sans-serif;margin:20px;font-size:13px}\
h1{text-align:center;margin:0 0 4px}\
.seller{text-align:center;margin-bottom:20px}\
.meta{display:flex;justify-content:space-between;margin-bottom:16px}\
table{width:100%;border-collapse:collapse;margin:12px 0}\
th,td{border:1px solid #999;padding:6px;text-align:left}\
td.num,th.num{text-align:right}\
.totals{width:40%;margin-left:auto}\
.terms{margin-top:32px}";

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn money(value: Decimal) -> String {
    format!("&#8377;{:.2}", value)
}

/// Self-contained tax invoice page used when the preview page cannot be
/// printed.
pub fn invoice_html(document: &InvoiceDocument) -> String {
    let customer = &document.customer;
    let totals = &document.totals;
    let home_state = match document.seller_home_state.trim() {
        "" => DEFAULT_HOME_STATE,
        state => state,
    };

    let mut rows = String::new();
    for (index, line) in document.items.iter().enumerate() {
        let _ = write!(
            rows,
            "<tr><td>{}</td><td>{}</td><td class=\"num\">{}</td><td class=\"num\">{}</td><td class=\"num\">{}</td></tr>",
            index + 1,
            escape(&line.name),
            line.qty,
            money(line.rate),
            money(line.amount),
        );
    }

    let mut tax_rows = String::new();
    if totals.igst.is_zero() {
        let _ = write!(
            tax_rows,
            "<tr><td>CGST @2.5%</td><td class=\"num\">{}</td></tr><tr><td>SGST @2.5%</td><td class=\"num\">{}</td></tr>",
            money(totals.cgst),
            money(totals.sgst),
        );
    } else {
        let _ = write!(
            tax_rows,
            "<tr><td>IGST @5%</td><td class=\"num\">{}</td></tr>",
            money(totals.igst),
        );
    }

    format!(
        "<!DOCTYPE html><html><head><meta charset=\"utf-8\"><title>Invoice {no}</title><style>{style}</style></head><body>\
<div id=\"invoice-container\">\
<h1>Tax Invoice</h1>\
<div class=\"seller\"><strong>{seller}</strong><br>GSTIN: {gstin}<br>{contact}<br>{seller_address}</div>\
<div class=\"meta\"><div><strong>BILL TO:</strong><br>{name}<br>{phone}<br>{address}<br>{state}</div>\
<div>Invoice No: {no}<br>Invoice Date: {date}</div></div>\
<table><thead><tr><th>#</th><th>Description</th><th class=\"num\">Qty</th><th class=\"num\">Rate</th><th class=\"num\">Amount</th></tr></thead><tbody>{rows}</tbody></table>\
<table class=\"totals\"><tr><td>Sub Total</td><td class=\"num\">{subtotal}</td></tr>{tax_rows}\
<tr><td>Shipping Charges</td><td class=\"num\">{shipping}</td></tr>\
<tr><th>Total</th><th class=\"num\">{total}</th></tr></table>\
<div class=\"terms\"><strong>Total Amount In Words:</strong><br>{words}<br><br>\
<strong>Terms &amp; Conditions:</strong><br>1. Goods once sold cannot be returned.<br>\
2. Shipping Charges applicable to customers from other than {home_state} state.<br>\
3. Shipping Charges for First order is Free.<br><br>Authorised Signatory</div>\
</div></body></html>",
        no = escape(&document.invoice_number),
        style = STYLE,
        seller = SELLER_NAME,
        gstin = SELLER_GSTIN,
        contact = SELLER_CONTACT,
        seller_address = SELLER_ADDRESS,
        name = escape(&customer.name),
        phone = escape(&customer.phone),
        address = escape(&customer.address),
        state = escape(&customer.state),
        date = escape(&document.invoice_date),
        home_state = escape(home_state),
        rows = rows,
        subtotal = money(totals.subtotal),
        tax_rows = tax_rows,
        shipping = money(totals.shipping),
        total = money(totals.total),
        words = escape(&document.amount_in_words),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::billing::tax::Totals;
    use crate::models::{Customer, PricedLine};
    use rust_decimal_macros::dec;

    fn document(igst: Decimal) -> InvoiceDocument {
        InvoiceDocument {
            invoice_number: "GH25010101".into(),
            seller_home_state: "Andhra Pradesh".into(),
            invoice_date: "2025-01-01".into(),
            customer: Customer {
                name: "<Ravi & Sons>".into(),
                phone: String::new(),
                address: String::new(),
                state: "Karnataka".into(),
            },
            items: vec![PricedLine {
                name: "Rice".into(),
                qty: dec!(2),
                rate: dec!(100),
                amount: dec!(200),
            }],
            totals: Totals {
                subtotal: dec!(200),
                igst,
                total: dec!(200) + igst,
                ..Totals::default()
            },
            amount_in_words: "Two Hundred Ten Rupees Only".into(),
        }
    }

    #[test]
    fn test_customer_text_is_escaped() {
        let html = invoice_html(&document(dec!(10)));
        assert!(html.contains("&lt;Ravi &amp; Sons&gt;"));
        assert!(!html.contains("<Ravi"));
    }

    #[test]
    fn test_tax_rows_follow_jurisdiction() {
        let html = invoice_html(&document(dec!(10)));
        assert!(html.contains("IGST @5%"));
        assert!(!html.contains("CGST"));

        let html = invoice_html(&document(dec!(0)));
        assert!(html.contains("CGST @2.5%"));
    }

    #[test]
    fn test_terms_name_configured_home_state() {
        let mut doc = document(dec!(10));
        doc.seller_home_state = "Odisha".into();
        let html = invoice_html(&doc);
        assert!(html.contains("from other than Odisha state"));
        assert!(!html.contains("Andhra Pradesh state"));
    }

    #[test]
    fn test_container_present() {
        assert!(invoice_html(&document(dec!(10))).contains("id=\"invoice-container\""));
    }
}
