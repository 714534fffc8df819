pub mod handlers;
pub mod service;
pub mod types;


pub use handlers::invoice_routes;
pub use service::{
    create_invoice, delete_invoice, get_invoice, invoice_pdf, invoice_pdf_url, latest_invoice,
    list_invoices, next_invoice_number, update_invoice,
};
pub use types::*;
