pub mod invoice;

pub use invoice::{
    CreateInvoice, Customer, InvoiceDocument, InvoiceRecord, LineItem, PricedLine,
};
