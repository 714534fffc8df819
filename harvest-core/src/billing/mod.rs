pub mod numbering;
pub mod tax;
pub mod words;

pub use numbering::{allocate_next, Allocation, Reservations};
pub use tax::{compute_totals, round2, Totals};
pub use words::amount_in_words;
