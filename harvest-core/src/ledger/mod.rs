pub mod lock;
pub mod schema;
pub mod store;

pub use lock::{LedgerGuard, LedgerLock};
pub use schema::Column;
pub use store::{LedgerStore, UpsertOutcome};
