//! Persistence of orders and of in-flight courier confirmations.

pub mod journal;
pub mod order;

pub use journal::{ConfirmationEntry, ConfirmationJournal};
pub use order::{OrderStore, OrderStoreError};
