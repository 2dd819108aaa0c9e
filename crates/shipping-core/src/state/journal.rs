//! Journal of courier confirmations.
//!
//! An entry is written before an order is submitted to the courier and removed
//! once the resulting linkage is committed locally. There is at most one entry
//! per order, so holding it is the right to call the courier's create. An entry that survives a
//! restart therefore marks a confirmation whose outcome was not recorded; if
//! the courier's answer was received it is stored in the entry so that the
//! linkage can be replayed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use shipping_storage::{StorageError, StorageService};
use shipping_types::StorageKey;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfirmationEntry {
	pub key: String,
	pub order_id: u64,
	pub order_number: String,
	pub started_at: DateTime<Utc>,
	/// Raw courier response, once one was received.
	#[serde(default)]
	pub response: Option<Value>,
}

impl ConfirmationEntry {
	pub fn started(order_id: u64, order_number: &str, now: DateTime<Utc>) -> Self {
		Self {
			key: order_id.to_string(),
			order_id,
			order_number: order_number.to_string(),
			started_at: now,
			response: None,
		}
	}
}

pub struct ConfirmationJournal {
	storage: Arc<StorageService>,
}

impl ConfirmationJournal {
	pub fn new(storage: Arc<StorageService>) -> Self {
		Self { storage }
	}

	/// Writes the entry unless one already exists for the order.
	///
	/// Returns `false` when another confirmation holds the order.
	pub async fn claim(&self, entry: &ConfirmationEntry) -> Result<bool, StorageError> {
		self.storage
			.insert_if_absent(StorageKey::Confirmations, &entry.key, entry)
			.await
	}

	pub async fn record(&self, entry: &ConfirmationEntry) -> Result<(), StorageError> {
		self.storage
			.store(StorageKey::Confirmations, &entry.key, entry)
			.await
	}

	pub async fn clear(&self, entry: &ConfirmationEntry) -> Result<(), StorageError> {
		self.storage
			.remove(StorageKey::Confirmations, &entry.key)
			.await
	}

	/// Oldest first.
	pub async fn entries(&self) -> Result<Vec<ConfirmationEntry>, StorageError> {
		let mut entries: Vec<ConfirmationEntry> = self
			.storage
			.retrieve_all(StorageKey::Confirmations)
			.await?
			.into_iter()
			.map(|(_, entry)| entry)
			.collect();
		entries.sort_by_key(|entry| entry.started_at);
		Ok(entries)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use shipping_storage::implementations::memory::MemoryStorage;

	fn journal() -> ConfirmationJournal {
		ConfirmationJournal::new(Arc::new(StorageService::new(Box::new(MemoryStorage::new()))))
	}

	#[tokio::test]
	async fn test_claim_is_exclusive_per_order() {
		let journal = journal();
		let first = ConfirmationEntry::started(4, "ORD-20250711-0004", Utc::now());
		let second = ConfirmationEntry::started(4, "ORD-20250711-0004", Utc::now());
		let other = ConfirmationEntry::started(5, "ORD-20250711-0005", Utc::now());

		assert!(journal.claim(&first).await.unwrap());
		assert!(!journal.claim(&second).await.unwrap());
		assert!(journal.claim(&other).await.unwrap());

		journal.clear(&first).await.unwrap();
		assert!(journal.claim(&second).await.unwrap());
		assert_eq!(journal.entries().await.unwrap().len(), 2);
	}
}
