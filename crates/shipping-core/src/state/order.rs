//! Versioned order repository.
//!
//! Every write after the initial insert goes through [`OrderStore::commit`],
//! which only succeeds if the stored version still matches the version the
//! caller read. That single compare-and-swap is the transaction boundary of
//! each lifecycle operation.

use chrono::{DateTime, NaiveDate, Utc};
use shipping_storage::{StorageError, StorageService};
use shipping_types::{generate_order_number, Order, StorageKey};
use std::sync::Arc;
use thiserror::Error;

const ORDER_SEQUENCE: &str = "orders";
const MAX_NUMBER_ATTEMPTS: usize = 20;

#[derive(Debug, Error)]
pub enum OrderStoreError {
	#[error("Storage error: {0}")]
	Storage(String),
	#[error("Order {0} not found")]
	NotFound(u64),
	#[error("Order {id} was modified concurrently (expected version {expected})")]
	Conflict { id: u64, expected: u64 },
	#[error("Could not allocate a unique order number after {0} attempts")]
	NumbersExhausted(usize),
}

impl From<StorageError> for OrderStoreError {
	fn from(err: StorageError) -> Self {
		OrderStoreError::Storage(err.to_string())
	}
}

pub struct OrderStore {
	storage: Arc<StorageService>,
}

impl OrderStore {
	pub fn new(storage: Arc<StorageService>) -> Self {
		Self { storage }
	}

	/// Hands out the next numeric order id.
	pub async fn next_id(&self) -> Result<u64, OrderStoreError> {
		Ok(self
			.storage
			.modify(StorageKey::Sequences, ORDER_SEQUENCE, |current: Option<u64>| {
				current.unwrap_or(0) + 1
			})
			.await?)
	}

	/// Claims `number` for order `id`. Returns false if it is already taken.
	pub async fn reserve_order_number(&self, number: &str, id: u64) -> Result<bool, OrderStoreError> {
		Ok(self
			.storage
			.insert_if_absent(StorageKey::OrderNumbers, number, &id)
			.await?)
	}

	pub async fn release_order_number(&self, number: &str) -> Result<(), OrderStoreError> {
		Ok(self.storage.remove(StorageKey::OrderNumbers, number).await?)
	}

	/// Generates and reserves a fresh order number for the given day.
	pub async fn allocate_order_number(
		&self,
		date: NaiveDate,
		id: u64,
	) -> Result<String, OrderStoreError> {
		for _ in 0..MAX_NUMBER_ATTEMPTS {
			let number = generate_order_number(date);
			if self.reserve_order_number(&number, id).await? {
				return Ok(number);
			}
			tracing::debug!(%number, "Order number taken, regenerating");
		}
		Err(OrderStoreError::NumbersExhausted(MAX_NUMBER_ATTEMPTS))
	}

	/// Stores a new order at version 1.
	pub async fn insert(&self, mut order: Order) -> Result<Order, OrderStoreError> {
		order.version = 1;
		let inserted = self
			.storage
			.insert_if_absent(StorageKey::Orders, &order.id.to_string(), &order)
			.await?;
		if !inserted {
			return Err(OrderStoreError::Conflict {
				id: order.id,
				expected: 0,
			});
		}
		Ok(order)
	}

	pub async fn get(&self, id: u64) -> Result<Order, OrderStoreError> {
		self.storage
			.find(StorageKey::Orders, &id.to_string())
			.await?
			.ok_or(OrderStoreError::NotFound(id))
	}

	pub async fn find(&self, id: u64) -> Result<Option<Order>, OrderStoreError> {
		Ok(self.storage.find(StorageKey::Orders, &id.to_string()).await?)
	}

	/// All orders, newest first.
	pub async fn list(&self) -> Result<Vec<Order>, OrderStoreError> {
		let mut orders: Vec<Order> = self
			.storage
			.retrieve_all(StorageKey::Orders)
			.await?
			.into_iter()
			.map(|(_, order)| order)
			.collect();
		orders.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
		Ok(orders)
	}

	/// Writes `order` if the stored copy is still at `expected_version`.
	///
	/// The committed order carries `expected_version + 1` and `updated_at = now`.
	pub async fn commit(
		&self,
		mut order: Order,
		expected_version: u64,
		now: DateTime<Utc>,
	) -> Result<Order, OrderStoreError> {
		order.version = expected_version + 1;
		order.updated_at = now;
		let id = order.id;
		let written = self
			.storage
			.update_if(StorageKey::Orders, &id.to_string(), &order, |stored: &Order| {
				stored.version == expected_version
			})
			.await
			.map_err(|e| match e {
				StorageError::NotFound => OrderStoreError::NotFound(id),
				other => other.into(),
			})?;
		if !written {
			return Err(OrderStoreError::Conflict {
				id,
				expected: expected_version,
			});
		}
		Ok(order)
	}
}
