//! Order lifecycle engine.
//!
//! The engine is the only component that mutates orders. Every operation
//! takes the acting user explicitly, loads the order, talks to the courier
//! where needed and commits the result with a single versioned write.

pub mod lifecycle;
pub(crate) mod merge;
mod orders;
mod queries;

use crate::state::{ConfirmationJournal, OrderStore, OrderStoreError};
use chrono::Utc;
use shipping_config::Config;
use shipping_courier::{CourierError, CourierService};
use shipping_storage::{StorageError, StorageService};
use shipping_types::{Actor, Order, OrderStatus};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub use merge::build_courier_request;

/// Errors returned by engine operations.
///
/// Each variant is a distinct kind the HTTP boundary maps to its own status
/// code.
#[derive(Debug, Error)]
pub enum EngineError {
	#[error("Validation failed: {0}")]
	Validation(#[from] validator::ValidationErrors),
	/// The order's current state does not allow the operation, or it was
	/// modified concurrently.
	#[error("{message}")]
	Conflict {
		status: Option<OrderStatus>,
		message: String,
	},
	#[error("{0}")]
	Precondition(String),
	#[error(transparent)]
	Gateway(#[from] CourierError),
	#[error("Storage error: {0}")]
	Storage(String),
	#[error("Order {0} not found")]
	NotFound(u64),
	#[error("Not allowed to access order {0}")]
	Forbidden(u64),
}

impl EngineError {
	fn state_conflict(status: OrderStatus, message: impl Into<String>) -> Self {
		EngineError::Conflict {
			status: Some(status),
			message: message.into(),
		}
	}
}

impl From<OrderStoreError> for EngineError {
	fn from(err: OrderStoreError) -> Self {
		match err {
			OrderStoreError::NotFound(id) => EngineError::NotFound(id),
			OrderStoreError::Conflict { id, .. } => EngineError::Conflict {
				status: None,
				message: format!("Order {} was modified concurrently", id),
			},
			other => EngineError::Storage(other.to_string()),
		}
	}
}

impl From<StorageError> for EngineError {
	fn from(err: StorageError) -> Self {
		EngineError::Storage(err.to_string())
	}
}

/// Tunables of the engine.
#[derive(Debug, Clone)]
pub struct EngineSettings {
	/// Sent to the courier as the shipper organization.
	pub organization: String,
	/// Re-reads after a lost version race, for refresh and track.
	pub max_conflict_retries: u32,
	pub reconcile_interval: Duration,
}

impl Default for EngineSettings {
	fn default() -> Self {
		Self {
			organization: "Shipping Service".to_string(),
			max_conflict_retries: 3,
			reconcile_interval: Duration::from_secs(300),
		}
	}
}

impl EngineSettings {
	pub fn from_config(config: &Config) -> Self {
		Self {
			organization: config.service.organization.clone(),
			max_conflict_retries: config.engine.max_conflict_retries,
			reconcile_interval: Duration::from_secs(config.engine.reconcile_interval_seconds),
		}
	}
}

/// Outcome of one optimistic attempt.
pub(crate) enum Attempt<T> {
	Done(T),
	/// The stored version moved between read and commit.
	Raced,
}

/// Shipment order lifecycle engine.
#[derive(Clone)]
pub struct OrderEngine {
	pub(crate) store: Arc<OrderStore>,
	pub(crate) journal: Arc<ConfirmationJournal>,
	pub(crate) courier: Arc<CourierService>,
	pub(crate) settings: EngineSettings,
}

impl fmt::Debug for OrderEngine {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("OrderEngine")
			.field("settings", &self.settings)
			.finish_non_exhaustive()
	}
}

impl OrderEngine {
	pub fn new(
		storage: Arc<StorageService>,
		courier: Arc<CourierService>,
		settings: EngineSettings,
	) -> Self {
		Self {
			store: Arc::new(OrderStore::new(storage.clone())),
			journal: Arc::new(ConfirmationJournal::new(storage)),
			courier,
			settings,
		}
	}

	pub fn settings(&self) -> &EngineSettings {
		&self.settings
	}

	/// Runs startup recovery, then the periodic reconciliation sweep until
	/// ctrl-c.
	pub async fn run(&self) -> Result<(), EngineError> {
		self.initialize().await?;

		let engine = self.clone();
		let sweep_handle = tokio::spawn(async move {
			let mut interval = tokio::time::interval(engine.settings.reconcile_interval);
			// The first tick completes immediately; recovery already ran.
			interval.tick().await;
			loop {
				interval.tick().await;
				match engine.refresh_active_orders().await {
					Ok(report) if report.examined > 0 => {
						tracing::info!(
							examined = report.examined,
							updated = report.updated,
							failed = report.failed,
							"Reconciliation sweep finished"
						);
					},
					Err(e) => {
						tracing::warn!("Reconciliation sweep failed: {}", e);
					},
					_ => {},
				}
			}
		});

		if let Err(e) = tokio::signal::ctrl_c().await {
			tracing::error!("Failed to listen for shutdown signal: {}", e);
		}

		sweep_handle.abort();
		self.shutdown().await
	}

	/// Loads an order and checks the actor may operate on it.
	pub(crate) async fn load_for(&self, actor: &Actor, id: u64) -> Result<Order, EngineError> {
		let order = self.store.get(id).await?;
		if !actor.can_access(&order) {
			tracing::warn!(order_id = id, user_id = actor.user_id, "Access denied");
			return Err(EngineError::Forbidden(id));
		}
		Ok(order)
	}

	/// Commits `order` over `expected_version`, turning a lost race into
	/// [`Attempt::Raced`].
	pub(crate) async fn try_commit(
		&self,
		order: Order,
		expected_version: u64,
	) -> Result<Attempt<Order>, EngineError> {
		match self.store.commit(order, expected_version, Utc::now()).await {
			Ok(committed) => Ok(Attempt::Done(committed)),
			Err(OrderStoreError::Conflict { .. }) => Ok(Attempt::Raced),
			Err(e) => Err(e.into()),
		}
	}

	/// Repeats `attempt` while it loses version races, at most
	/// `max_conflict_retries` times after the first try.
	pub(crate) async fn with_conflict_retry<T, F, Fut>(
		&self,
		id: u64,
		mut attempt: F,
	) -> Result<T, EngineError>
	where
		F: FnMut() -> Fut,
		Fut: Future<Output = Result<Attempt<T>, EngineError>>,
	{
		let retries = self.settings.max_conflict_retries;
		for round in 0..=retries {
			match attempt().await? {
				Attempt::Done(value) => return Ok(value),
				Attempt::Raced => {
					tracing::debug!(order_id = id, attempt = round + 1, "Order changed concurrently");
				},
			}
		}
		Err(EngineError::Conflict {
			status: None,
			message: format!(
				"Order {} was modified concurrently {} times, giving up",
				id,
				retries + 1
			),
		})
	}
}
