//! Courier gateway for the shipping order service.
//!
//! The gateway is the only component that talks to the courier aggregator.
//! Implementations translate the five remote operations into their own
//! transport; [`CourierService`] adds bounded retries for the read-only ones.

use async_trait::async_trait;
use backoff::ExponentialBackoffBuilder;
use shipping_types::{
	ConfigSchema, CourierOrder, CourierOrderRequest, ImplementationRegistry, TrackingInfo,
};
use std::fmt;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

pub mod implementations {
	pub mod biteship;
	pub mod mock;
}

/// Remote operation a gateway error belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CourierOperation {
	Configure,
	CreateOrder,
	GetOrder,
	CancelOrder,
	Track,
	PublicTrack,
}

impl fmt::Display for CourierOperation {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let name = match self {
			CourierOperation::Configure => "configure",
			CourierOperation::CreateOrder => "create order",
			CourierOperation::GetOrder => "get order",
			CourierOperation::CancelOrder => "cancel order",
			CourierOperation::Track => "track",
			CourierOperation::PublicTrack => "public track",
		};
		f.write_str(name)
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
	/// The courier answered with a non-success status.
	Status,
	/// The request never produced a response.
	Transport,
	Timeout,
	/// The response could not be understood.
	Malformed,
	Configuration,
}

/// Failure of a gateway call.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("Failed to {operation}: {message}")]
pub struct CourierError {
	pub operation: CourierOperation,
	pub kind: FailureKind,
	pub http_status: Option<u16>,
	pub message: String,
}

impl CourierError {
	pub fn status(operation: CourierOperation, status: u16, message: impl Into<String>) -> Self {
		Self {
			operation,
			kind: FailureKind::Status,
			http_status: Some(status),
			message: message.into(),
		}
	}

	pub fn transport(operation: CourierOperation, message: impl Into<String>) -> Self {
		Self {
			operation,
			kind: FailureKind::Transport,
			http_status: None,
			message: message.into(),
		}
	}

	pub fn timeout(operation: CourierOperation, message: impl Into<String>) -> Self {
		Self {
			operation,
			kind: FailureKind::Timeout,
			http_status: None,
			message: message.into(),
		}
	}

	pub fn malformed(operation: CourierOperation, message: impl Into<String>) -> Self {
		Self {
			operation,
			kind: FailureKind::Malformed,
			http_status: None,
			message: message.into(),
		}
	}

	pub fn configuration(message: impl Into<String>) -> Self {
		Self {
			operation: CourierOperation::Configure,
			kind: FailureKind::Configuration,
			http_status: None,
			message: message.into(),
		}
	}

	/// Transport failures, timeouts, throttling and 5xx are worth retrying.
	pub fn is_retryable(&self) -> bool {
		match self.kind {
			FailureKind::Transport | FailureKind::Timeout => true,
			FailureKind::Status => self
				.http_status
				.is_some_and(|status| status == 429 || status >= 500),
			FailureKind::Malformed | FailureKind::Configuration => false,
		}
	}
}

/// Operations of the courier aggregator.
#[async_trait]
pub trait CourierInterface: Send + Sync {
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	/// Submits a shipment. The response must carry the courier's order id.
	async fn create_order(&self, request: &CourierOrderRequest)
		-> Result<CourierOrder, CourierError>;

	async fn get_order(&self, external_id: &str) -> Result<CourierOrder, CourierError>;

	/// Cancels a shipment; the reason is only sent when present.
	async fn cancel_order(
		&self,
		external_id: &str,
		reason: Option<&str>,
	) -> Result<CourierOrder, CourierError>;

	async fn track(&self, tracking_id: &str) -> Result<TrackingInfo, CourierError>;

	async fn public_track(
		&self,
		waybill_id: &str,
		courier_code: &str,
	) -> Result<TrackingInfo, CourierError>;
}

pub type CourierFactory = fn(&toml::Value) -> Result<Box<dyn CourierInterface>, CourierError>;

pub trait CourierRegistry: ImplementationRegistry<Factory = CourierFactory> {}

pub fn get_all_implementations() -> Vec<(&'static str, CourierFactory)> {
	use implementations::{biteship, mock};

	vec![
		(biteship::Registry::NAME, biteship::Registry::factory()),
		(mock::Registry::NAME, mock::Registry::factory()),
	]
}

/// Retry settings for read-only gateway calls.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
	/// Attempts after the first one.
	pub max_retries: u32,
	pub initial_interval: Duration,
}

impl Default for RetryPolicy {
	fn default() -> Self {
		Self {
			max_retries: 3,
			initial_interval: Duration::from_millis(200),
		}
	}
}

/// Front of the configured courier implementation.
///
/// `get_order`, `track` and `public_track` are retried with exponential
/// backoff on retryable failures. `create_order` and `cancel_order` are not
/// idempotent remotely and run exactly once.
pub struct CourierService {
	implementation: Box<dyn CourierInterface>,
	retry: RetryPolicy,
}

impl CourierService {
	pub fn new(implementation: Box<dyn CourierInterface>, retry: RetryPolicy) -> Self {
		Self {
			implementation,
			retry,
		}
	}

	pub async fn create_order(
		&self,
		request: &CourierOrderRequest,
	) -> Result<CourierOrder, CourierError> {
		self.implementation.create_order(request).await
	}

	pub async fn get_order(&self, external_id: &str) -> Result<CourierOrder, CourierError> {
		self.with_retry(CourierOperation::GetOrder, || {
			self.implementation.get_order(external_id)
		})
		.await
	}

	pub async fn cancel_order(
		&self,
		external_id: &str,
		reason: Option<&str>,
	) -> Result<CourierOrder, CourierError> {
		self.implementation.cancel_order(external_id, reason).await
	}

	pub async fn track(&self, tracking_id: &str) -> Result<TrackingInfo, CourierError> {
		self.with_retry(CourierOperation::Track, || self.implementation.track(tracking_id))
			.await
	}

	pub async fn public_track(
		&self,
		waybill_id: &str,
		courier_code: &str,
	) -> Result<TrackingInfo, CourierError> {
		self.with_retry(CourierOperation::PublicTrack, || {
			self.implementation.public_track(waybill_id, courier_code)
		})
		.await
	}

	async fn with_retry<T, F, Fut>(
		&self,
		operation: CourierOperation,
		call: F,
	) -> Result<T, CourierError>
	where
		F: Fn() -> Fut,
		Fut: Future<Output = Result<T, CourierError>>,
	{
		let policy = ExponentialBackoffBuilder::new()
			.with_initial_interval(self.retry.initial_interval)
			.with_max_elapsed_time(None)
			.build();
		let max_retries = self.retry.max_retries;
		let mut attempt = 0u32;

		backoff::future::retry(policy, || {
			attempt += 1;
			let current = attempt;
			let pending = call();
			async move {
				match pending.await {
					Ok(value) => Ok(value),
					Err(e) if e.is_retryable() && current <= max_retries => {
						tracing::warn!(
							%operation,
							attempt = current,
							error = %e,
							"Courier call failed, retrying"
						);
						Err(backoff::Error::transient(e))
					},
					Err(e) => Err(backoff::Error::permanent(e)),
				}
			}
		})
		.await
	}
}
