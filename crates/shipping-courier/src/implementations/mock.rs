//! Simulated courier for development and tests.
//!
//! Orders live in memory. Each operation can be scripted with queued
//! responses or errors that take precedence over the simulated behaviour,
//! and every call is counted.

use crate::{
	CourierError, CourierFactory, CourierInterface, CourierOperation, CourierRegistry,
};
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use shipping_types::{
	ConfigSchema, CourierOrder, CourierOrderRequest, Field, FieldType, ImplementationRegistry,
	Schema, TrackingInfo, ValidationError,
};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

const DEFAULT_PRICE: i64 = 15000;
const DEFAULT_INSURANCE_FEE: i64 = 500;

type Scripted = Result<Value, CourierError>;

#[derive(Default)]
struct MockState {
	next_id: u64,
	orders: HashMap<String, Value>,
	scripts: HashMap<CourierOperation, VecDeque<Scripted>>,
	calls: HashMap<CourierOperation, usize>,
	last_create: Option<CourierOrderRequest>,
	last_cancel_reason: Option<Option<String>>,
	latency: Duration,
}

/// In-memory courier. Clones share state.
#[derive(Clone)]
pub struct MockCourier {
	price: Decimal,
	insurance_fee: Decimal,
	state: Arc<Mutex<MockState>>,
}

impl Default for MockCourier {
	fn default() -> Self {
		Self::new()
	}
}

impl MockCourier {
	pub fn new() -> Self {
		Self::with_pricing(Decimal::from(DEFAULT_PRICE), Decimal::from(DEFAULT_INSURANCE_FEE))
	}

	pub fn with_pricing(price: Decimal, insurance_fee: Decimal) -> Self {
		Self {
			price,
			insurance_fee,
			state: Arc::new(Mutex::new(MockState::default())),
		}
	}

	fn lock(&self) -> MutexGuard<'_, MockState> {
		self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
	}

	/// Queues a raw response body for the next call of `operation`.
	pub fn push_response(&self, operation: CourierOperation, body: Value) {
		self.lock()
			.scripts
			.entry(operation)
			.or_default()
			.push_back(Ok(body));
	}

	pub fn push_error(&self, operation: CourierOperation, error: CourierError) {
		self.lock()
			.scripts
			.entry(operation)
			.or_default()
			.push_back(Err(error));
	}

	pub fn calls(&self, operation: CourierOperation) -> usize {
		self.lock().calls.get(&operation).copied().unwrap_or(0)
	}

	pub fn last_create_request(&self) -> Option<CourierOrderRequest> {
		self.lock().last_create.clone()
	}

	/// Reason sent with the last cancel call; outer `None` if never cancelled.
	pub fn last_cancel_reason(&self) -> Option<Option<String>> {
		self.lock().last_cancel_reason.clone()
	}

	/// Delays every subsequent call by `latency`.
	pub fn set_latency(&self, latency: Duration) {
		self.lock().latency = latency;
	}

	/// Moves a simulated order to a new courier status.
	pub fn set_order_status(&self, external_id: &str, status: &str) -> bool {
		self.modify_order(external_id, |doc| doc["status"] = json!(status))
	}

	/// Edits the stored document of a simulated order.
	pub fn modify_order(&self, external_id: &str, edit: impl FnOnce(&mut Value)) -> bool {
		match self.lock().orders.get_mut(external_id) {
			Some(doc) => {
				edit(doc);
				true
			},
			None => false,
		}
	}

	/// Counts the call and pops a scripted outcome if one is queued.
	fn begin(&self, operation: CourierOperation) -> Option<Scripted> {
		let mut state = self.lock();
		*state.calls.entry(operation).or_default() += 1;
		state.scripts.get_mut(&operation)?.pop_front()
	}

	async fn stall(&self) {
		let latency = self.lock().latency;
		if !latency.is_zero() {
			tokio::time::sleep(latency).await;
		}
	}

	fn find_by(&self, field: &str, value: &str) -> Option<Value> {
		self.lock()
			.orders
			.values()
			.find(|doc| doc["courier"][field].as_str() == Some(value))
			.cloned()
	}

	fn tracking_from(doc: &Value) -> Value {
		let waybill = doc["courier"]["waybill_id"].clone();
		json!({
			"success": true,
			"status": doc["status"].clone(),
			"waybill_id": waybill,
			"link": format!("https://track.mock/{}", waybill.as_str().unwrap_or_default()),
			"history": [
				{ "status": doc["status"].clone(), "note": "Simulated courier update" }
			]
		})
	}

	fn parse_order(operation: CourierOperation, body: Value) -> Result<CourierOrder, CourierError> {
		CourierOrder::from_json(body).map_err(|e| CourierError::malformed(operation, e.to_string()))
	}

	fn parse_tracking(
		operation: CourierOperation,
		body: Value,
	) -> Result<TrackingInfo, CourierError> {
		TrackingInfo::from_json(body).map_err(|e| CourierError::malformed(operation, e.to_string()))
	}

	fn not_found(operation: CourierOperation, what: &str) -> CourierError {
		CourierError::status(operation, 404, format!("API Error (404): {} not found", what))
	}
}

#[async_trait]
impl CourierInterface for MockCourier {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(MockCourierSchema)
	}

	async fn create_order(
		&self,
		request: &CourierOrderRequest,
	) -> Result<CourierOrder, CourierError> {
		let operation = CourierOperation::CreateOrder;
		self.lock().last_create = Some(request.clone());
		self.stall().await;
		if let Some(scripted) = self.begin(operation) {
			return Self::parse_order(operation, scripted?);
		}

		let fee = if request.courier_insurance > Decimal::ZERO {
			self.insurance_fee
		} else {
			Decimal::ZERO
		};
		let doc = {
			let mut state = self.lock();
			state.next_id += 1;
			let n = state.next_id;
			let doc = json!({
				"success": true,
				"id": format!("mock-{}", n),
				"status": "confirmed",
				"price": self.price,
				"courier": {
					"waybill_id": format!("WB{:06}", n),
					"tracking_id": format!("TRK{:06}", n),
					"company": request.courier_company,
					"type": request.courier_type,
					"insurance": { "amount": request.courier_insurance, "fee": fee }
				},
				"metadata": request.metadata,
			});
			state.orders.insert(format!("mock-{}", n), doc.clone());
			doc
		};
		Self::parse_order(operation, doc)
	}

	async fn get_order(&self, external_id: &str) -> Result<CourierOrder, CourierError> {
		let operation = CourierOperation::GetOrder;
		self.stall().await;
		if let Some(scripted) = self.begin(operation) {
			return Self::parse_order(operation, scripted?);
		}
		let doc = self.lock().orders.get(external_id).cloned();
		match doc {
			Some(doc) => Self::parse_order(operation, doc),
			None => Err(Self::not_found(operation, "Order")),
		}
	}

	async fn cancel_order(
		&self,
		external_id: &str,
		reason: Option<&str>,
	) -> Result<CourierOrder, CourierError> {
		let operation = CourierOperation::CancelOrder;
		self.lock().last_cancel_reason = Some(reason.map(str::to_string));
		self.stall().await;
		if let Some(scripted) = self.begin(operation) {
			return Self::parse_order(operation, scripted?);
		}
		let doc = {
			let mut state = self.lock();
			state.orders.get_mut(external_id).map(|doc| {
				doc["status"] = json!("cancelled");
				doc.clone()
			})
		};
		match doc {
			Some(doc) => Self::parse_order(operation, doc),
			None => Err(Self::not_found(operation, "Order")),
		}
	}

	async fn track(&self, tracking_id: &str) -> Result<TrackingInfo, CourierError> {
		let operation = CourierOperation::Track;
		self.stall().await;
		if let Some(scripted) = self.begin(operation) {
			return Self::parse_tracking(operation, scripted?);
		}
		match self.find_by("tracking_id", tracking_id) {
			Some(doc) => Self::parse_tracking(operation, Self::tracking_from(&doc)),
			None => Err(Self::not_found(operation, "Tracking")),
		}
	}

	async fn public_track(
		&self,
		waybill_id: &str,
		courier_code: &str,
	) -> Result<TrackingInfo, CourierError> {
		let operation = CourierOperation::PublicTrack;
		self.stall().await;
		if let Some(scripted) = self.begin(operation) {
			return Self::parse_tracking(operation, scripted?);
		}
		match self.find_by("waybill_id", waybill_id) {
			Some(doc) if doc["courier"]["company"].as_str() == Some(courier_code) => {
				Self::parse_tracking(operation, Self::tracking_from(&doc))
			},
			_ => Err(Self::not_found(operation, "Waybill")),
		}
	}
}

pub struct MockCourierSchema;

impl ConfigSchema for MockCourierSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let amount = |name: &str| {
			Field::new(
				name,
				FieldType::Integer {
					min: Some(0),
					max: None,
				},
			)
		};
		Schema::new(vec![], vec![amount("price"), amount("insurance_fee")]).validate(config)
	}
}

/// Creates a simulated courier.
///
/// Configuration parameters:
/// - `price`: shipping price of every order (default: 15000)
/// - `insurance_fee`: fee charged when insurance is requested (default: 500)
pub fn create_courier(config: &toml::Value) -> Result<Box<dyn CourierInterface>, CourierError> {
	MockCourierSchema
		.validate(config)
		.map_err(|e| CourierError::configuration(e.to_string()))?;

	let amount = |name: &str, default: i64| {
		Decimal::from(
			config
				.get(name)
				.and_then(|v| v.as_integer())
				.unwrap_or(default),
		)
	};
	Ok(Box::new(MockCourier::with_pricing(
		amount("price", DEFAULT_PRICE),
		amount("insurance_fee", DEFAULT_INSURANCE_FEE),
	)))
}

pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "mock";
	type Factory = CourierFactory;

	fn factory() -> Self::Factory {
		create_courier
	}
}

impl CourierRegistry for Registry {}
