//! Order entity and related types.
//!
//! An order is created locally in the `pending` state, linked to the courier
//! aggregator on confirmation, and then mutated by status reconciliation
//! until it reaches a terminal state.

use crate::status::OrderStatus;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use uuid::Uuid;
use validator::{Validate, ValidationError as FieldError};

/// Largest monetary amount accepted at the boundary.
fn max_amount() -> Decimal {
	Decimal::new(99_999_999_999, 2)
}

/// The user on whose behalf an engine operation runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
	pub user_id: u64,
	/// Contact email forwarded to the courier as the shipper email.
	#[serde(default)]
	pub email: Option<String>,
	#[serde(default)]
	pub is_admin: bool,
}

impl Actor {
	pub fn user(user_id: u64) -> Self {
		Self {
			user_id,
			email: None,
			is_admin: false,
		}
	}

	pub fn admin(user_id: u64) -> Self {
		Self {
			user_id,
			email: None,
			is_admin: true,
		}
	}

	pub fn with_email(mut self, email: impl Into<String>) -> Self {
		self.email = Some(email.into());
		self
	}

	/// Owners may operate on their own orders, admins on any order.
	pub fn can_access(&self, order: &Order) -> bool {
		self.is_admin || order.user_id == self.user_id
	}
}

/// Contact and address of one side of the shipment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContactAddress {
	pub name: String,
	pub phone: String,
	pub address: String,
	pub postal_code: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub area_id: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub latitude: Option<f64>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub longitude: Option<f64>,
}

impl ContactAddress {
	/// Returns the coordinate pair only when both halves are known.
	pub fn coordinates(&self) -> Option<(f64, f64)> {
		match (self.latitude, self.longitude) {
			(Some(lat), Some(lng)) => Some((lat, lng)),
			_ => None,
		}
	}

	pub fn full_address(&self) -> String {
		format!("{}, {}", self.address, self.postal_code)
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PackageType {
	#[default]
	Package,
	Document,
}

/// Physical attributes of the shipped package.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageDetails {
	pub package_type: PackageType,
	/// Weight in grams.
	pub weight: u32,
	/// Dimensions in centimetres.
	pub length: Option<u32>,
	pub width: Option<u32>,
	pub height: Option<u32>,
	pub description: Option<String>,
	/// Declared value of the goods.
	pub value: Option<Decimal>,
}

/// A shipment order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
	pub id: u64,
	/// Human facing number, `ORD-YYYYMMDD-NNNN`.
	pub order_number: String,
	pub user_id: u64,
	#[serde(default)]
	pub owner_email: Option<String>,
	pub status: OrderStatus,
	/// Identifier assigned by the courier aggregator on confirmation.
	pub external_order_id: Option<String>,
	pub waybill_id: Option<String>,
	pub tracking_id: Option<String>,
	pub courier_code: String,
	pub courier_service: String,
	pub sender: ContactAddress,
	pub receiver: ContactAddress,
	pub package: PackageDetails,
	/// Amount to insure, forwarded to the courier.
	pub insured_amount: Decimal,
	pub shipping_cost: Decimal,
	pub insurance_cost: Decimal,
	pub total_cost: Decimal,
	pub notes: Option<String>,
	/// Last payload received from the courier, kept verbatim.
	pub courier_response: Option<serde_json::Value>,
	pub scheduled_at: Option<DateTime<Utc>>,
	pub delivered_at: Option<DateTime<Utc>>,
	pub created_at: DateTime<Utc>,
	pub updated_at: DateTime<Utc>,
	/// Bumped on every committed write; used for optimistic concurrency.
	pub version: u64,
}

impl Order {
	/// Builds a new local-only order in the `pending` state with zero costs.
	pub fn new_pending(
		id: u64,
		order_number: String,
		actor: &Actor,
		request: &OrderRequest,
		now: DateTime<Utc>,
	) -> Self {
		Self {
			id,
			order_number,
			user_id: actor.user_id,
			owner_email: actor.email.clone(),
			status: OrderStatus::Pending,
			external_order_id: None,
			waybill_id: None,
			tracking_id: None,
			courier_code: request.courier_code.clone(),
			courier_service: request.courier_service.clone(),
			sender: ContactAddress {
				name: request.sender_name.clone(),
				phone: request.sender_phone.clone(),
				address: request.sender_address.clone(),
				postal_code: request.sender_postal_code.clone(),
				area_id: request.sender_area_id.clone(),
				latitude: request.sender_latitude,
				longitude: request.sender_longitude,
			},
			receiver: ContactAddress {
				name: request.receiver_name.clone(),
				phone: request.receiver_phone.clone(),
				address: request.receiver_address.clone(),
				postal_code: request.receiver_postal_code.clone(),
				area_id: request.receiver_area_id.clone(),
				latitude: request.receiver_latitude,
				longitude: request.receiver_longitude,
			},
			package: PackageDetails {
				package_type: request.package_type,
				weight: request.package_weight,
				length: request.package_length,
				width: request.package_width,
				height: request.package_height,
				description: request.package_description.clone(),
				value: request.package_value,
			},
			insured_amount: request.insurance_amount.unwrap_or(Decimal::ZERO),
			shipping_cost: Decimal::ZERO,
			insurance_cost: Decimal::ZERO,
			total_cost: Decimal::ZERO,
			notes: request.notes.clone(),
			courier_response: None,
			scheduled_at: request.scheduled_at,
			delivered_at: None,
			created_at: now,
			updated_at: now,
			version: 0,
		}
	}

	/// Sets both cost components and recomputes the total.
	pub fn set_costs(&mut self, shipping: Decimal, insurance: Decimal) {
		self.shipping_cost = shipping;
		self.insurance_cost = insurance;
		self.total_cost = shipping + insurance;
	}

	pub fn has_external_order(&self) -> bool {
		self.external_order_id
			.as_deref()
			.is_some_and(|id| !id.is_empty())
	}

	pub fn can_be_cancelled(&self) -> bool {
		self.status.is_cancellable()
	}

	/// An order can be tracked once it has a waybill and is still moving.
	pub fn is_trackable(&self) -> bool {
		let has_waybill = self
			.waybill_id
			.as_deref()
			.is_some_and(|w| !w.trim().is_empty());
		has_waybill && self.status.is_active()
	}

	/// Appends a paragraph to the notes, keeping what was there.
	pub fn append_note(&mut self, note: &str) {
		self.notes = Some(match self.notes.take() {
			Some(existing) if !existing.is_empty() => format!("{}\n\n{}", existing, note),
			_ => note.to_string(),
		});
	}

	/// Records the delivery time once. Returns true when it was set by this call.
	pub fn mark_delivered(&mut self, now: DateTime<Utc>) -> bool {
		if self.delivered_at.is_some() {
			return false;
		}
		self.delivered_at = Some(now);
		true
	}

	pub fn full_sender_address(&self) -> String {
		self.sender.full_address()
	}

	pub fn full_receiver_address(&self) -> String {
		self.receiver.full_address()
	}
}

/// Generates an order number for the given day with a random 4 digit suffix.
pub fn generate_order_number(date: NaiveDate) -> String {
	let suffix = (Uuid::new_v4().as_u128() % 9999) as u16 + 1;
	format!("ORD-{}-{:04}", date.format("%Y%m%d"), suffix)
}

/// Checks the `ORD-<8 digit date>-<4 digit suffix>` format.
pub fn is_valid_order_number(value: &str) -> bool {
	let mut parts = value.split('-');
	let (Some(prefix), Some(date), Some(suffix), None) =
		(parts.next(), parts.next(), parts.next(), parts.next())
	else {
		return false;
	};
	prefix == "ORD"
		&& date.len() == 8
		&& NaiveDate::parse_from_str(date, "%Y%m%d").is_ok()
		&& suffix.len() == 4
		&& suffix.bytes().all(|b| b.is_ascii_digit())
}

/// Order creation request as accepted at the boundary.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[validate(schema(function = "validate_amounts"))]
pub struct OrderRequest {
	#[validate(length(min = 1, max = 255))]
	pub sender_name: String,
	#[validate(length(min = 1, max = 20))]
	pub sender_phone: String,
	#[validate(length(min = 1, max = 500))]
	pub sender_address: String,
	#[validate(length(min = 1, max = 10))]
	pub sender_postal_code: String,
	#[validate(length(max = 50))]
	pub sender_area_id: Option<String>,
	#[validate(range(min = -90.0, max = 90.0))]
	pub sender_latitude: Option<f64>,
	#[validate(range(min = -180.0, max = 180.0))]
	pub sender_longitude: Option<f64>,

	#[validate(length(min = 1, max = 255))]
	pub receiver_name: String,
	#[validate(length(min = 1, max = 20))]
	pub receiver_phone: String,
	#[validate(length(min = 1, max = 500))]
	pub receiver_address: String,
	#[validate(length(min = 1, max = 10))]
	pub receiver_postal_code: String,
	#[validate(length(max = 50))]
	pub receiver_area_id: Option<String>,
	#[validate(range(min = -90.0, max = 90.0))]
	pub receiver_latitude: Option<f64>,
	#[validate(range(min = -180.0, max = 180.0))]
	pub receiver_longitude: Option<f64>,

	#[serde(default)]
	pub package_type: PackageType,
	#[validate(range(min = 1, max = 50000))]
	pub package_weight: u32,
	#[validate(range(min = 1, max = 200))]
	pub package_length: Option<u32>,
	#[validate(range(min = 1, max = 200))]
	pub package_width: Option<u32>,
	#[validate(range(min = 1, max = 200))]
	pub package_height: Option<u32>,
	#[validate(length(max = 500))]
	pub package_description: Option<String>,
	pub package_value: Option<Decimal>,

	#[validate(length(min = 1, max = 50))]
	pub courier_code: String,
	#[validate(length(min = 1, max = 100))]
	pub courier_service: String,
	pub insurance_amount: Option<Decimal>,

	#[validate(length(max = 1000))]
	pub notes: Option<String>,
	#[serde(default)]
	pub scheduled_at: Option<DateTime<Utc>>,
	/// Submit the order to the courier as part of creation.
	#[serde(default)]
	pub auto_confirm: bool,
}

fn validate_amounts(request: &OrderRequest) -> Result<(), FieldError> {
	let amounts = [
		("package_value", request.package_value),
		("insurance_amount", request.insurance_amount),
	];
	for (field, amount) in amounts {
		if let Some(amount) = amount {
			if amount.is_sign_negative() || amount > max_amount() {
				let mut err = FieldError::new("amount_out_of_range");
				err.message = Some(Cow::from(format!(
					"{} must be between 0 and {}",
					field,
					max_amount()
				)));
				return Err(err);
			}
		}
	}
	Ok(())
}

/// Aggregated order counters for a dashboard.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrderStatistics {
	pub total_orders: u64,
	pub pending_orders: u64,
	pub active_orders: u64,
	pub completed_orders: u64,
	pub cancelled_orders: u64,
	pub total_shipping_cost: Decimal,
}

impl OrderStatistics {
	/// Folds one order into the counters.
	pub fn record(&mut self, order: &Order) {
		self.total_orders += 1;
		if order.status == OrderStatus::Pending {
			self.pending_orders += 1;
		}
		if order.status.is_active() {
			self.active_orders += 1;
		}
		if order.status.is_completed() {
			self.completed_orders += 1;
		}
		if order.status.is_cancelled() {
			self.cancelled_orders += 1;
		}
		self.total_shipping_cost += order.total_cost;
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn dec(value: &str) -> Decimal {
		value.parse().unwrap()
	}

	fn sample_request() -> OrderRequest {
		OrderRequest {
			sender_name: "Budi".into(),
			sender_phone: "08123456789".into(),
			sender_address: "Jl. Sudirman 1".into(),
			sender_postal_code: "12190".into(),
			sender_area_id: None,
			sender_latitude: None,
			sender_longitude: None,
			receiver_name: "Sari".into(),
			receiver_phone: "08987654321".into(),
			receiver_address: "Jl. Thamrin 2".into(),
			receiver_postal_code: "10350".into(),
			receiver_area_id: None,
			receiver_latitude: None,
			receiver_longitude: None,
			package_type: PackageType::Package,
			package_weight: 1000,
			package_length: None,
			package_width: None,
			package_height: None,
			package_description: None,
			package_value: None,
			courier_code: "jne".into(),
			courier_service: "reg".into(),
			insurance_amount: None,
			notes: None,
			scheduled_at: None,
			auto_confirm: false,
		}
	}

	#[test]
	fn test_new_pending_has_zero_costs_and_no_linkage() {
		let order = Order::new_pending(
			1,
			"ORD-20250711-0001".into(),
			&Actor::user(7),
			&sample_request(),
			Utc::now(),
		);
		assert_eq!(order.status, OrderStatus::Pending);
		assert_eq!(order.total_cost, Decimal::ZERO);
		assert!(!order.has_external_order());
		assert!(order.waybill_id.is_none());
		assert!(order.tracking_id.is_none());
		assert_eq!(order.user_id, 7);
	}

	#[test]
	fn test_set_costs_recomputes_total() {
		let mut order = Order::new_pending(
			1,
			"ORD-20250711-0001".into(),
			&Actor::user(7),
			&sample_request(),
			Utc::now(),
		);
		order.set_costs(dec("15000"), dec("500"));
		assert_eq!(order.total_cost, dec("15500"));
		order.set_costs(dec("12000.50"), order.insurance_cost);
		assert_eq!(order.total_cost, dec("12500.50"));
	}

	#[test]
	fn test_append_note_preserves_existing() {
		let mut request = sample_request();
		request.notes = Some("Fragile".into());
		let mut order =
			Order::new_pending(1, "ORD-20250711-0001".into(), &Actor::user(7), &request, Utc::now());
		order.append_note("Cancelled: No reason provided");
		assert_eq!(
			order.notes.as_deref(),
			Some("Fragile\n\nCancelled: No reason provided")
		);

		order.notes = None;
		order.append_note("Cancelled: wrong address");
		assert_eq!(order.notes.as_deref(), Some("Cancelled: wrong address"));
	}

	#[test]
	fn test_mark_delivered_only_once() {
		let mut order = Order::new_pending(
			1,
			"ORD-20250711-0001".into(),
			&Actor::user(7),
			&sample_request(),
			Utc::now(),
		);
		let first = Utc::now();
		assert!(order.mark_delivered(first));
		assert!(!order.mark_delivered(first + chrono::Duration::hours(1)));
		assert_eq!(order.delivered_at, Some(first));
	}

	#[test]
	fn test_trackable_requires_waybill_and_active_status() {
		let mut order = Order::new_pending(
			1,
			"ORD-20250711-0001".into(),
			&Actor::user(7),
			&sample_request(),
			Utc::now(),
		);
		assert!(!order.is_trackable());
		order.waybill_id = Some("  ".into());
		assert!(!order.is_trackable());
		order.waybill_id = Some("WB123".into());
		order.status = OrderStatus::PickingUp;
		assert!(order.is_trackable());
		order.status = OrderStatus::Delivered;
		assert!(!order.is_trackable());
	}

	#[test]
	fn test_coordinates_need_both_halves() {
		let mut request = sample_request();
		request.sender_latitude = Some(-6.2);
		let order =
			Order::new_pending(1, "ORD-20250711-0001".into(), &Actor::user(7), &request, Utc::now());
		assert_eq!(order.sender.coordinates(), None);
		assert_eq!(order.full_sender_address(), "Jl. Sudirman 1, 12190");
	}

	#[test]
	fn test_order_number_format() {
		let date = NaiveDate::from_ymd_opt(2025, 7, 11).unwrap();
		for _ in 0..50 {
			let number = generate_order_number(date);
			assert!(number.starts_with("ORD-20250711-"));
			assert!(is_valid_order_number(&number), "bad number {}", number);
			assert_ne!(&number[13..], "0000");
		}
		assert!(!is_valid_order_number("ORD-2025071-0001"));
		assert!(!is_valid_order_number("ORD-20251311-0001"));
		assert!(!is_valid_order_number("INV-20250711-0001"));
		assert!(!is_valid_order_number("ORD-20250711-00a1"));
	}

	#[test]
	fn test_request_validation() {
		assert!(sample_request().validate().is_ok());

		let mut request = sample_request();
		request.package_weight = 0;
		assert!(request.validate().is_err());

		let mut request = sample_request();
		request.receiver_latitude = Some(91.0);
		assert!(request.validate().is_err());

		let mut request = sample_request();
		request.sender_name = String::new();
		assert!(request.validate().is_err());

		let mut request = sample_request();
		request.package_value = Some(dec("-1"));
		assert!(request.validate().is_err());
	}

	#[test]
	fn test_request_rejects_unknown_package_type() {
		let mut value = serde_json::to_value(sample_request()).unwrap();
		value["package_type"] = serde_json::json!("pallet");
		assert!(serde_json::from_value::<OrderRequest>(value).is_err());
	}

	#[test]
	fn test_statistics_use_status_predicates() {
		let mut stats = OrderStatistics::default();
		let mut order = Order::new_pending(
			1,
			"ORD-20250711-0001".into(),
			&Actor::user(7),
			&sample_request(),
			Utc::now(),
		);
		stats.record(&order);
		order.status = OrderStatus::Delivered;
		order.set_costs(dec("15000"), dec("500"));
		stats.record(&order);
		order.status = OrderStatus::Rejected;
		stats.record(&order);

		assert_eq!(stats.total_orders, 3);
		assert_eq!(stats.pending_orders, 1);
		assert_eq!(stats.active_orders, 1);
		assert_eq!(stats.completed_orders, 1);
		assert_eq!(stats.cancelled_orders, 1);
		assert_eq!(stats.total_shipping_cost, dec("31000"));
	}
}
