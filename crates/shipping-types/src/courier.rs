//! Wire format of the courier aggregator.
//!
//! Responses keep the verbatim JSON next to the typed view so the engine can
//! store exactly what the courier returned.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
	pub latitude: f64,
	pub longitude: f64,
}

impl From<(f64, f64)> for Coordinate {
	fn from((latitude, longitude): (f64, f64)) -> Self {
		Self {
			latitude,
			longitude,
		}
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderMetadata {
	pub order_number: String,
	pub user_id: u64,
}

/// One shipped item. Dimensions in cm, weight in grams.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CourierItem {
	pub name: String,
	pub weight: u32,
	pub length: u32,
	pub width: u32,
	pub height: u32,
	#[serde(with = "rust_decimal::serde::float")]
	pub value: Decimal,
}

/// Payload of `POST /orders`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CourierOrderRequest {
	pub shipper_contact_name: String,
	pub shipper_contact_phone: String,
	pub shipper_contact_email: Option<String>,
	pub shipper_organization: String,
	pub origin_contact_name: String,
	pub origin_contact_phone: String,
	pub origin_address: String,
	pub origin_postal_code: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub origin_coordinate: Option<Coordinate>,
	pub destination_contact_name: String,
	pub destination_contact_phone: String,
	pub destination_contact_email: Option<String>,
	pub destination_address: String,
	pub destination_postal_code: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub destination_coordinate: Option<Coordinate>,
	pub courier_company: String,
	pub courier_type: String,
	#[serde(with = "rust_decimal::serde::float")]
	pub courier_insurance: Decimal,
	pub delivery_type: String,
	pub order_note: Option<String>,
	pub metadata: OrderMetadata,
	pub items: Vec<CourierItem>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CourierInsurance {
	#[serde(default)]
	pub amount: Option<Decimal>,
	#[serde(default)]
	pub fee: Option<Decimal>,
}

/// Courier assignment block of an order response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CourierAssignment {
	#[serde(default)]
	pub waybill_id: Option<String>,
	#[serde(default)]
	pub tracking_id: Option<String>,
	#[serde(default)]
	pub company: Option<String>,
	#[serde(default, rename = "type")]
	pub service_type: Option<String>,
	#[serde(default)]
	pub insurance: Option<CourierInsurance>,
}

/// Order as reported by the courier.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CourierOrder {
	#[serde(default)]
	pub id: Option<String>,
	#[serde(default)]
	pub status: Option<String>,
	#[serde(default)]
	pub price: Option<Decimal>,
	#[serde(default)]
	pub courier: Option<CourierAssignment>,
	#[serde(skip)]
	pub raw: Value,
}

impl CourierOrder {
	/// Parses a response body, keeping the original document in `raw`.
	pub fn from_json(value: Value) -> Result<Self, serde_json::Error> {
		let mut order: CourierOrder = serde_json::from_value(value.clone())?;
		order.raw = value;
		Ok(order)
	}

	pub fn waybill_id(&self) -> Option<&str> {
		self.courier.as_ref()?.waybill_id.as_deref()
	}

	pub fn tracking_id(&self) -> Option<&str> {
		self.courier.as_ref()?.tracking_id.as_deref()
	}

	pub fn insurance_fee(&self) -> Option<Decimal> {
		self.courier.as_ref()?.insurance.as_ref()?.fee
	}
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackingEvent {
	#[serde(default)]
	pub status: Option<String>,
	#[serde(default)]
	pub note: Option<String>,
	#[serde(default)]
	pub service_type: Option<String>,
	#[serde(default)]
	pub updated_at: Option<String>,
}

/// Tracking document returned by the tracking endpoints.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackingInfo {
	#[serde(default)]
	pub status: Option<String>,
	#[serde(default)]
	pub waybill_id: Option<String>,
	#[serde(default)]
	pub link: Option<String>,
	#[serde(default)]
	pub history: Vec<TrackingEvent>,
	#[serde(skip)]
	pub raw: Value,
}

impl TrackingInfo {
	pub fn from_json(value: Value) -> Result<Self, serde_json::Error> {
		let mut info: TrackingInfo = serde_json::from_value(value.clone())?;
		info.raw = value;
		Ok(info)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	#[test]
	fn test_order_response_keeps_raw_document() {
		let body = json!({
			"success": true,
			"id": "5dd599ebdefcd4158eb8470b",
			"status": "confirmed",
			"price": 15000,
			"courier": {
				"waybill_id": "WYB-1",
				"tracking_id": "TRK-1",
				"company": "jne",
				"type": "reg",
				"insurance": { "amount": 100000, "fee": 500 }
			}
		});
		let order = CourierOrder::from_json(body.clone()).unwrap();
		assert_eq!(order.id.as_deref(), Some("5dd599ebdefcd4158eb8470b"));
		assert_eq!(order.price, Some(Decimal::from(15000)));
		assert_eq!(order.insurance_fee(), Some(Decimal::from(500)));
		assert_eq!(order.waybill_id(), Some("WYB-1"));
		assert_eq!(order.raw, body);
	}

	#[test]
	fn test_sparse_response_parses() {
		let order = CourierOrder::from_json(json!({ "status": "picked", "courier": null })).unwrap();
		assert!(order.id.is_none());
		assert!(order.waybill_id().is_none());
		assert!(order.insurance_fee().is_none());
	}

	#[test]
	fn test_tracking_history() {
		let info = TrackingInfo::from_json(json!({
			"status": "dropping_off",
			"waybill_id": "WYB-1",
			"link": "https://track.example/WYB-1",
			"history": [
				{ "note": "Picked up", "status": "picked", "updated_at": "2025-07-11T10:00:00+07:00" },
				{ "note": "On the way", "status": "dropping_off", "service_type": "reg" }
			]
		}))
		.unwrap();
		assert_eq!(info.history.len(), 2);
		assert_eq!(info.history[1].service_type.as_deref(), Some("reg"));
	}

	#[test]
	fn test_amounts_serialize_as_numbers() {
		let item = CourierItem {
			name: "Package".into(),
			weight: 1000,
			length: 10,
			width: 10,
			height: 10,
			value: Decimal::new(25050, 2),
		};
		let value = serde_json::to_value(&item).unwrap();
		assert_eq!(value["value"], json!(250.5));
	}
}
