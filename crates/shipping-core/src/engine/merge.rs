//! Translation between local orders and courier documents.

use crate::reconcile::{classify_external_status, ExternalStatus};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use shipping_courier::{CourierError, CourierOperation};
use shipping_types::{
	Coordinate, CourierItem, CourierOrder, CourierOrderRequest, Order, OrderMetadata, OrderStatus,
};

const DEFAULT_ITEM_NAME: &str = "Package";
const DEFAULT_DIMENSION_CM: u32 = 10;
const DELIVERY_TYPE: &str = "now";

/// Builds the courier submission for a local order.
pub fn build_courier_request(order: &Order, organization: &str) -> CourierOrderRequest {
	let package = &order.package;
	let item = CourierItem {
		name: package
			.description
			.clone()
			.filter(|d| !d.trim().is_empty())
			.unwrap_or_else(|| DEFAULT_ITEM_NAME.to_string()),
		weight: package.weight,
		length: package.length.unwrap_or(DEFAULT_DIMENSION_CM),
		width: package.width.unwrap_or(DEFAULT_DIMENSION_CM),
		height: package.height.unwrap_or(DEFAULT_DIMENSION_CM),
		value: package.value.unwrap_or(Decimal::ZERO),
	};

	CourierOrderRequest {
		shipper_contact_name: order.sender.name.clone(),
		shipper_contact_phone: order.sender.phone.clone(),
		shipper_contact_email: order.owner_email.clone(),
		shipper_organization: organization.to_string(),
		origin_contact_name: order.sender.name.clone(),
		origin_contact_phone: order.sender.phone.clone(),
		origin_address: order.sender.address.clone(),
		origin_postal_code: order.sender.postal_code.clone(),
		origin_coordinate: order.sender.coordinates().map(Coordinate::from),
		destination_contact_name: order.receiver.name.clone(),
		destination_contact_phone: order.receiver.phone.clone(),
		destination_contact_email: None,
		destination_address: order.receiver.address.clone(),
		destination_postal_code: order.receiver.postal_code.clone(),
		destination_coordinate: order.receiver.coordinates().map(Coordinate::from),
		courier_company: order.courier_code.clone(),
		courier_type: order.courier_service.clone(),
		courier_insurance: order.insured_amount,
		delivery_type: DELIVERY_TYPE.to_string(),
		order_note: order.notes.clone(),
		metadata: OrderMetadata {
			order_number: order.order_number.clone(),
			user_id: order.user_id,
		},
		items: vec![item],
	}
}

/// Moves `order` to the reported status unless the status is unknown or the
/// order already reached a terminal state.
fn reconcile_status(order: &mut Order, reported: Option<&str>) {
	let Some(reported) = reported else {
		return;
	};
	match classify_external_status(reported) {
		ExternalStatus::Known(status) if status != order.status => {
			if order.status.is_terminal() {
				tracing::debug!(
					order_id = order.id,
					current = %order.status.as_str(),
					reported = %status.as_str(),
					"Ignoring courier status for terminal order"
				);
			} else {
				order.status = status;
			}
		},
		ExternalStatus::Known(_) => {},
		ExternalStatus::Unknown(other) => {
			tracing::warn!(
				order_id = order.id,
				status = %other,
				"Unknown courier status, keeping current status"
			);
		},
	}
}

/// Links `order` to the courier order created for it.
///
/// Costs come from the response, defaulting to zero.
pub(crate) fn apply_confirmation(
	order: &mut Order,
	remote: &CourierOrder,
	now: DateTime<Utc>,
) -> Result<(), CourierError> {
	let external_id = remote
		.id
		.as_deref()
		.filter(|id| !id.is_empty())
		.ok_or_else(|| {
			CourierError::malformed(
				CourierOperation::CreateOrder,
				"Response did not include an order id",
			)
		})?;

	order.external_order_id = Some(external_id.to_string());
	reconcile_status(order, remote.status.as_deref());
	order.waybill_id = remote.waybill_id().map(str::to_string);
	order.tracking_id = remote.tracking_id().map(str::to_string);
	order.set_costs(
		remote.price.unwrap_or(Decimal::ZERO),
		remote.insurance_fee().unwrap_or(Decimal::ZERO),
	);
	order.courier_response = Some(remote.raw.clone());
	if order.status == OrderStatus::Delivered {
		order.mark_delivered(now);
	}
	Ok(())
}

/// Folds a fresh courier document into `order`.
///
/// Fields the courier leaves out keep their previous values.
pub(crate) fn apply_refresh(order: &mut Order, remote: &CourierOrder, now: DateTime<Utc>) {
	reconcile_status(order, remote.status.as_deref());
	if let Some(waybill) = remote.waybill_id() {
		order.waybill_id = Some(waybill.to_string());
	}
	if let Some(tracking) = remote.tracking_id() {
		order.tracking_id = Some(tracking.to_string());
	}
	order.set_costs(
		remote.price.unwrap_or(order.shipping_cost),
		remote.insurance_fee().unwrap_or(order.insurance_cost),
	);
	order.courier_response = Some(remote.raw.clone());
	if order.status == OrderStatus::Delivered {
		order.mark_delivered(now);
	}
}

/// Applies a status reported by the tracking endpoint. Only the status and
/// delivery time change. Returns true when the order was modified.
pub(crate) fn apply_tracked_status(
	order: &mut Order,
	reported: Option<&str>,
	now: DateTime<Utc>,
) -> bool {
	let before = (order.status, order.delivered_at);
	reconcile_status(order, reported);
	if order.status == OrderStatus::Delivered {
		order.mark_delivered(now);
	}
	before != (order.status, order.delivered_at)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::engine::test_support::request;
	use serde_json::json;
	use shipping_types::Actor;

	fn order() -> Order {
		Order::new_pending(
			1,
			"ORD-20250711-0001".into(),
			&Actor::user(7).with_email("budi@example.com"),
			&request(),
			Utc::now(),
		)
	}

	fn remote(body: serde_json::Value) -> CourierOrder {
		CourierOrder::from_json(body).unwrap()
	}

	#[test]
	fn test_payload_defaults() {
		let payload = build_courier_request(&order(), "Acme");
		assert_eq!(payload.shipper_organization, "Acme");
		assert_eq!(payload.shipper_contact_email.as_deref(), Some("budi@example.com"));
		assert_eq!(payload.delivery_type, "now");
		assert_eq!(payload.metadata.order_number, "ORD-20250711-0001");
		assert_eq!(payload.metadata.user_id, 7);
		assert!(payload.origin_coordinate.is_none());

		let item = &payload.items[0];
		assert_eq!(item.name, "Package");
		assert_eq!((item.length, item.width, item.height), (10, 10, 10));
		assert_eq!(item.value, Decimal::ZERO);

		let json = serde_json::to_value(&payload).unwrap();
		assert!(json.get("origin_coordinate").is_none());
		assert_eq!(json["items"][0]["value"], json!(0.0));
	}

	#[test]
	fn test_payload_coordinates_need_both_halves() {
		let mut order = order();
		order.sender.latitude = Some(-6.2);
		order.receiver.latitude = Some(-6.1);
		order.receiver.longitude = Some(106.8);
		order.package.description = Some("Books".into());

		let payload = build_courier_request(&order, "Acme");
		assert!(payload.origin_coordinate.is_none());
		assert_eq!(
			payload.destination_coordinate,
			Some(Coordinate {
				latitude: -6.1,
				longitude: 106.8
			})
		);
		assert_eq!(payload.items[0].name, "Books");
	}

	#[test]
	fn test_confirmation_requires_id_and_defaults_costs() {
		let mut order = order();
		let err = apply_confirmation(&mut order, &remote(json!({ "status": "confirmed" })), Utc::now())
			.unwrap_err();
		assert_eq!(err.operation, CourierOperation::CreateOrder);
		assert!(!order.has_external_order());

		apply_confirmation(
			&mut order,
			&remote(json!({ "id": "ext-1", "status": "allocated" })),
			Utc::now(),
		)
		.unwrap();
		assert_eq!(order.external_order_id.as_deref(), Some("ext-1"));
		assert_eq!(order.status, OrderStatus::Allocated);
		assert_eq!(order.total_cost, Decimal::ZERO);
		assert!(order.waybill_id.is_none());
		assert!(order.courier_response.is_some());
	}

	#[test]
	fn test_refresh_keeps_absent_fields() {
		let mut order = order();
		order.external_order_id = Some("ext-1".into());
		order.status = OrderStatus::Confirmed;
		order.waybill_id = Some("WB1".into());
		order.set_costs(Decimal::from(15000), Decimal::from(500));

		apply_refresh(&mut order, &remote(json!({ "status": "picked", "price": 16000 })), Utc::now());
		assert_eq!(order.status, OrderStatus::Picked);
		assert_eq!(order.waybill_id.as_deref(), Some("WB1"));
		assert_eq!(order.shipping_cost, Decimal::from(16000));
		assert_eq!(order.insurance_cost, Decimal::from(500));
		assert_eq!(order.total_cost, Decimal::from(16500));
		assert!(order.delivered_at.is_none());
	}

	#[test]
	fn test_delivered_at_set_once() {
		let mut order = order();
		order.status = OrderStatus::DroppingOff;
		let first = Utc::now();
		apply_refresh(&mut order, &remote(json!({ "status": "delivered" })), first);
		assert_eq!(order.delivered_at, Some(first));

		apply_refresh(
			&mut order,
			&remote(json!({ "status": "delivered" })),
			first + chrono::Duration::minutes(5),
		);
		assert_eq!(order.delivered_at, Some(first));
	}

	#[test]
	fn test_terminal_and_unknown_statuses_are_ignored() {
		let mut order = order();
		order.status = OrderStatus::Cancelled;
		apply_refresh(&mut order, &remote(json!({ "status": "picked" })), Utc::now());
		assert_eq!(order.status, OrderStatus::Cancelled);

		order.status = OrderStatus::Picked;
		assert!(!apply_tracked_status(&mut order, Some("teleported"), Utc::now()));
		assert_eq!(order.status, OrderStatus::Picked);

		assert!(apply_tracked_status(&mut order, Some("dropping_off"), Utc::now()));
		assert_eq!(order.status, OrderStatus::DroppingOff);
		assert!(!apply_tracked_status(&mut order, None, Utc::now()));
	}
}
