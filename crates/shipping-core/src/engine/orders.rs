//! Mutating order operations.

use super::merge::{apply_confirmation, apply_refresh, apply_tracked_status, build_courier_request};
use super::{Attempt, EngineError, OrderEngine};
use crate::state::{ConfirmationEntry, OrderStoreError};
use chrono::Utc;
use shipping_types::{Actor, CourierOrder, Order, OrderRequest, OrderStatus, TrackingInfo};
use tracing::instrument;
use validator::Validate;

impl OrderEngine {
	/// Creates an order, optionally submitting it to the courier first.
	///
	/// With auto-confirm nothing is persisted unless the courier accepted
	/// the order.
	#[instrument(skip_all, fields(user_id = actor.user_id, auto_confirm = request.auto_confirm))]
	pub async fn create_order(
		&self,
		actor: &Actor,
		request: OrderRequest,
	) -> Result<Order, EngineError> {
		request.validate()?;

		let now = Utc::now();
		let id = self.store.next_id().await?;
		let order_number = self.store.allocate_order_number(now.date_naive(), id).await?;
		let mut order = Order::new_pending(id, order_number, actor, &request, now);

		if request.auto_confirm {
			if let Err(e) = self.submit(&mut order).await {
				tracing::warn!(order_number = %order.order_number, error = %e, "Auto-confirm failed");
				self.release_order_number(&order.order_number).await;
				return Err(e);
			}
		}

		match self.store.insert(order.clone()).await {
			Ok(stored) => {
				tracing::info!(
					order_id = stored.id,
					order_number = %stored.order_number,
					status = %stored.status.as_str(),
					"Order created"
				);
				Ok(stored)
			},
			Err(e) => {
				if let Some(external_id) = order.external_order_id.as_deref() {
					tracing::error!(
						order_number = %order.order_number,
						external_order_id = %external_id,
						error = %e,
						"Courier order created but local insert failed"
					);
				}
				self.release_order_number(&order.order_number).await;
				Err(e.into())
			},
		}
	}

	/// Submits a pending order to the courier and records the linkage.
	#[instrument(skip_all, fields(order_id = id))]
	pub async fn confirm_order(&self, actor: &Actor, id: u64) -> Result<Order, EngineError> {
		let order = self.load_for(actor, id).await?;
		ensure_confirmable(&order)?;

		let entry = ConfirmationEntry::started(order.id, &order.order_number, Utc::now());
		if !self.journal.claim(&entry).await? {
			return Err(EngineError::state_conflict(
				order.status,
				"Order confirmation is already in progress",
			));
		}

		// A confirmation that finished before the claim has already committed.
		let order = match self.store.get(id).await {
			Ok(order) => order,
			Err(e) => {
				self.clear_entry(&entry).await;
				return Err(e.into());
			},
		};
		if let Err(e) = ensure_confirmable(&order) {
			self.clear_entry(&entry).await;
			return Err(e);
		}

		let payload = build_courier_request(&order, &self.settings.organization);
		let remote = match self.courier.create_order(&payload).await {
			Ok(remote) => remote,
			Err(e) => {
				self.clear_entry(&entry).await;
				return Err(e.into());
			},
		};

		let expected_version = order.version;
		let mut confirmed = order;
		if let Err(e) = apply_confirmation(&mut confirmed, &remote, Utc::now()) {
			self.keep_response(entry, &remote).await;
			return Err(e.into());
		}

		match self.store.commit(confirmed, expected_version, Utc::now()).await {
			Ok(committed) => {
				self.clear_entry(&entry).await;
				tracing::info!(
					order_number = %committed.order_number,
					external_order_id = committed.external_order_id.as_deref().unwrap_or_default(),
					status = %committed.status.as_str(),
					"Order confirmed with courier"
				);
				Ok(committed)
			},
			Err(e) => {
				tracing::error!(
					external_order_id = remote.id.as_deref().unwrap_or_default(),
					error = %e,
					"Courier accepted the order but the local commit failed"
				);
				self.keep_response(entry, &remote).await;
				Err(e.into())
			},
		}
	}

	/// Pulls the courier's view of an order and merges it.
	#[instrument(skip_all, fields(order_id = id))]
	pub async fn refresh_status(&self, actor: &Actor, id: u64) -> Result<Order, EngineError> {
		let order = self.load_for(actor, id).await?;
		if !order.has_external_order() {
			return Err(not_submitted());
		}
		self.refresh_order(id).await
	}

	/// Refresh without the access check, for the reconciliation sweep.
	pub(crate) async fn refresh_order(&self, id: u64) -> Result<Order, EngineError> {
		self.with_conflict_retry(id, || self.refresh_once(id)).await
	}

	async fn refresh_once(&self, id: u64) -> Result<Attempt<Order>, EngineError> {
		let order = self.store.get(id).await?;
		let Some(external_id) = order.external_order_id.clone().filter(|e| !e.is_empty()) else {
			return Err(not_submitted());
		};

		let remote = self.courier.get_order(&external_id).await?;
		let mut refreshed = order.clone();
		apply_refresh(&mut refreshed, &remote, Utc::now());
		if refreshed == order {
			return Ok(Attempt::Done(order));
		}

		let outcome = self.try_commit(refreshed, order.version).await?;
		if let Attempt::Done(committed) = &outcome {
			if committed.status != order.status {
				tracing::info!(
					order_number = %committed.order_number,
					old_status = %order.status.as_str(),
					new_status = %committed.status.as_str(),
					"Order status updated from courier"
				);
			}
		}
		Ok(outcome)
	}

	/// Cancels an order, remotely first when it is linked.
	#[instrument(skip_all, fields(order_id = id))]
	pub async fn cancel_order(
		&self,
		actor: &Actor,
		id: u64,
		reason: Option<String>,
	) -> Result<Order, EngineError> {
		let order = self.load_for(actor, id).await?;
		if !order.can_be_cancelled() {
			return Err(EngineError::state_conflict(
				order.status,
				format!(
					"Order cannot be cancelled in current status: {}",
					order.status.label()
				),
			));
		}

		let external_id = order.external_order_id.clone().filter(|e| !e.is_empty());
		if let Some(external_id) = external_id.as_deref() {
			self.courier
				.cancel_order(external_id, reason.as_deref())
				.await?;
		}
		let reason = reason.as_deref().map(str::trim).filter(|r| !r.is_empty());

		let expected_version = order.version;
		let mut cancelled = order;
		cancelled.status = OrderStatus::Cancelled;
		cancelled.append_note(&format!(
			"Cancelled: {}",
			reason.unwrap_or("No reason provided")
		));

		match self.store.commit(cancelled, expected_version, Utc::now()).await {
			Ok(committed) => {
				tracing::info!(
					order_number = %committed.order_number,
					reason = reason.unwrap_or_default(),
					"Order cancelled"
				);
				Ok(committed)
			},
			Err(e) => {
				if let (Some(external_id), OrderStoreError::Conflict { .. }) = (&external_id, &e) {
					tracing::error!(
						external_order_id = %external_id,
						"Courier order cancelled but the local order changed concurrently"
					);
				}
				Err(e.into())
			},
		}
	}

	/// Fetches live tracking and adopts a changed status.
	#[instrument(skip_all, fields(order_id = id))]
	pub async fn track_order(
		&self,
		actor: &Actor,
		id: u64,
	) -> Result<(Order, TrackingInfo), EngineError> {
		let order = self.load_for(actor, id).await?;
		tracking_id_of(&order)?;
		self.with_conflict_retry(id, || self.track_once(id)).await
	}

	async fn track_once(&self, id: u64) -> Result<Attempt<(Order, TrackingInfo)>, EngineError> {
		let order = self.store.get(id).await?;
		let tracking_id = tracking_id_of(&order)?.to_string();

		let info = self.courier.track(&tracking_id).await?;
		let mut tracked = order.clone();
		if !apply_tracked_status(&mut tracked, info.status.as_deref(), Utc::now()) {
			return Ok(Attempt::Done((order, info)));
		}

		Ok(match self.try_commit(tracked, order.version).await? {
			Attempt::Done(committed) => {
				tracing::info!(
					order_number = %committed.order_number,
					old_status = %order.status.as_str(),
					new_status = %committed.status.as_str(),
					"Order status updated from tracking"
				);
				Attempt::Done((committed, info))
			},
			Attempt::Raced => Attempt::Raced,
		})
	}

	/// Sends the order to the courier and links it in place.
	async fn submit(&self, order: &mut Order) -> Result<(), EngineError> {
		let payload = build_courier_request(order, &self.settings.organization);
		let remote = self.courier.create_order(&payload).await?;
		apply_confirmation(order, &remote, Utc::now())?;
		Ok(())
	}

	async fn release_order_number(&self, order_number: &str) {
		if let Err(e) = self.store.release_order_number(order_number).await {
			tracing::warn!(%order_number, error = %e, "Failed to release order number");
		}
	}

	async fn clear_entry(&self, entry: &ConfirmationEntry) {
		if let Err(e) = self.journal.clear(entry).await {
			tracing::warn!(key = %entry.key, error = %e, "Failed to clear confirmation journal entry");
		}
	}

	/// Stores the courier response in the journal so recovery can replay it.
	async fn keep_response(&self, mut entry: ConfirmationEntry, remote: &CourierOrder) {
		entry.response = Some(remote.raw.clone());
		if let Err(e) = self.journal.record(&entry).await {
			tracing::error!(
				key = %entry.key,
				error = %e,
				"Failed to record courier response in confirmation journal"
			);
		}
	}
}

fn ensure_confirmable(order: &Order) -> Result<(), EngineError> {
	if order.status != OrderStatus::Pending {
		return Err(EngineError::state_conflict(
			order.status,
			format!(
				"Order cannot be confirmed in current status: {}",
				order.status.label()
			),
		));
	}
	if order.has_external_order() {
		return Err(EngineError::state_conflict(
			order.status,
			"Order is already confirmed with the courier",
		));
	}
	Ok(())
}

fn not_submitted() -> EngineError {
	EngineError::Precondition("Order has not been submitted to the courier".to_string())
}

fn tracking_id_of(order: &Order) -> Result<&str, EngineError> {
	if !order.is_trackable() {
		return Err(EngineError::Precondition(
			"Order is not trackable".to_string(),
		));
	}
	order
		.tracking_id
		.as_deref()
		.filter(|t| !t.trim().is_empty())
		.ok_or_else(|| {
			EngineError::Precondition("Insufficient tracking information".to_string())
		})
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::engine::test_support::{engine_with, request};
	use rust_decimal::Decimal;
	use shipping_courier::implementations::mock::MockCourier;
	use shipping_courier::{CourierError, CourierOperation};
	use std::cell::Cell;

	async fn confirmed(engine: &OrderEngine, actor: &Actor) -> Order {
		let order = engine.create_order(actor, request()).await.unwrap();
		engine.confirm_order(actor, order.id).await.unwrap()
	}

	#[tokio::test]
	async fn test_create_without_auto_confirm_stays_local() {
		let mock = MockCourier::new();
		let engine = engine_with(&mock);
		let actor = Actor::user(1);

		let order = engine.create_order(&actor, request()).await.unwrap();
		assert_eq!(order.id, 1);
		assert_eq!(order.version, 1);
		assert_eq!(order.status, OrderStatus::Pending);
		assert_eq!(order.total_cost, Decimal::ZERO);
		assert!(!order.has_external_order());
		assert_eq!(mock.calls(CourierOperation::CreateOrder), 0);
		assert_eq!(engine.get_order(&actor, order.id).await.unwrap(), order);
	}

	#[tokio::test]
	async fn test_invalid_request_persists_nothing() {
		let engine = engine_with(&MockCourier::new());
		let actor = Actor::user(1);
		let mut invalid = request();
		invalid.package_weight = 0;

		let err = engine.create_order(&actor, invalid).await.unwrap_err();
		assert!(matches!(err, EngineError::Validation(_)));
		assert!(engine.list_orders(&actor, None).await.unwrap().is_empty());
	}

	#[tokio::test]
	async fn test_auto_confirm_failure_persists_nothing() {
		let mock = MockCourier::new();
		mock.push_error(
			CourierOperation::CreateOrder,
			CourierError::status(CourierOperation::CreateOrder, 401, "Invalid API key"),
		);
		let engine = engine_with(&mock);
		let actor = Actor::user(1);
		let mut auto = request();
		auto.auto_confirm = true;

		let err = engine.create_order(&actor, auto).await.unwrap_err();
		assert!(matches!(err, EngineError::Gateway(ref e) if e.http_status == Some(401)));
		assert!(engine.list_orders(&actor, None).await.unwrap().is_empty());
	}

	#[tokio::test]
	async fn test_auto_confirm_links_before_insert() {
		let mock = MockCourier::new();
		let engine = engine_with(&mock);
		let mut auto = request();
		auto.auto_confirm = true;
		auto.insurance_amount = Some(Decimal::from(100_000));

		let order = engine.create_order(&Actor::user(1), auto).await.unwrap();
		assert_eq!(order.version, 1);
		assert_eq!(order.status, OrderStatus::Confirmed);
		assert_eq!(order.external_order_id.as_deref(), Some("mock-1"));
		assert_eq!(order.total_cost, Decimal::from(15500));
		let sent = mock.last_create_request().unwrap();
		assert_eq!(sent.courier_insurance, Decimal::from(100_000));
		assert_eq!(sent.metadata.order_number, order.order_number);
	}

	#[tokio::test]
	async fn test_confirm_links_order_and_clears_journal() {
		let mock = MockCourier::new();
		let engine = engine_with(&mock);
		let actor = Actor::user(1);

		let order = confirmed(&engine, &actor).await;
		assert_eq!(order.status, OrderStatus::Confirmed);
		assert_eq!(order.version, 2);
		assert_eq!(order.waybill_id.as_deref(), Some("WB000001"));
		assert_eq!(order.tracking_id.as_deref(), Some("TRK000001"));
		assert_eq!(order.shipping_cost, Decimal::from(15000));
		assert_eq!(order.insurance_cost, Decimal::ZERO);
		assert!(order.courier_response.is_some());
		assert!(engine.journal.entries().await.unwrap().is_empty());

		let err = engine.confirm_order(&actor, order.id).await.unwrap_err();
		assert!(matches!(
			err,
			EngineError::Conflict {
				status: Some(OrderStatus::Confirmed),
				..
			}
		));
		assert!(err.to_string().contains("Confirmed"));
		assert_eq!(mock.calls(CourierOperation::CreateOrder), 1);
	}

	#[tokio::test]
	async fn test_concurrent_confirms_create_once() {
		let mock = MockCourier::new();
		let engine = engine_with(&mock);
		let actor = Actor::user(1);
		let order = engine.create_order(&actor, request()).await.unwrap();
		mock.set_latency(std::time::Duration::from_millis(50));

		let (a, b) = tokio::join!(
			engine.confirm_order(&actor, order.id),
			engine.confirm_order(&actor, order.id)
		);
		assert_eq!(mock.calls(CourierOperation::CreateOrder), 1);
		let (won, lost) = match (a, b) {
			(Ok(won), Err(lost)) | (Err(lost), Ok(won)) => (won, lost),
			_ => panic!("expected exactly one confirmation to succeed"),
		};
		assert_eq!(won.external_order_id.as_deref(), Some("mock-1"));
		assert!(matches!(lost, EngineError::Conflict { .. }));
		assert!(engine.journal.entries().await.unwrap().is_empty());

		let err = engine.confirm_order(&actor, order.id).await.unwrap_err();
		assert!(matches!(
			err,
			EngineError::Conflict {
				status: Some(OrderStatus::Confirmed),
				..
			}
		));
		assert_eq!(mock.calls(CourierOperation::CreateOrder), 1);
	}

	#[tokio::test]
	async fn test_open_journal_entry_blocks_confirm() {
		let mock = MockCourier::new();
		let engine = engine_with(&mock);
		let actor = Actor::user(1);
		let order = engine.create_order(&actor, request()).await.unwrap();
		let open = ConfirmationEntry::started(order.id, &order.order_number, Utc::now());
		assert!(engine.journal.claim(&open).await.unwrap());

		let err = engine.confirm_order(&actor, order.id).await.unwrap_err();
		assert!(matches!(
			err,
			EngineError::Conflict {
				status: Some(OrderStatus::Pending),
				..
			}
		));
		assert_eq!(mock.calls(CourierOperation::CreateOrder), 0);
		assert_eq!(engine.journal.entries().await.unwrap(), vec![open]);
	}

	#[tokio::test]
	async fn test_confirm_gateway_failure_leaves_order_untouched() {
		let mock = MockCourier::new();
		mock.push_error(
			CourierOperation::CreateOrder,
			CourierError::timeout(CourierOperation::CreateOrder, "Request timed out"),
		);
		let engine = engine_with(&mock);
		let actor = Actor::user(1);
		let order = engine.create_order(&actor, request()).await.unwrap();

		let err = engine.confirm_order(&actor, order.id).await.unwrap_err();
		assert!(matches!(err, EngineError::Gateway(_)));
		assert_eq!(engine.get_order(&actor, order.id).await.unwrap(), order);
		assert!(engine.journal.entries().await.unwrap().is_empty());
	}

	#[tokio::test]
	async fn test_access_rules() {
		let engine = engine_with(&MockCourier::new());
		let owner = Actor::user(1);
		let order = engine.create_order(&owner, request()).await.unwrap();

		let err = engine.get_order(&Actor::user(2), order.id).await.unwrap_err();
		assert!(matches!(err, EngineError::Forbidden(id) if id == order.id));
		let err = engine
			.cancel_order(&Actor::user(2), order.id, None)
			.await
			.unwrap_err();
		assert!(matches!(err, EngineError::Forbidden(_)));

		assert!(engine.get_order(&Actor::admin(99), order.id).await.is_ok());
		assert!(matches!(
			engine.get_order(&owner, 404).await,
			Err(EngineError::NotFound(404))
		));
	}

	#[tokio::test]
	async fn test_refresh_requires_linkage() {
		let mock = MockCourier::new();
		let engine = engine_with(&mock);
		let actor = Actor::user(1);
		let order = engine.create_order(&actor, request()).await.unwrap();

		let err = engine.refresh_status(&actor, order.id).await.unwrap_err();
		assert!(matches!(err, EngineError::Precondition(_)));
		assert_eq!(mock.calls(CourierOperation::GetOrder), 0);
	}

	#[tokio::test]
	async fn test_refresh_is_idempotent() {
		let mock = MockCourier::new();
		let engine = engine_with(&mock);
		let actor = Actor::user(1);
		let order = confirmed(&engine, &actor).await;

		mock.set_order_status("mock-1", "picked");
		let refreshed = engine.refresh_status(&actor, order.id).await.unwrap();
		assert_eq!(refreshed.status, OrderStatus::Picked);
		assert_eq!(refreshed.version, order.version + 1);

		let again = engine.refresh_status(&actor, order.id).await.unwrap();
		assert_eq!(again, refreshed);
	}

	#[tokio::test]
	async fn test_refresh_delivered_then_terminal() {
		let mock = MockCourier::new();
		let engine = engine_with(&mock);
		let actor = Actor::user(1);
		let order = confirmed(&engine, &actor).await;

		mock.set_order_status("mock-1", "delivered");
		let delivered = engine.refresh_status(&actor, order.id).await.unwrap();
		assert_eq!(delivered.status, OrderStatus::Delivered);
		let delivered_at = delivered.delivered_at;
		assert!(delivered_at.is_some());

		mock.set_order_status("mock-1", "return_in_transit");
		let after = engine.refresh_status(&actor, order.id).await.unwrap();
		assert_eq!(after.status, OrderStatus::Delivered);
		assert_eq!(after.delivered_at, delivered_at);
	}

	#[tokio::test]
	async fn test_refresh_ignores_unknown_status() {
		let mock = MockCourier::new();
		let engine = engine_with(&mock);
		let actor = Actor::user(1);
		let order = confirmed(&engine, &actor).await;

		mock.modify_order("mock-1", |doc| {
			doc["status"] = serde_json::json!("in_transit");
			doc["price"] = serde_json::json!(17000);
		});
		let refreshed = engine.refresh_status(&actor, order.id).await.unwrap();
		assert_eq!(refreshed.status, OrderStatus::Confirmed);
		assert_eq!(refreshed.shipping_cost, Decimal::from(17000));
	}

	#[tokio::test]
	async fn test_cancel_local_order_appends_note() {
		let mock = MockCourier::new();
		let engine = engine_with(&mock);
		let actor = Actor::user(1);
		let mut with_notes = request();
		with_notes.notes = Some("Fragile".into());
		let order = engine.create_order(&actor, with_notes).await.unwrap();

		let cancelled = engine
			.cancel_order(&actor, order.id, Some("   ".into()))
			.await
			.unwrap();
		assert_eq!(cancelled.status, OrderStatus::Cancelled);
		assert_eq!(
			cancelled.notes.as_deref(),
			Some("Fragile\n\nCancelled: No reason provided")
		);
		assert_eq!(mock.calls(CourierOperation::CancelOrder), 0);

		let err = engine.cancel_order(&actor, order.id, None).await.unwrap_err();
		assert!(matches!(
			err,
			EngineError::Conflict {
				status: Some(OrderStatus::Cancelled),
				..
			}
		));
		assert!(err.to_string().contains("Cancelled"));
	}

	#[tokio::test]
	async fn test_cancel_linked_order_cancels_remotely_first() {
		let mock = MockCourier::new();
		let engine = engine_with(&mock);
		let actor = Actor::user(1);
		let order = confirmed(&engine, &actor).await;

		mock.push_error(
			CourierOperation::CancelOrder,
			CourierError::status(CourierOperation::CancelOrder, 400, "Order already picked"),
		);
		let err = engine
			.cancel_order(&actor, order.id, Some("wrong address".into()))
			.await
			.unwrap_err();
		assert!(matches!(err, EngineError::Gateway(_)));
		assert_eq!(engine.get_order(&actor, order.id).await.unwrap(), order);

		let cancelled = engine
			.cancel_order(&actor, order.id, Some(" wrong address\n".into()))
			.await
			.unwrap();
		assert_eq!(cancelled.status, OrderStatus::Cancelled);
		assert_eq!(cancelled.notes.as_deref(), Some("Cancelled: wrong address"));
		assert_eq!(
			mock.last_cancel_reason(),
			Some(Some(" wrong address\n".to_string()))
		);
	}

	#[tokio::test]
	async fn test_cancel_outside_window_conflicts() {
		let mock = MockCourier::new();
		let engine = engine_with(&mock);
		let actor = Actor::user(1);
		let order = confirmed(&engine, &actor).await;
		mock.set_order_status("mock-1", "picking_up");
		engine.refresh_status(&actor, order.id).await.unwrap();

		let err = engine.cancel_order(&actor, order.id, None).await.unwrap_err();
		assert!(err.to_string().contains("Picking Up"));
		assert_eq!(mock.calls(CourierOperation::CancelOrder), 0);
	}

	#[tokio::test]
	async fn test_track_preconditions() {
		let mock = MockCourier::new();
		let engine = engine_with(&mock);
		let actor = Actor::user(1);
		let order = engine.create_order(&actor, request()).await.unwrap();

		let err = engine.track_order(&actor, order.id).await.unwrap_err();
		assert!(matches!(err, EngineError::Precondition(ref m) if m == "Order is not trackable"));

		mock.push_response(
			CourierOperation::CreateOrder,
			serde_json::json!({
				"id": "ext-9",
				"status": "confirmed",
				"courier": { "waybill_id": "WB9" }
			}),
		);
		let linked = engine.confirm_order(&actor, order.id).await.unwrap();
		let err = engine.track_order(&actor, linked.id).await.unwrap_err();
		assert!(
			matches!(err, EngineError::Precondition(ref m) if m == "Insufficient tracking information")
		);
		assert_eq!(mock.calls(CourierOperation::Track), 0);
	}

	#[tokio::test]
	async fn test_track_rejects_delivered_order() {
		let mock = MockCourier::new();
		let engine = engine_with(&mock);
		let actor = Actor::user(1);
		let order = confirmed(&engine, &actor).await;
		mock.set_order_status("mock-1", "delivered");
		let delivered = engine.refresh_status(&actor, order.id).await.unwrap();
		assert_eq!(delivered.status, OrderStatus::Delivered);
		assert!(delivered.waybill_id.is_some());

		let err = engine.track_order(&actor, order.id).await.unwrap_err();
		assert!(matches!(err, EngineError::Precondition(ref m) if m == "Order is not trackable"));
		assert_eq!(mock.calls(CourierOperation::Track), 0);
	}

	#[tokio::test]
	async fn test_track_adopts_changed_status_only() {
		let mock = MockCourier::new();
		let engine = engine_with(&mock);
		let actor = Actor::user(1);
		let order = confirmed(&engine, &actor).await;

		let (same, info) = engine.track_order(&actor, order.id).await.unwrap();
		assert_eq!(same, order);
		assert_eq!(info.waybill_id.as_deref(), Some("WB000001"));

		mock.modify_order("mock-1", |doc| {
			doc["status"] = serde_json::json!("dropping_off");
			doc["price"] = serde_json::json!(99999);
		});
		let (tracked, info) = engine.track_order(&actor, order.id).await.unwrap();
		assert_eq!(info.status.as_deref(), Some("dropping_off"));
		assert_eq!(tracked.status, OrderStatus::DroppingOff);
		assert_eq!(tracked.shipping_cost, order.shipping_cost);
		assert_eq!(tracked.version, order.version + 1);

		mock.set_order_status("mock-1", "lost_in_space");
		let (unchanged, _) = engine.track_order(&actor, order.id).await.unwrap();
		assert_eq!(unchanged, tracked);
	}

	#[tokio::test]
	async fn test_conflict_retry_is_bounded() {
		let engine = engine_with(&MockCourier::new());
		let attempts = Cell::new(0u32);

		let err = engine
			.with_conflict_retry(1, || {
				attempts.set(attempts.get() + 1);
				async { Ok::<Attempt<()>, EngineError>(Attempt::Raced) }
			})
			.await
			.unwrap_err();
		assert!(matches!(err, EngineError::Conflict { status: None, .. }));
		assert_eq!(attempts.get(), engine.settings().max_conflict_retries + 1);

		attempts.set(0);
		let value = engine
			.with_conflict_retry(1, || {
				attempts.set(attempts.get() + 1);
				let round = attempts.get();
				async move {
					Ok::<_, EngineError>(if round < 3 {
						Attempt::Raced
					} else {
						Attempt::Done(round)
					})
				}
			})
			.await
			.unwrap();
		assert_eq!(value, 3);
	}

	#[tokio::test]
	async fn test_concurrent_refreshes_write_once() {
		let mock = MockCourier::new();
		let engine = engine_with(&mock);
		let actor = Actor::user(1);
		let order = confirmed(&engine, &actor).await;
		mock.set_order_status("mock-1", "allocated");
		let id = order.id;

		let mut handles = Vec::new();
		for _ in 0..8 {
			let engine = engine.clone();
			let actor = actor.clone();
			handles.push(tokio::spawn(async move {
				engine.refresh_status(&actor, id).await
			}));
		}
		for handle in handles {
			let refreshed = handle.await.unwrap().unwrap();
			assert_eq!(refreshed.status, OrderStatus::Allocated);
		}
		let stored = engine.get_order(&actor, id).await.unwrap();
		assert_eq!(stored.version, order.version + 1);
	}
}
