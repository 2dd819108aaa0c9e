//! Read-only order operations.

use super::{EngineError, OrderEngine};
use shipping_types::{Actor, Order, OrderStatistics, OrderStatus, TrackingInfo};
use std::borrow::Cow;
use tracing::instrument;
use validator::{ValidationError, ValidationErrors};

impl OrderEngine {
	pub async fn get_order(&self, actor: &Actor, id: u64) -> Result<Order, EngineError> {
		self.load_for(actor, id).await
	}

	/// Orders visible to the actor, newest first, optionally by status.
	pub async fn list_orders(
		&self,
		actor: &Actor,
		status: Option<OrderStatus>,
	) -> Result<Vec<Order>, EngineError> {
		Ok(self
			.visible_orders(actor)
			.await?
			.into_iter()
			.filter(|order| status.is_none_or(|s| order.status == s))
			.collect())
	}

	/// Counters over every order for admins, over their own orders otherwise.
	pub async fn statistics(&self, actor: &Actor) -> Result<OrderStatistics, EngineError> {
		let mut stats = OrderStatistics::default();
		for order in self.visible_orders(actor).await? {
			stats.record(&order);
		}
		Ok(stats)
	}

	/// Tracks any waybill without touching local state.
	#[instrument(skip_all, fields(waybill_id = %waybill_id, courier_code = %courier_code))]
	pub async fn public_track(
		&self,
		waybill_id: &str,
		courier_code: &str,
	) -> Result<TrackingInfo, EngineError> {
		let mut errors = ValidationErrors::new();
		for (field, value) in [("waybill_id", waybill_id), ("courier_code", courier_code)] {
			let value = value.trim();
			let (code, message) = if value.is_empty() {
				("required", format!("{} is required", field))
			} else if !is_plain_identifier(value) {
				("format", format!("{} contains invalid characters", field))
			} else {
				continue;
			};
			let mut error = ValidationError::new(code);
			error.message = Some(Cow::from(message));
			errors.add(field, error);
		}
		if !errors.is_empty() {
			return Err(errors.into());
		}

		Ok(self
			.courier
			.public_track(waybill_id.trim(), courier_code.trim())
			.await?)
	}

	async fn visible_orders(&self, actor: &Actor) -> Result<Vec<Order>, EngineError> {
		let orders = self.store.list().await?;
		Ok(orders
			.into_iter()
			.filter(|order| actor.can_access(order))
			.collect())
	}
}

/// Waybills and courier codes end up as URL path segments.
fn is_plain_identifier(value: &str) -> bool {
	!value.contains(['/', '\\', '?', '#', '%']) && !value.contains("..")
}
