//! Recovery and periodic reconciliation.
//!
//! On startup the confirmation journal is replayed so that orders accepted by
//! the courier but never linked locally get their linkage back. While
//! running, active linked orders are periodically refreshed from the
//! courier.

use crate::engine::merge::apply_confirmation;
use crate::engine::{EngineError, OrderEngine};
use chrono::Utc;
use shipping_types::{CourierOrder, OrderStatus};
use tracing::instrument;

/// Outcome of a recovery or reconciliation pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReconcileReport {
	/// Journal entries or orders looked at.
	pub examined: usize,
	/// Orders written back.
	pub updated: usize,
	/// Journal entries discarded.
	pub dropped: usize,
	/// Journal entries kept for manual follow-up.
	pub unresolved: usize,
	pub failed: usize,
}

impl OrderEngine {
	/// Replays the confirmation journal.
	///
	/// Entries whose order is gone or already linked are dropped. Entries
	/// carrying the courier's response are applied to the still pending
	/// order. Entries without a response cannot be resolved locally: the
	/// courier may or may not have created the order, so they are kept and
	/// logged.
	#[instrument(skip_all)]
	pub async fn recover_pending_confirmations(&self) -> Result<ReconcileReport, EngineError> {
		let mut report = ReconcileReport::default();

		for entry in self.journal.entries().await? {
			report.examined += 1;

			let order = match self.store.find(entry.order_id).await? {
				Some(order) => order,
				None => {
					tracing::warn!(
						order_id = entry.order_id,
						order_number = %entry.order_number,
						"Dropping confirmation entry for missing order"
					);
					self.journal.clear(&entry).await?;
					report.dropped += 1;
					continue;
				},
			};

			if order.has_external_order() {
				let recorded_id = entry
					.response
					.as_ref()
					.and_then(|r| r.get("id"))
					.and_then(|id| id.as_str());
				if recorded_id.is_some() && recorded_id != order.external_order_id.as_deref() {
					tracing::warn!(
						order_number = %order.order_number,
						orphan_external_order_id = recorded_id.unwrap_or_default(),
						"Order is linked to a different courier order; the recorded one is orphaned"
					);
				}
				self.journal.clear(&entry).await?;
				report.dropped += 1;
				continue;
			}

			let response = match (&entry.response, order.status) {
				(Some(response), OrderStatus::Pending) => response.clone(),
				_ => {
					tracing::warn!(
						order_number = %order.order_number,
						started_at = %entry.started_at,
						"Interrupted confirmation needs manual follow-up"
					);
					report.unresolved += 1;
					continue;
				},
			};

			let remote = match CourierOrder::from_json(response) {
				Ok(remote) => remote,
				Err(e) => {
					tracing::warn!(key = %entry.key, error = %e, "Unreadable recorded courier response");
					report.unresolved += 1;
					continue;
				},
			};

			let expected_version = order.version;
			let mut linked = order;
			if let Err(e) = apply_confirmation(&mut linked, &remote, Utc::now()) {
				tracing::warn!(key = %entry.key, error = %e, "Recorded courier response cannot be applied");
				report.unresolved += 1;
				continue;
			}

			match self.store.commit(linked, expected_version, Utc::now()).await {
				Ok(committed) => {
					tracing::info!(
						order_number = %committed.order_number,
						external_order_id = committed.external_order_id.as_deref().unwrap_or_default(),
						"Recovered courier linkage"
					);
					self.journal.clear(&entry).await?;
					report.updated += 1;
				},
				Err(e) => {
					tracing::warn!(key = %entry.key, error = %e, "Failed to commit recovered linkage");
					report.failed += 1;
				},
			}
		}

		Ok(report)
	}

	/// Refreshes every active, linked, non-terminal order from the courier.
	///
	/// Individual failures are logged and counted.
	#[instrument(skip_all)]
	pub async fn refresh_active_orders(&self) -> Result<ReconcileReport, EngineError> {
		let mut report = ReconcileReport::default();
		let candidates = self.store.list().await?.into_iter().filter(|order| {
			order.has_external_order() && order.status.is_active() && !order.status.is_terminal()
		});

		for order in candidates {
			report.examined += 1;
			match self.refresh_order(order.id).await {
				Ok(refreshed) if refreshed.version != order.version => report.updated += 1,
				Ok(_) => {},
				Err(e) => {
					tracing::warn!(
						order_number = %order.order_number,
						error = %e,
						"Failed to refresh order"
					);
					report.failed += 1;
				},
			}
		}

		Ok(report)
	}
}
