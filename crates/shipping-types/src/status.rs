//! Order status taxonomy.
//!
//! The set of states is closed. Every predicate below matches exhaustively
//! so that adding a state forces each consumer to be revisited.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lifecycle state of a shipment order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
	/// Created locally, not yet submitted to the courier.
	Pending,
	Confirmed,
	Scheduled,
	Allocated,
	PickingUp,
	Picked,
	Cancelled,
	OnHold,
	DroppingOff,
	ReturnInTransit,
	Returned,
	Rejected,
	Disposed,
	CourierNotFound,
	Delivered,
}

/// Presentation category of a status, used for UI colouring only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusSeverity {
	Warning,
	Info,
	Primary,
	Success,
	Danger,
	Secondary,
}

impl OrderStatus {
	/// Every status, in lifecycle order.
	pub const ALL: [OrderStatus; 15] = [
		OrderStatus::Pending,
		OrderStatus::Confirmed,
		OrderStatus::Scheduled,
		OrderStatus::Allocated,
		OrderStatus::PickingUp,
		OrderStatus::Picked,
		OrderStatus::Cancelled,
		OrderStatus::OnHold,
		OrderStatus::DroppingOff,
		OrderStatus::ReturnInTransit,
		OrderStatus::Returned,
		OrderStatus::Rejected,
		OrderStatus::Disposed,
		OrderStatus::CourierNotFound,
		OrderStatus::Delivered,
	];

	/// Wire name of the status.
	pub fn as_str(&self) -> &'static str {
		match self {
			OrderStatus::Pending => "pending",
			OrderStatus::Confirmed => "confirmed",
			OrderStatus::Scheduled => "scheduled",
			OrderStatus::Allocated => "allocated",
			OrderStatus::PickingUp => "picking_up",
			OrderStatus::Picked => "picked",
			OrderStatus::Cancelled => "cancelled",
			OrderStatus::OnHold => "on_hold",
			OrderStatus::DroppingOff => "dropping_off",
			OrderStatus::ReturnInTransit => "return_in_transit",
			OrderStatus::Returned => "returned",
			OrderStatus::Rejected => "rejected",
			OrderStatus::Disposed => "disposed",
			OrderStatus::CourierNotFound => "courier_not_found",
			OrderStatus::Delivered => "delivered",
		}
	}

	/// Human readable label.
	pub fn label(&self) -> &'static str {
		match self {
			OrderStatus::Pending => "Pending",
			OrderStatus::Confirmed => "Confirmed",
			OrderStatus::Scheduled => "Scheduled",
			OrderStatus::Allocated => "Allocated",
			OrderStatus::PickingUp => "Picking Up",
			OrderStatus::Picked => "Picked",
			OrderStatus::Cancelled => "Cancelled",
			OrderStatus::OnHold => "On Hold",
			OrderStatus::DroppingOff => "Dropping Off",
			OrderStatus::ReturnInTransit => "Return in Transit",
			OrderStatus::Returned => "Returned",
			OrderStatus::Rejected => "Rejected",
			OrderStatus::Disposed => "Disposed",
			OrderStatus::CourierNotFound => "Courier Not Found",
			OrderStatus::Delivered => "Delivered",
		}
	}

	pub fn severity(&self) -> StatusSeverity {
		match self {
			OrderStatus::Pending => StatusSeverity::Warning,
			OrderStatus::Confirmed | OrderStatus::Scheduled | OrderStatus::Allocated => {
				StatusSeverity::Info
			},
			OrderStatus::PickingUp | OrderStatus::Picked | OrderStatus::DroppingOff => {
				StatusSeverity::Primary
			},
			OrderStatus::Delivered => StatusSeverity::Success,
			OrderStatus::Cancelled
			| OrderStatus::Rejected
			| OrderStatus::Disposed
			| OrderStatus::CourierNotFound => StatusSeverity::Danger,
			OrderStatus::OnHold | OrderStatus::ReturnInTransit | OrderStatus::Returned => {
				StatusSeverity::Secondary
			},
		}
	}

	/// True while the shipment is in motion or awaiting motion.
	pub fn is_active(&self) -> bool {
		match self {
			OrderStatus::Pending
			| OrderStatus::Confirmed
			| OrderStatus::Scheduled
			| OrderStatus::Allocated
			| OrderStatus::PickingUp
			| OrderStatus::Picked
			| OrderStatus::OnHold
			| OrderStatus::DroppingOff
			| OrderStatus::ReturnInTransit
			| OrderStatus::CourierNotFound => true,
			OrderStatus::Cancelled
			| OrderStatus::Rejected
			| OrderStatus::Disposed
			| OrderStatus::Delivered
			| OrderStatus::Returned => false,
		}
	}

	/// True once the package reached an end recipient (receiver or sender).
	pub fn is_completed(&self) -> bool {
		match self {
			OrderStatus::Delivered | OrderStatus::Returned => true,
			OrderStatus::Pending
			| OrderStatus::Confirmed
			| OrderStatus::Scheduled
			| OrderStatus::Allocated
			| OrderStatus::PickingUp
			| OrderStatus::Picked
			| OrderStatus::Cancelled
			| OrderStatus::OnHold
			| OrderStatus::DroppingOff
			| OrderStatus::ReturnInTransit
			| OrderStatus::Rejected
			| OrderStatus::Disposed
			| OrderStatus::CourierNotFound => false,
		}
	}

	/// True for the states that end the shipment without delivery.
	pub fn is_cancelled(&self) -> bool {
		match self {
			OrderStatus::Cancelled | OrderStatus::Rejected | OrderStatus::Disposed => true,
			OrderStatus::Pending
			| OrderStatus::Confirmed
			| OrderStatus::Scheduled
			| OrderStatus::Allocated
			| OrderStatus::PickingUp
			| OrderStatus::Picked
			| OrderStatus::OnHold
			| OrderStatus::DroppingOff
			| OrderStatus::ReturnInTransit
			| OrderStatus::Returned
			| OrderStatus::CourierNotFound
			| OrderStatus::Delivered => false,
		}
	}

	/// States from which a cancellation request is still accepted.
	pub fn is_cancellable(&self) -> bool {
		match self {
			OrderStatus::Pending | OrderStatus::Confirmed | OrderStatus::Scheduled => true,
			OrderStatus::Allocated
			| OrderStatus::PickingUp
			| OrderStatus::Picked
			| OrderStatus::Cancelled
			| OrderStatus::OnHold
			| OrderStatus::DroppingOff
			| OrderStatus::ReturnInTransit
			| OrderStatus::Returned
			| OrderStatus::Rejected
			| OrderStatus::Disposed
			| OrderStatus::CourierNotFound
			| OrderStatus::Delivered => false,
		}
	}

	/// States that reconciliation never moves away from.
	///
	/// `CourierNotFound` is still active for tracking purposes, but the
	/// courier is not expected to report further progress for it.
	pub fn is_terminal(&self) -> bool {
		match self {
			OrderStatus::Delivered
			| OrderStatus::Returned
			| OrderStatus::Cancelled
			| OrderStatus::Rejected
			| OrderStatus::Disposed
			| OrderStatus::CourierNotFound => true,
			OrderStatus::Pending
			| OrderStatus::Confirmed
			| OrderStatus::Scheduled
			| OrderStatus::Allocated
			| OrderStatus::PickingUp
			| OrderStatus::Picked
			| OrderStatus::OnHold
			| OrderStatus::DroppingOff
			| OrderStatus::ReturnInTransit => false,
		}
	}
}

impl fmt::Display for OrderStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.label())
	}
}

impl FromStr for OrderStatus {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		OrderStatus::ALL
			.iter()
			.copied()
			.find(|status| status.as_str() == s)
			.ok_or_else(|| format!("Unknown order status: {}", s))
	}
}
