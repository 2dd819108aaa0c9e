//! Translation of courier status strings into the local taxonomy.

use shipping_types::OrderStatus;

/// A courier status string, classified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExternalStatus {
	Known(OrderStatus),
	Unknown(String),
}

pub fn classify_external_status(external: &str) -> ExternalStatus {
	let status = match external {
		"confirmed" => OrderStatus::Confirmed,
		"scheduled" => OrderStatus::Scheduled,
		"allocated" => OrderStatus::Allocated,
		"picking_up" => OrderStatus::PickingUp,
		"picked" => OrderStatus::Picked,
		"cancelled" => OrderStatus::Cancelled,
		"on_hold" => OrderStatus::OnHold,
		"dropping_off" => OrderStatus::DroppingOff,
		"return_in_transit" => OrderStatus::ReturnInTransit,
		"returned" => OrderStatus::Returned,
		"rejected" => OrderStatus::Rejected,
		"disposed" => OrderStatus::Disposed,
		"courier_not_found" => OrderStatus::CourierNotFound,
		"delivered" => OrderStatus::Delivered,
		other => return ExternalStatus::Unknown(other.to_string()),
	};
	ExternalStatus::Known(status)
}

/// Maps a courier status; anything unrecognised becomes `Pending`.
///
/// The engine itself uses [`classify_external_status`] so that unknown
/// strings leave the stored status alone.
pub fn map_external_status(external: &str) -> OrderStatus {
	match classify_external_status(external) {
		ExternalStatus::Known(status) => status,
		ExternalStatus::Unknown(_) => OrderStatus::Pending,
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_every_non_pending_status_maps_to_itself() {
		for status in OrderStatus::ALL {
			if status == OrderStatus::Pending {
				continue;
			}
			assert_eq!(map_external_status(status.as_str()), status);
			assert_eq!(
				classify_external_status(status.as_str()),
				ExternalStatus::Known(status)
			);
		}
	}

	#[test]
	fn test_unknown_strings_fall_back_to_pending() {
		for external in ["", "in_transit", "DELIVERED", "pending"] {
			assert_eq!(map_external_status(external), OrderStatus::Pending);
			assert_eq!(
				classify_external_status(external),
				ExternalStatus::Unknown(external.to_string())
			);
		}
	}
}
