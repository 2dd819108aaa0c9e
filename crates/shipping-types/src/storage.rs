//! Storage namespaces used by the order repository.

use std::fmt;
use std::str::FromStr;

/// Namespace part of a `namespace:id` storage key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageKey {
	/// Order records keyed by numeric id.
	Orders,
	/// Uniqueness index, order number to order id.
	OrderNumbers,
	/// Monotonic counters, e.g. the next order id.
	Sequences,
	/// Journal of courier confirmations that have not been committed yet.
	Confirmations,
}

impl StorageKey {
	pub fn as_str(&self) -> &'static str {
		match self {
			StorageKey::Orders => "orders",
			StorageKey::OrderNumbers => "order_numbers",
			StorageKey::Sequences => "sequences",
			StorageKey::Confirmations => "confirmations",
		}
	}

	pub fn all() -> impl Iterator<Item = Self> {
		[
			Self::Orders,
			Self::OrderNumbers,
			Self::Sequences,
			Self::Confirmations,
		]
		.into_iter()
	}
}

impl fmt::Display for StorageKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for StorageKey {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Self::all()
			.find(|key| key.as_str() == s)
			.ok_or_else(|| format!("Unknown storage namespace: {}", s))
	}
}
