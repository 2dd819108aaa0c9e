//! Common types for the shipping order system.
//!
//! This crate holds the data model shared by every other crate in the
//! workspace: the order status taxonomy, the order entity and its boundary
//! request, the courier wire format, and the configuration validation
//! helpers used by pluggable implementations.

/// API envelope types used by the HTTP boundary.
pub mod api;
/// Courier aggregator request and response payloads.
pub mod courier;
/// Order entity, boundary request, and acting user.
pub mod order;
/// Registry trait for self-registering implementations.
pub mod registry;
/// Redacted string wrapper for credentials.
pub mod secret_string;
/// Closed order status taxonomy.
pub mod status;
/// Storage namespaces.
pub mod storage;
/// Configuration validation types for implementation tables.
pub mod validation;

pub use api::{CancelOrderRequest, ErrorResponse};
pub use courier::{
	CourierAssignment, CourierInsurance, CourierItem, CourierOrder, CourierOrderRequest,
	Coordinate, OrderMetadata, TrackingEvent, TrackingInfo,
};
pub use order::{
	generate_order_number, is_valid_order_number, Actor, ContactAddress, Order, OrderRequest,
	OrderStatistics, PackageDetails, PackageType,
};
pub use registry::ImplementationRegistry;
pub use secret_string::SecretString;
pub use status::{OrderStatus, StatusSeverity};
pub use storage::StorageKey;
pub use validation::{ConfigSchema, Field, FieldType, Schema, ValidationError};
