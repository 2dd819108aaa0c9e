//! Core of the shipping order service.
//!
//! The [`OrderEngine`] owns the order lifecycle: creation, confirmation with
//! the courier aggregator, cancellation, status refresh and tracking. It
//! persists orders through a versioned [`state::OrderStore`] and reaches the
//! courier only through [`shipping_courier::CourierService`].

pub mod builder;
pub mod engine;
pub mod reconcile;
pub mod recovery;
pub mod state;

pub use builder::{BuilderError, EngineBuilder, ShippingFactories};
pub use engine::{EngineError, EngineSettings, OrderEngine};
pub use reconcile::{classify_external_status, map_external_status, ExternalStatus};
pub use recovery::ReconcileReport;
