//! Construction of an [`OrderEngine`] from configuration.
//!
//! Implementations are looked up by name in factory maps, so the binary
//! decides which backends are available and the configuration decides which
//! one is used.

use crate::engine::{EngineSettings, OrderEngine};
use shipping_config::Config;
use shipping_courier::{CourierError, CourierInterface, CourierService, RetryPolicy};
use shipping_storage::{StorageError, StorageInterface, StorageService};
use std::collections::HashMap;
use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BuilderError {
	#[error("Configuration error: {0}")]
	Config(String),
}

/// Factory functions for each pluggable component, keyed by config name.
pub struct ShippingFactories<SF, CF> {
	pub storage_factories: HashMap<String, SF>,
	pub courier_factories: HashMap<String, CF>,
}

pub struct EngineBuilder {
	config: Config,
}

impl EngineBuilder {
	pub fn new(config: Config) -> Self {
		Self { config }
	}

	pub fn build<SF, CF>(self, factories: ShippingFactories<SF, CF>) -> Result<OrderEngine, BuilderError>
	where
		SF: Fn(&toml::Value) -> Result<Box<dyn StorageInterface>, StorageError>,
		CF: Fn(&toml::Value) -> Result<Box<dyn CourierInterface>, CourierError>,
	{
		let storage_backend = load_primary(
			"storage",
			&self.config.storage.primary,
			&self.config.storage.implementations,
			&factories.storage_factories,
		)?;
		let storage = Arc::new(StorageService::new(storage_backend));

		let courier_impl = load_primary(
			"courier",
			&self.config.courier.primary,
			&self.config.courier.implementations,
			&factories.courier_factories,
		)?;
		let retry = RetryPolicy {
			max_retries: self.config.courier.max_retries,
			initial_interval: Duration::from_millis(self.config.courier.retry_initial_interval_ms),
		};
		let courier = Arc::new(CourierService::new(courier_impl, retry));

		let settings = EngineSettings::from_config(&self.config);
		tracing::info!(
			service_id = %self.config.service.id,
			max_conflict_retries = settings.max_conflict_retries,
			reconcile_interval_seconds = settings.reconcile_interval.as_secs(),
			"Order engine built"
		);
		Ok(OrderEngine::new(storage, courier, settings))
	}
}

/// Instantiates the primary implementation of a component.
///
/// The other configured implementations are left alone, so a secondary
/// table with placeholder credentials does not prevent startup.
fn load_primary<T, E, F>(
	component: &str,
	primary: &str,
	configs: &HashMap<String, toml::Value>,
	factories: &HashMap<String, F>,
) -> Result<T, BuilderError>
where
	E: Display,
	F: Fn(&toml::Value) -> Result<T, E>,
{
	for name in configs.keys().filter(|name| name.as_str() != primary) {
		tracing::info!(component, implementation = %name, enabled = false, "Skipped");
	}

	let config = configs.get(primary).ok_or_else(|| {
		BuilderError::Config(format!(
			"Primary {} '{}' has no configuration table",
			component, primary
		))
	})?;
	let factory = factories.get(primary).ok_or_else(|| {
		BuilderError::Config(format!(
			"Primary {} '{}' has no registered implementation",
			component, primary
		))
	})?;

	match factory(config) {
		Ok(implementation) => {
			tracing::info!(component, implementation = %primary, enabled = true, "Loaded");
			Ok(implementation)
		},
		Err(e) => {
			tracing::error!(
				component,
				implementation = %primary,
				error = %e,
				"Failed to create implementation"
			);
			Err(BuilderError::Config(format!(
				"Failed to create {} implementation '{}': {}",
				component, primary, e
			)))
		},
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use shipping_types::{Actor, OrderStatus};
	use std::str::FromStr;

	fn factories() -> ShippingFactories<shipping_storage::StorageFactory, shipping_courier::CourierFactory>
	{
		ShippingFactories {
			storage_factories: shipping_storage::get_all_implementations()
				.into_iter()
				.map(|(name, factory)| (name.to_string(), factory))
				.collect(),
			courier_factories: shipping_courier::get_all_implementations()
				.into_iter()
				.map(|(name, factory)| (name.to_string(), factory))
				.collect(),
		}
	}

	const CONFIG: &str = r#"
[service]
id = "shipping-test"
organization = "Acme Logistics"

[storage]
primary = "memory"
[storage.implementations.memory]

[courier]
primary = "mock"
[courier.implementations.mock]
price = 20000
insurance_fee = 0
"#;

	#[tokio::test]
	async fn test_build_uses_primary_implementations() {
		let config = Config::from_str(CONFIG).unwrap();
		let engine = EngineBuilder::new(config).build(factories()).unwrap();
		assert_eq!(engine.settings().organization, "Acme Logistics");

		let mut request = crate::engine::test_support::request();
		request.auto_confirm = true;
		let order = engine.create_order(&Actor::user(1), request).await.unwrap();
		assert_eq!(order.status, OrderStatus::Confirmed);
		assert_eq!(order.shipping_cost, rust_decimal::Decimal::from(20000));
	}

	#[test]
	fn test_invalid_implementation_config_fails() {
		let config = Config::from_str(&CONFIG.replace("price = 20000", "price = -1")).unwrap();
		let err = EngineBuilder::new(config).build(factories()).unwrap_err();
		assert!(err.to_string().contains("mock"));

		let engine = EngineBuilder::new(Config::from_str(CONFIG).unwrap())
			.build(factories())
			.unwrap();
		assert!(format!("{:?}", engine).contains("Acme Logistics"));
	}

	#[test]
	fn test_unregistered_primary_fails() {
		let config = Config::from_str(&CONFIG.replace("primary = \"mock\"", "primary = \"fedex\"")
			.replace("[courier.implementations.mock]", "[courier.implementations.fedex]"))
		.unwrap();
		let err = EngineBuilder::new(config).build(factories()).unwrap_err();
		assert!(err.to_string().contains("Primary courier 'fedex'"));
	}

	#[test]
	fn test_secondary_implementations_are_not_built() {
		let config = Config::from_str(&format!(
			"{}\n[courier.implementations.biteship]\napi_key = \"\"\n",
			CONFIG
		))
		.unwrap();
		assert!(EngineBuilder::new(config).build(factories()).is_ok());
	}
}
