//! Registry of every storage and courier implementation compiled into the
//! binary.

use shipping_config::Config;
use shipping_core::{EngineBuilder, OrderEngine, ShippingFactories};
use shipping_courier::CourierFactory;
use shipping_storage::StorageFactory;
use std::collections::HashMap;
use std::sync::OnceLock;

pub struct FactoryRegistry {
	pub storage: HashMap<String, StorageFactory>,
	pub courier: HashMap<String, CourierFactory>,
}

impl FactoryRegistry {
	pub fn new() -> Self {
		Self {
			storage: HashMap::new(),
			courier: HashMap::new(),
		}
	}

	pub fn register_storage(&mut self, name: impl Into<String>, factory: StorageFactory) {
		self.storage.insert(name.into(), factory);
	}

	pub fn register_courier(&mut self, name: impl Into<String>, factory: CourierFactory) {
		self.courier.insert(name.into(), factory);
	}
}

static REGISTRY: OnceLock<FactoryRegistry> = OnceLock::new();

pub fn get_registry() -> &'static FactoryRegistry {
	REGISTRY.get_or_init(|| {
		let mut registry = FactoryRegistry::new();

		for (name, factory) in shipping_storage::get_all_implementations() {
			tracing::debug!("Registering storage implementation: {}", name);
			registry.register_storage(name, factory);
		}

		for (name, factory) in shipping_courier::get_all_implementations() {
			tracing::debug!("Registering courier implementation: {}", name);
			registry.register_courier(name, factory);
		}

		registry
	})
}

/// Picks the factories for the implementations named in the config,
/// failing on names nothing is registered under.
macro_rules! build_factories {
	($registry:expr, $config_impls:expr, $registry_field:ident, $type_name:literal) => {{
		let mut factories = HashMap::new();
		for name in $config_impls.keys() {
			if let Some(factory) = $registry.$registry_field.get(name) {
				factories.insert(name.clone(), *factory);
			} else {
				let mut available: Vec<_> = $registry.$registry_field.keys().cloned().collect();
				available.sort();
				return Err(format!(
					"Unknown {} implementation '{}'. Available: [{}]",
					$type_name,
					name,
					available.join(", ")
				)
				.into());
			}
		}
		factories
	}};
}

pub fn build_engine_from_config(config: Config) -> Result<OrderEngine, Box<dyn std::error::Error>> {
	let registry = get_registry();

	let storage_factories =
		build_factories!(registry, config.storage.implementations, storage, "storage");
	let courier_factories =
		build_factories!(registry, config.courier.implementations, courier, "courier");

	let factories = ShippingFactories {
		storage_factories,
		courier_factories,
	};
	Ok(EngineBuilder::new(config).build(factories)?)
}
