//! Persistent storage for the shipping order service.
//!
//! Backends implement a small byte-oriented key/value interface with an
//! atomic compare-and-swap. [`StorageService`] layers typed JSON access on
//! top of it, using keys of the form `namespace:id`.

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use shipping_types::{ConfigSchema, ImplementationRegistry, StorageKey};
use thiserror::Error;

pub mod implementations {
	pub mod file;
	pub mod memory;
}

#[derive(Debug, Error)]
pub enum StorageError {
	#[error("Not found")]
	NotFound,
	#[error("Serialization error: {0}")]
	Serialization(String),
	#[error("Backend error: {0}")]
	Backend(String),
	#[error("Configuration error: {0}")]
	Configuration(String),
}

/// Low-level interface every storage backend provides.
#[async_trait]
pub trait StorageInterface: Send + Sync {
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError>;

	async fn set_bytes(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError>;

	/// Deleting a missing key is not an error.
	async fn delete(&self, key: &str) -> Result<(), StorageError>;

	async fn exists(&self, key: &str) -> Result<bool, StorageError>;

	/// Ids stored under `namespace`, without the `namespace:` prefix.
	async fn list_keys(&self, namespace: &str) -> Result<Vec<String>, StorageError>;

	/// Writes `new` only if the current value equals `expected`.
	///
	/// `expected = None` means the key must not exist. Returns `false` without
	/// writing when the current value differs.
	async fn compare_and_swap(
		&self,
		key: &str,
		expected: Option<&[u8]>,
		new: Vec<u8>,
	) -> Result<bool, StorageError>;

	fn config_schema(&self) -> Box<dyn ConfigSchema>;
}

pub type StorageFactory = fn(&toml::Value) -> Result<Box<dyn StorageInterface>, StorageError>;

pub trait StorageRegistry: ImplementationRegistry<Factory = StorageFactory> {}

/// All storage backends, as `(config name, factory)` pairs.
pub fn get_all_implementations() -> Vec<(&'static str, StorageFactory)> {
	use implementations::{file, memory};

	vec![
		(file::Registry::NAME, file::Registry::factory()),
		(memory::Registry::NAME, memory::Registry::factory()),
	]
}

fn key_for(namespace: StorageKey, id: &str) -> String {
	format!("{}:{}", namespace.as_str(), id)
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, StorageError> {
	serde_json::to_vec(value).map_err(|e| StorageError::Serialization(e.to_string()))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, StorageError> {
	serde_json::from_slice(bytes).map_err(|e| StorageError::Serialization(e.to_string()))
}

/// Typed JSON access over a storage backend.
pub struct StorageService {
	backend: Box<dyn StorageInterface>,
}

impl StorageService {
	pub fn new(backend: Box<dyn StorageInterface>) -> Self {
		Self { backend }
	}

	pub async fn store<T: Serialize>(
		&self,
		namespace: StorageKey,
		id: &str,
		data: &T,
	) -> Result<(), StorageError> {
		self.backend
			.set_bytes(&key_for(namespace, id), encode(data)?)
			.await
	}

	pub async fn retrieve<T: DeserializeOwned>(
		&self,
		namespace: StorageKey,
		id: &str,
	) -> Result<T, StorageError> {
		let bytes = self.backend.get_bytes(&key_for(namespace, id)).await?;
		decode(&bytes)
	}

	/// Returns `None` instead of `NotFound`.
	pub async fn find<T: DeserializeOwned>(
		&self,
		namespace: StorageKey,
		id: &str,
	) -> Result<Option<T>, StorageError> {
		match self.retrieve(namespace, id).await {
			Ok(value) => Ok(Some(value)),
			Err(StorageError::NotFound) => Ok(None),
			Err(e) => Err(e),
		}
	}

	pub async fn remove(&self, namespace: StorageKey, id: &str) -> Result<(), StorageError> {
		self.backend.delete(&key_for(namespace, id)).await
	}

	pub async fn exists(&self, namespace: StorageKey, id: &str) -> Result<bool, StorageError> {
		self.backend.exists(&key_for(namespace, id)).await
	}

	/// Every value in a namespace, paired with its id.
	///
	/// Entries removed between listing and reading are skipped.
	pub async fn retrieve_all<T: DeserializeOwned>(
		&self,
		namespace: StorageKey,
	) -> Result<Vec<(String, T)>, StorageError> {
		let mut values = Vec::new();
		for id in self.backend.list_keys(namespace.as_str()).await? {
			if let Some(value) = self.find(namespace, &id).await? {
				values.push((id, value));
			}
		}
		Ok(values)
	}

	/// Stores `data` only if nothing is stored under the key yet.
	pub async fn insert_if_absent<T: Serialize>(
		&self,
		namespace: StorageKey,
		id: &str,
		data: &T,
	) -> Result<bool, StorageError> {
		self.backend
			.compare_and_swap(&key_for(namespace, id), None, encode(data)?)
			.await
	}

	/// Replaces the stored value with `data` if `check` accepts the value
	/// currently stored.
	///
	/// Returns `Ok(false)` when the check rejects it, `NotFound` when there
	/// is nothing to replace. A concurrent write between read and swap makes
	/// the check run again against the newer value.
	pub async fn update_if<T, F>(
		&self,
		namespace: StorageKey,
		id: &str,
		data: &T,
		check: F,
	) -> Result<bool, StorageError>
	where
		T: Serialize + DeserializeOwned,
		F: Fn(&T) -> bool,
	{
		let key = key_for(namespace, id);
		let new = encode(data)?;
		loop {
			let current = self.backend.get_bytes(&key).await?;
			if !check(&decode::<T>(&current)?) {
				return Ok(false);
			}
			if self
				.backend
				.compare_and_swap(&key, Some(&current), new.clone())
				.await?
			{
				return Ok(true);
			}
		}
	}

	/// Atomically replaces the value with `f(current)` and returns the new value.
	pub async fn modify<T, F>(
		&self,
		namespace: StorageKey,
		id: &str,
		f: F,
	) -> Result<T, StorageError>
	where
		T: Serialize + DeserializeOwned,
		F: Fn(Option<T>) -> T,
	{
		let key = key_for(namespace, id);
		loop {
			let current = match self.backend.get_bytes(&key).await {
				Ok(bytes) => Some(bytes),
				Err(StorageError::NotFound) => None,
				Err(e) => return Err(e),
			};
			let previous = current.as_deref().map(decode::<T>).transpose()?;
			let next = f(previous);
			if self
				.backend
				.compare_and_swap(&key, current.as_deref(), encode(&next)?)
				.await?
			{
				return Ok(next);
			}
		}
	}
}
