//! Configuration for the shipping order service.
//!
//! Configuration is read from a single TOML file. String values may refer to
//! environment variables as `${NAME}` or `${NAME:-default}`; references are
//! substituted before parsing. The parsed document is checked by
//! [`Config::validate`] so that an unusable configuration fails at startup.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),
	#[error("Configuration error: {0}")]
	Parse(String),
	#[error("Validation error: {0}")]
	Validation(String),
}

impl From<toml::de::Error> for ConfigError {
	fn from(err: toml::de::Error) -> Self {
		ConfigError::Parse(err.message().to_string())
	}
}

/// Root of the configuration file.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
	pub service: ServiceConfig,
	pub storage: StorageConfig,
	pub courier: CourierConfig,
	#[serde(default)]
	pub engine: EngineConfig,
	pub api: Option<ApiConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServiceConfig {
	/// Instance identifier, used in logs.
	pub id: String,
	/// Sent to the courier as the shipper organization.
	#[serde(default = "default_organization")]
	pub organization: String,
}

fn default_organization() -> String {
	"Shipping Service".to_string()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
	pub primary: String,
	pub implementations: HashMap<String, toml::Value>,
}

/// Courier aggregator settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CourierConfig {
	pub primary: String,
	pub implementations: HashMap<String, toml::Value>,
	/// Attempts after the first one for read operations.
	#[serde(default = "default_max_retries")]
	pub max_retries: u32,
	#[serde(default = "default_retry_initial_interval_ms")]
	pub retry_initial_interval_ms: u64,
}

fn default_max_retries() -> u32 {
	3
}

fn default_retry_initial_interval_ms() -> u64 {
	200
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EngineConfig {
	/// How often refresh and track re-run after losing a write race.
	#[serde(default = "default_max_conflict_retries")]
	pub max_conflict_retries: u32,
	/// Period of the background status sweep.
	#[serde(default = "default_reconcile_interval_seconds")]
	pub reconcile_interval_seconds: u64,
}

impl Default for EngineConfig {
	fn default() -> Self {
		Self {
			max_conflict_retries: default_max_conflict_retries(),
			reconcile_interval_seconds: default_reconcile_interval_seconds(),
		}
	}
}

fn default_max_conflict_retries() -> u32 {
	3
}

fn default_reconcile_interval_seconds() -> u64 {
	300
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiConfig {
	#[serde(default)]
	pub enabled: bool,
	#[serde(default = "default_api_host")]
	pub host: String,
	#[serde(default = "default_api_port")]
	pub port: u16,
	pub cors: Option<CorsConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CorsConfig {
	pub allowed_origins: Vec<String>,
}

fn default_api_host() -> String {
	"127.0.0.1".to_string()
}

fn default_api_port() -> u16 {
	3000
}

/// Substitutes `${NAME}` and `${NAME:-default}` references.
pub(crate) fn resolve_env_vars(input: &str) -> Result<String, ConfigError> {
	const MAX_INPUT_SIZE: usize = 1024 * 1024;
	if input.len() > MAX_INPUT_SIZE {
		return Err(ConfigError::Validation(format!(
			"Configuration file too large: {} bytes (max: {} bytes)",
			input.len(),
			MAX_INPUT_SIZE
		)));
	}

	let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]{0,127})(?::-([^}]{0,256}))?\}")
		.map_err(|e| ConfigError::Parse(format!("Regex error: {}", e)))?;

	let mut result = String::with_capacity(input.len());
	let mut last = 0;
	for cap in re.captures_iter(input) {
		let (Some(whole), Some(name)) = (cap.get(0), cap.get(1)) else {
			continue;
		};
		let value = match (std::env::var(name.as_str()), cap.get(2)) {
			(Ok(value), _) => value,
			(Err(_), Some(default)) => default.as_str().to_string(),
			(Err(_), None) => {
				return Err(ConfigError::Validation(format!(
					"Environment variable '{}' not found",
					name.as_str()
				)))
			},
		};
		result.push_str(&input[last..whole.start()]);
		result.push_str(&value);
		last = whole.end();
	}
	result.push_str(&input[last..]);
	Ok(result)
}

impl Config {
	pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
		let content = tokio::fs::read_to_string(path.as_ref()).await?;
		content.parse()
	}

	fn validate(&self) -> Result<(), ConfigError> {
		if self.service.id.trim().is_empty() {
			return Err(ConfigError::Validation("Service ID cannot be empty".into()));
		}

		validate_primary("storage", &self.storage.primary, &self.storage.implementations)?;
		validate_primary("courier", &self.courier.primary, &self.courier.implementations)?;

		if self.courier.max_retries > 10 {
			return Err(ConfigError::Validation(
				"courier.max_retries cannot exceed 10".into(),
			));
		}
		if self.courier.retry_initial_interval_ms == 0 {
			return Err(ConfigError::Validation(
				"courier.retry_initial_interval_ms must be greater than 0".into(),
			));
		}

		if self.engine.max_conflict_retries == 0 {
			return Err(ConfigError::Validation(
				"engine.max_conflict_retries must be at least 1".into(),
			));
		}
		if self.engine.reconcile_interval_seconds == 0
			|| self.engine.reconcile_interval_seconds > 86400
		{
			return Err(ConfigError::Validation(
				"engine.reconcile_interval_seconds must be between 1 and 86400".into(),
			));
		}

		if let Some(api) = &self.api {
			if api.enabled && api.port == 0 {
				return Err(ConfigError::Validation("api.port cannot be 0".into()));
			}
		}

		Ok(())
	}
}

fn validate_primary(
	section: &str,
	primary: &str,
	implementations: &HashMap<String, toml::Value>,
) -> Result<(), ConfigError> {
	if implementations.is_empty() {
		return Err(ConfigError::Validation(format!(
			"At least one {} implementation must be configured",
			section
		)));
	}
	if primary.is_empty() {
		return Err(ConfigError::Validation(format!(
			"{} primary implementation cannot be empty",
			section
		)));
	}
	if !implementations.contains_key(primary) {
		return Err(ConfigError::Validation(format!(
			"Primary {} '{}' not found in implementations",
			section, primary
		)));
	}
	Ok(())
}

impl FromStr for Config {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let resolved = resolve_env_vars(s)?;
		let config: Config = toml::from_str(&resolved)?;
		config.validate()?;
		Ok(config)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	const MINIMAL: &str = r#"
[service]
id = "shipping-test"

[storage]
primary = "memory"
[storage.implementations.memory]

[courier]
primary = "mock"
[courier.implementations.mock]
"#;

	#[test]
	fn test_env_var_resolution() {
		std::env::set_var("SHIPPING_TEST_HOST", "localhost");
		std::env::set_var("SHIPPING_TEST_PORT", "8080");

		let result = resolve_env_vars("host = \"${SHIPPING_TEST_HOST}:${SHIPPING_TEST_PORT}\"").unwrap();
		assert_eq!(result, "host = \"localhost:8080\"");

		std::env::remove_var("SHIPPING_TEST_HOST");
		std::env::remove_var("SHIPPING_TEST_PORT");
	}

	#[test]
	fn test_env_var_with_default() {
		let result = resolve_env_vars("url = \"${SHIPPING_MISSING_URL:-https://api.biteship.com/v1}\"").unwrap();
		assert_eq!(result, "url = \"https://api.biteship.com/v1\"");
	}

	#[test]
	fn test_missing_env_var_error() {
		let err = resolve_env_vars("api_key = \"${SHIPPING_MISSING_KEY}\"").unwrap_err();
		assert!(err.to_string().contains("SHIPPING_MISSING_KEY"));
	}

	#[test]
	fn test_defaults_applied() {
		let config: Config = MINIMAL.parse().unwrap();
		assert_eq!(config.service.id, "shipping-test");
		assert_eq!(config.courier.max_retries, 3);
		assert_eq!(config.courier.retry_initial_interval_ms, 200);
		assert_eq!(config.engine.max_conflict_retries, 3);
		assert_eq!(config.engine.reconcile_interval_seconds, 300);
		assert!(config.api.is_none());
	}

	#[test]
	fn test_primary_must_be_configured() {
		let input = MINIMAL.replace("primary = \"mock\"", "primary = \"biteship\"");
		let err = input.parse::<Config>().unwrap_err();
		assert!(err.to_string().contains("Primary courier 'biteship'"));
	}

	#[test]
	fn test_engine_bounds() {
		let input = format!("{}\n[engine]\nreconcile_interval_seconds = 0\n", MINIMAL);
		assert!(matches!(
			input.parse::<Config>(),
			Err(ConfigError::Validation(_))
		));
	}

	#[tokio::test]
	async fn test_from_file() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("config.toml");
		let content = format!(
			"{}\n[api]\nenabled = true\nport = 8081\n",
			MINIMAL
		);
		tokio::fs::write(&path, content).await.unwrap();

		let config = Config::from_file(&path).await.unwrap();
		let api = config.api.unwrap();
		assert!(api.enabled);
		assert_eq!(api.port, 8081);
		assert_eq!(api.host, "127.0.0.1");
	}
}
