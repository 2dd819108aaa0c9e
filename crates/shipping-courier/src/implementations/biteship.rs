//! Biteship courier aggregator over HTTPS.

use crate::{
	CourierError, CourierFactory, CourierInterface, CourierOperation, CourierRegistry,
};
use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Method, Url};
use serde_json::{json, Value};
use shipping_types::{
	ConfigSchema, CourierOrder, CourierOrderRequest, Field, FieldType, ImplementationRegistry,
	Schema, SecretString, TrackingInfo, ValidationError,
};
use std::time::{Duration, Instant};

const DEFAULT_BASE_URL: &str = "https://api.biteship.com/v1";
const DEFAULT_TIMEOUT_SECONDS: u64 = 30;

pub struct BiteshipCourier {
	client: reqwest::Client,
	base_url: Url,
	api_key: SecretString,
	timeout: Duration,
}

impl BiteshipCourier {
	pub fn new(
		base_url: impl Into<String>,
		api_key: SecretString,
		timeout: Duration,
	) -> Result<Self, CourierError> {
		if api_key.is_empty() {
			return Err(CourierError::configuration(
				"Biteship API key is not configured",
			));
		}
		let base_url = Url::parse(base_url.into().trim_end_matches('/'))
			.map_err(|e| CourierError::configuration(format!("Invalid base_url: {}", e)))?;
		if base_url.cannot_be_a_base() {
			return Err(CourierError::configuration("Invalid base_url: not a base URL"));
		}
		let client = reqwest::Client::builder()
			.timeout(timeout)
			.build()
			.map_err(|e| CourierError::configuration(e.to_string()))?;

		Ok(Self {
			client,
			base_url,
			api_key,
			timeout,
		})
	}

	/// Appends `segments` to the base URL, each escaped as a single segment.
	fn endpoint(&self, segments: &[&str]) -> Url {
		let mut url = self.base_url.clone();
		if let Ok(mut path) = url.path_segments_mut() {
			path.pop_if_empty().extend(segments);
		}
		url
	}

	async fn send(
		&self,
		operation: CourierOperation,
		method: Method,
		segments: &[&str],
		body: Option<Value>,
	) -> Result<Value, CourierError> {
		let url = self.endpoint(segments);
		tracing::info!(%method, %url, "Sending courier request");
		if let Some(body) = &body {
			tracing::debug!(%url, payload = %body, "Courier request payload");
		}

		let started = Instant::now();
		let mut request = self
			.client
			.request(method.clone(), url.clone())
			.header(AUTHORIZATION, self.api_key.expose_secret())
			.header(CONTENT_TYPE, "application/json");
		if let Some(body) = &body {
			request = request.json(body);
		}

		let response = request.send().await.map_err(|e| {
			if e.is_timeout() {
				CourierError::timeout(
					operation,
					format!("No response within {}s", self.timeout.as_secs_f64()),
				)
			} else {
				CourierError::transport(operation, e.to_string())
			}
		})?;

		let status = response.status().as_u16();
		let text = response
			.text()
			.await
			.map_err(|e| CourierError::transport(operation, e.to_string()))?;
		tracing::info!(
			%method,
			%url,
			status,
			elapsed_ms = started.elapsed().as_millis() as u64,
			"Courier response received"
		);

		let payload = serde_json::from_str::<Value>(&text).ok();
		if !(200..300).contains(&status) {
			let message = describe_error(status, payload.as_ref(), &text);
			tracing::warn!(%operation, status, %message, "Courier rejected request");
			return Err(CourierError::status(operation, status, message));
		}
		payload.ok_or_else(|| CourierError::malformed(operation, "Response body is not JSON"))
	}

	fn order_from(operation: CourierOperation, body: Value) -> Result<CourierOrder, CourierError> {
		CourierOrder::from_json(body).map_err(|e| CourierError::malformed(operation, e.to_string()))
	}

	fn tracking_from(
		operation: CourierOperation,
		body: Value,
	) -> Result<TrackingInfo, CourierError> {
		TrackingInfo::from_json(body).map_err(|e| CourierError::malformed(operation, e.to_string()))
	}
}

/// Turns an error body into a message, naming the known credential failures.
fn describe_error(status: u16, payload: Option<&Value>, raw: &str) -> String {
	let code = payload.and_then(|p| {
		let code = p.pointer("/error/code").or_else(|| p.get("code"))?;
		match code {
			Value::String(s) => Some(s.clone()),
			Value::Number(n) => Some(n.to_string()),
			_ => None,
		}
	});

	let friendly = match code.as_deref() {
		Some("40000001") => Some("Authentication failed. Please check your API key."),
		Some("40101001") => Some("Authorization failed. Insufficient permissions."),
		Some("40101002") => Some("No account found with associated key."),
		Some("40101003") => Some("Cannot process authorization."),
		Some("40301001") => Some("No match token for this key."),
		Some("40301002") => Some("User information not found."),
		_ => None,
	};
	if let Some(friendly) = friendly {
		return friendly.to_string();
	}

	let message = payload
		.and_then(|p| {
			p.pointer("/error/message")
				.or_else(|| p.get("error").filter(|e| e.is_string()))
				.or_else(|| p.get("message"))
				.and_then(Value::as_str)
				.map(str::to_string)
		})
		.or_else(|| (!raw.trim().is_empty()).then(|| raw.trim().to_string()))
		.unwrap_or_else(|| "Unknown error".to_string());
	format!("API Error ({}): {}", status, message)
}

#[async_trait]
impl CourierInterface for BiteshipCourier {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(BiteshipSchema)
	}

	async fn create_order(
		&self,
		request: &CourierOrderRequest,
	) -> Result<CourierOrder, CourierError> {
		let operation = CourierOperation::CreateOrder;
		let body = serde_json::to_value(request)
			.map_err(|e| CourierError::malformed(operation, e.to_string()))?;
		let response = self.send(operation, Method::POST, &["orders"], Some(body)).await?;
		let order = Self::order_from(operation, response)?;
		if order.id.as_deref().is_none_or(str::is_empty) {
			return Err(CourierError::malformed(
				operation,
				"Response did not include an order id",
			));
		}
		Ok(order)
	}

	async fn get_order(&self, external_id: &str) -> Result<CourierOrder, CourierError> {
		let operation = CourierOperation::GetOrder;
		let response = self
			.send(operation, Method::GET, &["orders", external_id], None)
			.await?;
		Self::order_from(operation, response)
	}

	async fn cancel_order(
		&self,
		external_id: &str,
		reason: Option<&str>,
	) -> Result<CourierOrder, CourierError> {
		let operation = CourierOperation::CancelOrder;
		let body = match reason {
			Some(reason) => json!({ "cancellation_reason": reason }),
			None => json!({}),
		};
		let response = self
			.send(operation, Method::POST, &["orders", external_id, "cancel"], Some(body))
			.await?;
		Self::order_from(operation, response)
	}

	async fn track(&self, tracking_id: &str) -> Result<TrackingInfo, CourierError> {
		let operation = CourierOperation::Track;
		let response = self
			.send(operation, Method::GET, &["trackings", tracking_id], None)
			.await?;
		Self::tracking_from(operation, response)
	}

	async fn public_track(
		&self,
		waybill_id: &str,
		courier_code: &str,
	) -> Result<TrackingInfo, CourierError> {
		let operation = CourierOperation::PublicTrack;
		let segments = ["trackings", waybill_id, "couriers", courier_code];
		let response = self.send(operation, Method::GET, &segments, None).await?;
		Self::tracking_from(operation, response)
	}
}

pub struct BiteshipSchema;

impl ConfigSchema for BiteshipSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(
			vec![Field::new("api_key", FieldType::String).with_validator(|value| {
				match value.as_str() {
					Some(key) if !key.trim().is_empty() => Ok(()),
					_ => Err("api_key cannot be empty".to_string()),
				}
			})],
			vec![
				Field::new("base_url", FieldType::String).with_validator(|value| {
					match value.as_str() {
						Some(url) if url.starts_with("http://") || url.starts_with("https://") => {
							Ok(())
						},
						_ => Err("base_url must start with http:// or https://".to_string()),
					}
				}),
				Field::new(
					"timeout_seconds",
					FieldType::Integer {
						min: Some(1),
						max: Some(300),
					},
				),
			],
		);
		schema.validate(config)
	}
}

/// Creates the Biteship client.
///
/// Configuration parameters:
/// - `api_key`: credential sent in the `authorization` header (required)
/// - `base_url`: API root (default: `https://api.biteship.com/v1`)
/// - `timeout_seconds`: per request timeout (default: 30)
pub fn create_courier(config: &toml::Value) -> Result<Box<dyn CourierInterface>, CourierError> {
	BiteshipSchema
		.validate(config)
		.map_err(|e| CourierError::configuration(e.to_string()))?;

	let api_key = config
		.get("api_key")
		.and_then(|v| v.as_str())
		.map(SecretString::from)
		.ok_or_else(|| CourierError::configuration("api_key is required"))?;
	let base_url = config
		.get("base_url")
		.and_then(|v| v.as_str())
		.unwrap_or(DEFAULT_BASE_URL);
	let timeout = config
		.get("timeout_seconds")
		.and_then(|v| v.as_integer())
		.map(|secs| secs as u64)
		.unwrap_or(DEFAULT_TIMEOUT_SECONDS);

	Ok(Box::new(BiteshipCourier::new(
		base_url,
		api_key,
		Duration::from_secs(timeout),
	)?))
}

pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "biteship";
	type Factory = CourierFactory;

	fn factory() -> Self::Factory {
		create_courier
	}
}

impl CourierRegistry for Registry {}
