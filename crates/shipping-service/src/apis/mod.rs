//! Request handlers and their shared extractors.

pub mod orders;

use axum::{
	extract::FromRequestParts,
	http::{request::Parts, StatusCode},
	response::{IntoResponse, Json, Response},
};
use serde_json::json;
use shipping_core::EngineError;
use shipping_types::{Actor, ErrorResponse};

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_EMAIL_HEADER: &str = "x-user-email";
pub const USER_ADMIN_HEADER: &str = "x-user-admin";

/// Error body plus status code.
#[derive(Debug)]
pub struct ApiError {
	pub status: StatusCode,
	pub body: ErrorResponse,
}

impl ApiError {
	pub fn new(status: StatusCode, error: &str, message: impl Into<String>) -> Self {
		Self {
			status,
			body: ErrorResponse {
				error: error.to_string(),
				message: message.into(),
				details: None,
			},
		}
	}

	fn with_details(mut self, details: serde_json::Value) -> Self {
		self.body.details = Some(details);
		self
	}
}

impl From<EngineError> for ApiError {
	fn from(err: EngineError) -> Self {
		let message = err.to_string();
		match err {
			EngineError::Validation(errors) => {
				ApiError::new(StatusCode::UNPROCESSABLE_ENTITY, "validation", message)
					.with_details(serde_json::to_value(&errors).unwrap_or_default())
			},
			EngineError::Conflict { status, .. } => {
				let api = ApiError::new(StatusCode::CONFLICT, "conflict", message);
				match status {
					Some(status) => api.with_details(json!({ "status": status })),
					None => api,
				}
			},
			EngineError::Precondition(_) => {
				ApiError::new(StatusCode::UNPROCESSABLE_ENTITY, "precondition", message)
			},
			EngineError::Gateway(e) => ApiError::new(StatusCode::BAD_GATEWAY, "gateway", message)
				.with_details(json!({ "http_status": e.http_status })),
			EngineError::Storage(_) => {
				tracing::error!(error = %message, "Storage failure");
				ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "storage", message)
			},
			EngineError::NotFound(_) => ApiError::new(StatusCode::NOT_FOUND, "not_found", message),
			EngineError::Forbidden(_) => ApiError::new(StatusCode::FORBIDDEN, "forbidden", message),
		}
	}
}

impl IntoResponse for ApiError {
	fn into_response(self) -> Response {
		(self.status, Json(self.body)).into_response()
	}
}

/// The acting user, as asserted by the upstream gateway in request headers.
#[derive(Debug, Clone)]
pub struct CurrentActor(pub Actor);

impl<S> FromRequestParts<S> for CurrentActor
where
	S: Send + Sync,
{
	type Rejection = ApiError;

	async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
		let user_id = header(parts, USER_ID_HEADER)
			.and_then(|value| value.parse::<u64>().ok())
			.ok_or_else(|| {
				ApiError::new(
					StatusCode::UNAUTHORIZED,
					"unauthorized",
					format!("Missing or invalid {} header", USER_ID_HEADER),
				)
			})?;
		let is_admin = header(parts, USER_ADMIN_HEADER).is_some_and(|v| v == "true" || v == "1");

		let mut actor = if is_admin {
			Actor::admin(user_id)
		} else {
			Actor::user(user_id)
		};
		if let Some(email) = header(parts, USER_EMAIL_HEADER) {
			actor = actor.with_email(email);
		}
		Ok(CurrentActor(actor))
	}
}

fn header<'a>(parts: &'a Parts, name: &str) -> Option<&'a str> {
	parts
		.headers
		.get(name)
		.and_then(|value| value.to_str().ok())
		.map(str::trim)
		.filter(|value| !value.is_empty())
}
