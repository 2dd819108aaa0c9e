//! HTTP boundary of the shipping order service.
//!
//! Handlers stay thin: they extract the acting user and the request, call
//! the engine, and let [`crate::apis::ApiError`] map engine errors to status
//! codes.

use crate::apis::orders;
use axum::{
	http::HeaderValue,
	routing::{get, post},
	Router,
};
use shipping_config::{ApiConfig, CorsConfig};
use shipping_core::OrderEngine;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
	pub engine: Arc<OrderEngine>,
}

pub async fn start_server(
	api_config: ApiConfig,
	engine: Arc<OrderEngine>,
) -> Result<(), Box<dyn std::error::Error>> {
	let app = router(AppState { engine }, api_config.cors.as_ref());

	let bind_address = format!("{}:{}", api_config.host, api_config.port);
	let listener = TcpListener::bind(&bind_address).await?;

	tracing::info!("Shipping API server starting on {}", bind_address);

	axum::serve(listener, app).await?;

	Ok(())
}

pub fn router(state: AppState, cors: Option<&CorsConfig>) -> Router {
	Router::new()
		.nest(
			"/api",
			Router::new()
				.route("/orders", post(orders::create_order).get(orders::list_orders))
				.route("/orders/statistics", get(orders::statistics))
				.route("/orders/{id}", get(orders::get_order))
				.route("/orders/{id}/confirm", post(orders::confirm_order))
				.route("/orders/{id}/refresh", post(orders::refresh_status))
				.route("/orders/{id}/cancel", post(orders::cancel_order))
				.route("/orders/{id}/track", get(orders::track_order))
				.route("/track/{courier_code}/{waybill_id}", get(orders::public_track)),
		)
		.layer(
			ServiceBuilder::new()
				.layer(TraceLayer::new_for_http())
				.layer(cors_layer(cors)),
		)
		.with_state(state)
}

/// Permissive unless origins are configured.
fn cors_layer(cors: Option<&CorsConfig>) -> CorsLayer {
	match cors {
		Some(cors) if !cors.allowed_origins.is_empty() => {
			let origins: Vec<HeaderValue> = cors
				.allowed_origins
				.iter()
				.filter_map(|origin| match origin.parse() {
					Ok(value) => Some(value),
					Err(_) => {
						tracing::warn!(%origin, "Ignoring invalid CORS origin");
						None
					},
				})
				.collect();
			CorsLayer::new()
				.allow_origin(AllowOrigin::list(origins))
				.allow_methods(Any)
				.allow_headers(Any)
		},
		_ => CorsLayer::permissive(),
	}
}
