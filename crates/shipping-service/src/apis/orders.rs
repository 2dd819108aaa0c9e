//! Order endpoints.

use super::{ApiError, CurrentActor};
use crate::server::AppState;
use axum::{
	extract::{Path, Query, State},
	http::StatusCode,
	response::Json,
};
use serde::{Deserialize, Serialize};
use shipping_types::{
	CancelOrderRequest, Order, OrderRequest, OrderStatistics, OrderStatus, TrackingInfo,
};

#[derive(Debug, Deserialize)]
pub struct ListQuery {
	pub status: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TrackOrderResponse {
	pub order: Order,
	pub tracking: TrackingInfo,
}

/// POST /api/orders
pub async fn create_order(
	State(state): State<AppState>,
	CurrentActor(actor): CurrentActor,
	Json(request): Json<OrderRequest>,
) -> Result<(StatusCode, Json<Order>), ApiError> {
	let order = state.engine.create_order(&actor, request).await?;
	Ok((StatusCode::CREATED, Json(order)))
}

/// GET /api/orders?status=
pub async fn list_orders(
	State(state): State<AppState>,
	CurrentActor(actor): CurrentActor,
	Query(query): Query<ListQuery>,
) -> Result<Json<Vec<Order>>, ApiError> {
	let status = match query.status.as_deref().map(str::trim) {
		None | Some("") => None,
		Some(raw) => Some(raw.parse::<OrderStatus>().map_err(|message| {
			ApiError::new(StatusCode::UNPROCESSABLE_ENTITY, "validation", message)
		})?),
	};
	Ok(Json(state.engine.list_orders(&actor, status).await?))
}

/// GET /api/orders/statistics
pub async fn statistics(
	State(state): State<AppState>,
	CurrentActor(actor): CurrentActor,
) -> Result<Json<OrderStatistics>, ApiError> {
	Ok(Json(state.engine.statistics(&actor).await?))
}

/// GET /api/orders/{id}
pub async fn get_order(
	State(state): State<AppState>,
	CurrentActor(actor): CurrentActor,
	Path(id): Path<u64>,
) -> Result<Json<Order>, ApiError> {
	Ok(Json(state.engine.get_order(&actor, id).await?))
}

/// POST /api/orders/{id}/confirm
pub async fn confirm_order(
	State(state): State<AppState>,
	CurrentActor(actor): CurrentActor,
	Path(id): Path<u64>,
) -> Result<Json<Order>, ApiError> {
	Ok(Json(state.engine.confirm_order(&actor, id).await?))
}

/// POST /api/orders/{id}/refresh
pub async fn refresh_status(
	State(state): State<AppState>,
	CurrentActor(actor): CurrentActor,
	Path(id): Path<u64>,
) -> Result<Json<Order>, ApiError> {
	Ok(Json(state.engine.refresh_status(&actor, id).await?))
}

/// POST /api/orders/{id}/cancel, body optional.
pub async fn cancel_order(
	State(state): State<AppState>,
	CurrentActor(actor): CurrentActor,
	Path(id): Path<u64>,
	body: Option<Json<CancelOrderRequest>>,
) -> Result<Json<Order>, ApiError> {
	let reason = body.and_then(|Json(body)| body.reason);
	Ok(Json(state.engine.cancel_order(&actor, id, reason).await?))
}

/// GET /api/orders/{id}/track
pub async fn track_order(
	State(state): State<AppState>,
	CurrentActor(actor): CurrentActor,
	Path(id): Path<u64>,
) -> Result<Json<TrackOrderResponse>, ApiError> {
	let (order, tracking) = state.engine.track_order(&actor, id).await?;
	Ok(Json(TrackOrderResponse { order, tracking }))
}

/// GET /api/track/{courier_code}/{waybill_id}
pub async fn public_track(
	State(state): State<AppState>,
	Path((courier_code, waybill_id)): Path<(String, String)>,
) -> Result<Json<TrackingInfo>, ApiError> {
	Ok(Json(state.engine.public_track(&waybill_id, &courier_code).await?))
}
