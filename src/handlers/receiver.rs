use axum::{
    extract::{Json, Path, Query, State},
    response::Response,
    routing::get,
    Router,
};
use serde::Deserialize;

use super::common::created_response;
use crate::{
    entities::manufacturing_identity,
    errors::ServiceError,
    services::receiver::{IdentityPage, IdentityQuery, ManufacturingRecord, ReceiptAck},
    ApiResponse, ApiResult, AppState,
};

#[derive(Debug, Default, Deserialize)]
pub struct StatusQuery {
    pub status: Option<String>,
}

/// MO numbers contain slashes, so the id is a wildcard segment.
pub fn receiver_routes() -> Router<AppState> {
    Router::new()
        .route("/manufacturing", get(list).post(receive_active))
        .route("/manufacturing/*id", get(find).put(receive_completed))
}

async fn receive_active(
    State(state): State<AppState>,
    Json(body): Json<ManufacturingRecord>,
) -> Result<Response, ServiceError> {
    let ack = state.services.receiver.receive_active(body).await?;
    Ok(created_response(ack, "Manufacturing data received"))
}

async fn receive_completed(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<ManufacturingRecord>,
) -> ApiResult<ReceiptAck> {
    let ack = state.services.receiver.receive_completed(&id, body).await?;
    Ok(Json(
        ApiResponse::success(ack).with_message("Manufacturing data marked completed"),
    ))
}

async fn list(
    State(state): State<AppState>,
    Query(query): Query<IdentityQuery>,
) -> ApiResult<IdentityPage> {
    let page = state.services.receiver.list(&query).await?;
    Ok(Json(ApiResponse::success(page)))
}

async fn find(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<StatusQuery>,
) -> ApiResult<Vec<manufacturing_identity::Model>> {
    let rows = state
        .services
        .receiver
        .find(&id, query.status.as_deref())
        .await?;
    Ok(Json(ApiResponse::success(rows)))
}
