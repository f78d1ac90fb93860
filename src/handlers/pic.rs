use axum::{
    extract::{Json, Path, Query, State},
    response::Response,
    routing::{get, put},
    Router,
};
use serde::Deserialize;

use super::common::created_response;
use crate::{
    entities::pic, errors::ServiceError, services::pic::PicUpdate, ApiResponse, ApiResult,
    AppState,
};

#[derive(Debug, Default, Deserialize)]
pub struct PicListQuery {
    /// Include deactivated names
    #[serde(default)]
    pub all: bool,
}

#[derive(Debug, Deserialize)]
pub struct NewPic {
    pub name: String,
}

pub fn pic_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_pics).post(add_pic))
        .route("/:id", put(update_pic).delete(delete_pic))
}

async fn list_pics(
    State(state): State<AppState>,
    Query(query): Query<PicListQuery>,
) -> ApiResult<Vec<pic::Model>> {
    let rows = state.services.pic.list(query.all).await?;
    Ok(Json(ApiResponse::success(rows)))
}

async fn add_pic(
    State(state): State<AppState>,
    Json(body): Json<NewPic>,
) -> Result<Response, ServiceError> {
    let row = state.services.pic.add(&body.name).await?;
    Ok(created_response(row, "PIC added successfully"))
}

async fn update_pic(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(body): Json<PicUpdate>,
) -> ApiResult<pic::Model> {
    let row = state.services.pic.update(id, body).await?;
    Ok(Json(
        ApiResponse::success(row).with_message("PIC updated successfully"),
    ))
}

async fn delete_pic(State(state): State<AppState>, Path(id): Path<i32>) -> ApiResult<()> {
    state.services.pic.deactivate(id).await?;
    Ok(Json(
        ApiResponse::success(()).with_message("PIC deactivated successfully"),
    ))
}
