use axum::{
    extract::{Json, Path, Query, State},
    response::Response,
    routing::{get, put},
    Router,
};
use serde::{Deserialize, Serialize};

use super::common::{created_response, parse_line, required_param};
use crate::{
    errors::ServiceError,
    models::{ExceptionEntry, ExceptionKind, NewExceptionEntry, UpdateExceptionEntry},
    ApiResponse, ApiResult, AppState,
};

#[derive(Debug, Deserialize)]
pub struct ExceptionQuery {
    pub mo_number: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CreatedEntry {
    pub id: i32,
}

/// Routes for one exception table family, mounted at `/buffer` or `/reject`.
pub fn exception_routes(kind: ExceptionKind) -> Router<AppState> {
    Router::new()
        .route(
            "/:line",
            get(
                move |state: State<AppState>, path: Path<String>, query: Query<ExceptionQuery>| {
                    list_entries(kind, state, path, query)
                },
            )
            .post(
                move |state: State<AppState>,
                      path: Path<String>,
                      body: Json<NewExceptionEntry>| {
                    create_entry(kind, state, path, body)
                },
            ),
        )
        .route(
            "/:line/:id",
            put(
                move |state: State<AppState>,
                      path: Path<(String, i32)>,
                      body: Json<UpdateExceptionEntry>| {
                    update_entry(kind, state, path, body)
                },
            ),
        )
}

async fn list_entries(
    kind: ExceptionKind,
    State(state): State<AppState>,
    Path(line): Path<String>,
    Query(query): Query<ExceptionQuery>,
) -> ApiResult<Vec<ExceptionEntry>> {
    let line = parse_line(&line)?;
    let mo_number = required_param(&query.mo_number, "MO Number")?;
    let entries = state
        .services
        .exceptions
        .list_by_mo(line, kind, mo_number)
        .await?;
    Ok(Json(ApiResponse::success(entries)))
}

async fn create_entry(
    kind: ExceptionKind,
    State(state): State<AppState>,
    Path(line): Path<String>,
    Json(body): Json<NewExceptionEntry>,
) -> Result<Response, ServiceError> {
    let line = parse_line(&line)?;
    let id = state.services.exceptions.create(line, kind, body).await?;
    Ok(created_response(
        CreatedEntry { id },
        &format!("{} data saved successfully", kind),
    ))
}

async fn update_entry(
    kind: ExceptionKind,
    State(state): State<AppState>,
    Path((line, id)): Path<(String, i32)>,
    Json(body): Json<UpdateExceptionEntry>,
) -> ApiResult<ExceptionEntry> {
    let line = parse_line(&line)?;
    let entry = state
        .services
        .exceptions
        .update(line, kind, id, body)
        .await?;
    Ok(Json(
        ApiResponse::success(entry).with_message(&format!("{} data updated successfully", kind)),
    ))
}
