use axum::{
    extract::{Json, Path, Query, State},
    response::Response,
    routing::{get, put},
    Extension, Router,
};
use serde::Deserialize;

use super::common::{created_response, parse_line, required_param, success_with_message};
use crate::{
    auth::AuthUser,
    errors::ServiceError,
    models::{NewProductionInput, ProductionInput, SessionGroup, UpdateProductionInput},
    services::{
        mo_completion::{RevertOutcome, StatusUpdateOutcome, SubmitOutcome},
        reports::MoUsage,
    },
    ApiResponse, ApiResult, AppState,
};

#[derive(Debug, Deserialize)]
pub struct SubmitMoGroupRequest {
    pub mo_number: String,
    pub session_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RevertMoGroupRequest {
    pub mo_number: String,
}

#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub status: String,
}

#[derive(Debug, Deserialize)]
pub struct MoQuery {
    pub mo_number: Option<String>,
}

pub fn production_routes() -> Router<AppState> {
    Router::new()
        .route("/:line", get(list_sessions).post(create_input))
        .route("/:line/inputs/:id", get(get_input).put(update_input))
        .route("/:line/inputs/:id/status", put(update_status))
        .route("/:line/submit-mo-group", put(submit_mo_group))
        .route("/:line/revert-mo-group", put(revert_mo_group))
        .route("/:line/check-mo", get(check_mo_used))
}

async fn list_sessions(
    State(state): State<AppState>,
    Path(line): Path<String>,
) -> ApiResult<Vec<SessionGroup>> {
    let line = parse_line(&line)?;
    let sessions = state.services.completion.list_sessions(line).await?;
    Ok(Json(ApiResponse::success(sessions)))
}

async fn create_input(
    State(state): State<AppState>,
    Path(line): Path<String>,
    Json(body): Json<NewProductionInput>,
) -> Result<Response, ServiceError> {
    let line = parse_line(&line)?;
    let outcome = state.services.completion.insert_input(line, body).await?;
    Ok(created_response(outcome, "Data saved successfully"))
}

async fn get_input(
    State(state): State<AppState>,
    Path((line, id)): Path<(String, i32)>,
) -> ApiResult<ProductionInput> {
    let line = parse_line(&line)?;
    let input = state.services.completion.get_input(line, id).await?;
    Ok(Json(ApiResponse::success(input)))
}

async fn update_input(
    State(state): State<AppState>,
    Path((line, id)): Path<(String, i32)>,
    Json(body): Json<UpdateProductionInput>,
) -> ApiResult<ProductionInput> {
    let line = parse_line(&line)?;
    let input = state
        .services
        .completion
        .update_input_fields(line, id, body)
        .await?;
    Ok(Json(
        ApiResponse::success(input).with_message("Data updated successfully"),
    ))
}

async fn update_status(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path((line, id)): Path<(String, i32)>,
    Json(body): Json<StatusRequest>,
) -> ApiResult<StatusUpdateOutcome> {
    let line = parse_line(&line)?;
    let outcome = state
        .services
        .completion
        .update_input_status(&user, line, id, &body.status)
        .await?;
    let message = if outcome.auto_reverted {
        "Status reverted: other inputs for this MO are still active"
    } else {
        "Status updated successfully"
    };
    Ok(Json(ApiResponse::success(outcome).with_message(message)))
}

async fn submit_mo_group(
    State(state): State<AppState>,
    Path(line): Path<String>,
    Json(body): Json<SubmitMoGroupRequest>,
) -> Result<Response, ServiceError> {
    let line = parse_line(&line)?;
    let outcome = state
        .services
        .completion
        .submit_mo_group(line, &body.mo_number, body.session_id.as_deref())
        .await?;
    let message = if outcome.auto_reverted {
        format!(
            "MO {} still has {} active input(s); completion reverted",
            outcome.mo_number, outcome.active_count
        )
    } else {
        format!(
            "MO {} submitted: {} input(s) completed",
            outcome.mo_number, outcome.updated_count
        )
    };
    Ok(success_with_message::<SubmitOutcome>(outcome, &message))
}

async fn revert_mo_group(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(line): Path<String>,
    Json(body): Json<RevertMoGroupRequest>,
) -> ApiResult<RevertOutcome> {
    let line = parse_line(&line)?;
    let outcome = state
        .services
        .completion
        .revert_mo_group(&user, line, &body.mo_number)
        .await?;
    let message = if outcome.reverted_count == 0 {
        "No completed records found to revert".to_string()
    } else {
        format!("Reverted {} record(s) to active", outcome.reverted_count)
    };
    Ok(Json(ApiResponse::success(outcome).with_message(&message)))
}

async fn check_mo_used(
    State(state): State<AppState>,
    Path(line): Path<String>,
    Query(query): Query<MoQuery>,
) -> ApiResult<MoUsage> {
    let line = parse_line(&line)?;
    let mo_number = required_param(&query.mo_number, "mo_number")?;
    let usage = state.services.reports.mo_usage(line, mo_number).await?;
    Ok(Json(ApiResponse::success(usage)))
}
