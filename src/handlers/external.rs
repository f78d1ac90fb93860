//! Read API for the dashboard and other integrators, guarded by the API key.
//!
//! Failures use the flat `{success:false, error}` shape integrators expect
//! rather than the internal error body.

use axum::{
    extract::{Query, State},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{
    errors::ServiceError,
    models::InputStatus,
    services::external_data::{
        AuthenticityQuery, CompletedOnDate, CompletedReport, LineInput, ManufacturingData,
    },
    AppState,
};

/// Service error rendered for external callers
#[derive(Debug)]
pub struct ExternalError(ServiceError);

impl From<ServiceError> for ExternalError {
    fn from(err: ServiceError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ExternalError {
    fn into_response(self) -> Response {
        let status = self.0.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self.0, "external request failed");
        }
        (
            status,
            Json(json!({ "success": false, "error": self.0.response_message() })),
        )
            .into_response()
    }
}

#[derive(Debug, Serialize)]
pub struct ExternalResponse<T: Serialize> {
    pub success: bool,
    pub data: T,
}

impl<T: Serialize> ExternalResponse<T> {
    fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data,
        })
    }
}

type ExternalResult<T> = Result<Json<ExternalResponse<T>>, ExternalError>;

#[derive(Debug, Deserialize)]
pub struct MoDateQuery {
    pub mo_number: Option<String>,
    pub completed_at: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
pub struct DateQuery {
    pub completed_at: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
pub struct DateRangeQuery {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

#[derive(Debug, Serialize)]
pub struct MoStatus {
    pub mo_number: String,
    pub status: InputStatus,
}

#[derive(Debug, Serialize)]
pub struct AuthenticityList {
    pub count: usize,
    pub records: Vec<LineInput>,
}

pub fn external_routes() -> Router<AppState> {
    Router::new()
        .route("/manufacturing-data/status", get(mo_status))
        .route("/manufacturing-data/by-date", get(completed_on))
        .route("/manufacturing-data", get(manufacturing_data))
        .route("/manufacturing-report/simple", get(completed_report))
        .route("/authenticity", get(authenticity))
}

async fn mo_status(
    State(state): State<AppState>,
    Query(query): Query<MoDateQuery>,
) -> ExternalResult<MoStatus> {
    let status = state
        .services
        .external
        .mo_status(query.mo_number.as_deref(), query.completed_at)
        .await?;
    Ok(ExternalResponse::ok(MoStatus {
        mo_number: query.mo_number.unwrap_or_default().trim().to_string(),
        status,
    }))
}

async fn manufacturing_data(
    State(state): State<AppState>,
    Query(query): Query<MoDateQuery>,
) -> ExternalResult<ManufacturingData> {
    let data = state
        .services
        .external
        .manufacturing_data(query.mo_number.as_deref(), query.completed_at)
        .await?;
    Ok(ExternalResponse::ok(data))
}

async fn completed_on(
    State(state): State<AppState>,
    Query(query): Query<DateQuery>,
) -> ExternalResult<CompletedOnDate> {
    let date = query.completed_at.ok_or_else(|| {
        ServiceError::ValidationError("completed_at (YYYY-MM-DD) is required".to_string())
    })?;
    let data = state.services.external.completed_on(date).await?;
    Ok(ExternalResponse::ok(data))
}

async fn completed_report(
    State(state): State<AppState>,
    Query(query): Query<DateRangeQuery>,
) -> ExternalResult<CompletedReport> {
    let (Some(start), Some(end)) = (query.start_date, query.end_date) else {
        return Err(ServiceError::ValidationError(
            "start_date and end_date parameters are required. Format: YYYY-MM-DD".to_string(),
        )
        .into());
    };
    let report = state
        .services
        .external
        .completed_between(start, end)
        .await?;
    Ok(ExternalResponse::ok(report))
}

async fn authenticity(
    State(state): State<AppState>,
    Query(query): Query<AuthenticityQuery>,
) -> ExternalResult<AuthenticityList> {
    let records = state.services.external.authenticity(&query).await?;
    Ok(ExternalResponse::ok(AuthenticityList {
        count: records.len(),
        records,
    }))
}
