use axum::{
    extract::{Json, Query, State},
    routing::get,
    Router,
};
use serde::Deserialize;

use super::common::{parse_line, required_param};
use crate::{
    services::reports::{LeaderQuery, LeaderStats, MoSummary, ReportPage, ReportQuery},
    ApiResponse, ApiResult, AppState,
};

#[derive(Debug, Deserialize)]
pub struct MoSummaryQuery {
    pub mo_number: Option<String>,
    pub line: Option<String>,
}

pub fn statistics_routes() -> Router<AppState> {
    Router::new()
        .route("/production-by-leader", get(production_by_leader))
        .route("/leaders", get(leaders))
        .route("/mo-summary", get(mo_summary))
}

pub fn report_routes() -> Router<AppState> {
    Router::new().route("/production", get(production_report))
}

async fn production_by_leader(
    State(state): State<AppState>,
    Query(query): Query<LeaderQuery>,
) -> ApiResult<Vec<LeaderStats>> {
    let stats = state.services.reports.production_by_leader(&query).await?;
    Ok(Json(ApiResponse::success(stats)))
}

async fn leaders(State(state): State<AppState>) -> ApiResult<Vec<String>> {
    let names = state.services.reports.leaders().await?;
    Ok(Json(ApiResponse::success(names)))
}

async fn mo_summary(
    State(state): State<AppState>,
    Query(query): Query<MoSummaryQuery>,
) -> ApiResult<MoSummary> {
    let mo_number = required_param(&query.mo_number, "mo_number")?;
    let line = match query.line.as_deref().filter(|l| !l.trim().is_empty()) {
        Some(raw) => Some(parse_line(raw)?),
        None => None,
    };
    let summary = state.services.reports.mo_summary(mo_number, line).await?;
    Ok(Json(ApiResponse::success(summary)))
}

async fn production_report(
    State(state): State<AppState>,
    Query(query): Query<ReportQuery>,
) -> ApiResult<ReportPage> {
    let page = state.services.reports.production_report(&query).await?;
    Ok(Json(ApiResponse::success(page)))
}
