use axum::{
    extract::{Json, Path, Query, State},
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};

use super::common::{parse_line, required_param};
use crate::{entities::mo_cache, errors::ServiceError, ApiResponse, ApiResult, AppState};

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub q: Option<String>,
    pub production_type: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LookupQuery {
    pub mo_number: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TargetQuantity {
    pub mo_number: String,
    pub quantity: f64,
}

pub fn mo_routes() -> Router<AppState> {
    // Static segments first so `search` and `lookup` are not read as a line.
    Router::new()
        .route("/search", get(search))
        .route("/lookup", get(lookup))
        .route("/:line", get(list_for_line))
}

async fn list_for_line(
    State(state): State<AppState>,
    Path(line): Path<String>,
) -> ApiResult<Vec<mo_cache::Model>> {
    let line = parse_line(&line)?;
    let rows = state.services.mo_cache.list_for_line(Some(line)).await?;
    Ok(Json(ApiResponse::success(rows)))
}

async fn search(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> ApiResult<Vec<mo_cache::Model>> {
    let line = match query
        .production_type
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty() && *t != "all")
    {
        Some(raw) => Some(parse_line(raw)?),
        None => None,
    };
    let rows = state
        .services
        .mo_cache
        .search(query.q.as_deref().unwrap_or_default(), line)
        .await?;
    Ok(Json(ApiResponse::success(rows)))
}

async fn lookup(
    State(state): State<AppState>,
    Query(query): Query<LookupQuery>,
) -> ApiResult<TargetQuantity> {
    let mo_number = required_param(&query.mo_number, "mo_number")?;
    let quantity = state
        .services
        .mo_cache
        .lookup_quantity(mo_number)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("MO {} not found in cache", mo_number)))?;
    Ok(Json(ApiResponse::success(TargetQuantity {
        mo_number: mo_number.to_string(),
        quantity,
    })))
}
