use axum::{
    extract::{Json, State},
    routing::{get, post},
    Router,
};
use chrono::Utc;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::info;

use crate::{
    circuit_breaker::CircuitBreakerMetrics,
    services::{
        admin_settings::API_KEY,
        mo_cache::{MoCacheStats, RefreshReport},
    },
    ApiResponse, ApiResult, AppState,
};

const MASK: &str = "********";

#[derive(Debug, Serialize)]
pub struct AdminConfigView {
    #[serde(flatten)]
    pub values: BTreeMap<String, String>,
    pub api_key_configured: bool,
}

#[derive(Debug, Serialize)]
pub struct GeneratedKey {
    pub api_key: String,
}

#[derive(Debug, Serialize)]
pub struct CleanupResult {
    pub deleted: u64,
}

/// Hides all but the last eight characters of a key.
pub fn mask_api_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 8 {
        return MASK.to_string();
    }
    let tail: String = chars[chars.len() - 8..].iter().collect();
    format!("{}{}", MASK, tail)
}

pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/config", get(get_config).put(update_config))
        .route("/generate-api-key", post(generate_api_key))
        .route("/mo-stats", get(mo_stats))
        .route("/cleanup-mo", post(cleanup_mo))
        .route("/sync-mo", post(sync_mo))
        .route("/notifier", get(notifier_status))
        .route("/notifier/reset", post(reset_notifier))
}

async fn get_config(State(state): State<AppState>) -> ApiResult<AdminConfigView> {
    let mut values = state.services.settings.all().await?;
    let mut api_key_configured = false;
    if let Some(key) = values.get_mut(API_KEY) {
        api_key_configured = !key.is_empty();
        if api_key_configured {
            *key = mask_api_key(key);
        }
    }
    Ok(Json(ApiResponse::success(AdminConfigView {
        values,
        api_key_configured,
    })))
}

async fn update_config(
    State(state): State<AppState>,
    Json(body): Json<BTreeMap<String, String>>,
) -> ApiResult<()> {
    state.services.settings.set_many(&body).await?;
    Ok(Json(
        ApiResponse::success(()).with_message("Configuration updated successfully"),
    ))
}

async fn generate_api_key(State(state): State<AppState>) -> ApiResult<GeneratedKey> {
    let api_key = state.services.settings.generate_api_key().await?;
    Ok(Json(
        ApiResponse::success(GeneratedKey { api_key })
            .with_message("API key generated. Store it now; it will not be shown again."),
    ))
}

async fn mo_stats(State(state): State<AppState>) -> ApiResult<MoCacheStats> {
    let stats = state.services.mo_cache.stats(Utc::now()).await?;
    Ok(Json(ApiResponse::success(stats)))
}

async fn cleanup_mo(State(state): State<AppState>) -> ApiResult<CleanupResult> {
    let deleted = state.services.mo_cache.cleanup(Utc::now()).await?;
    Ok(Json(
        ApiResponse::success(CleanupResult { deleted })
            .with_message(&format!("Deleted {} cached MO(s)", deleted)),
    ))
}

async fn sync_mo(State(state): State<AppState>) -> ApiResult<RefreshReport> {
    let report = state.services.mo_cache.refresh().await?;
    info!(updated = report.total_updated, "manual MO cache sync");
    Ok(Json(ApiResponse::success(report)))
}

async fn notifier_status(State(state): State<AppState>) -> ApiResult<CircuitBreakerMetrics> {
    Ok(Json(ApiResponse::success(state.services.breaker.metrics())))
}

async fn reset_notifier(State(state): State<AppState>) -> ApiResult<CircuitBreakerMetrics> {
    state.services.breaker.reset();
    info!("notifier circuit breaker reset by admin");
    Ok(Json(
        ApiResponse::success(state.services.breaker.metrics())
            .with_message("Circuit breaker reset"),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn masks_all_but_tail() {
        assert_eq!(mask_api_key("abcdef0123456789"), "********23456789");
        assert_eq!(mask_api_key("short"), MASK);
        assert_eq!(mask_api_key("12345678"), MASK);
    }
}
