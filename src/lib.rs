//! Authenticity Tracker
//!
//! Production-floor capture service: operators record authenticity sticker
//! ranges against manufacturing orders (MOs), supervisors submit an MO group
//! as completed, and status changes are pushed to a third-party dashboard.
//! MO data is mirrored from the ERP into a local cache.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

// Core modules
pub mod auth;
pub mod circuit_breaker;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod handlers;
pub mod middleware_helpers;
pub mod migrator;
pub mod models;
pub mod repositories;
pub mod services;
pub mod tracing;

use axum::{response::Json, Router};
use chrono::Utc;
use http::HeaderValue;
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::auth::{AuthRouterExt, AuthService, ROLE_ADMIN};
use crate::models::ExceptionKind;

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<db::DbPool>,
    pub config: config::AppConfig,
    pub services: services::factory::ServiceContainer,
}

// Common response wrappers
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<ResponseMeta>,
}

#[derive(Debug, Serialize)]
pub struct ResponseMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub timestamp: String,
}

impl ResponseMeta {
    fn capture() -> Self {
        Self {
            request_id: crate::tracing::current_request_id().map(|rid| rid.as_str().to_string()),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            meta: Some(ResponseMeta::capture()),
        }
    }

    pub fn with_message(mut self, message: &str) -> Self {
        self.message = Some(message.to_string());
        self
    }
}

#[cfg(test)]
mod response_tests {
    use super::*;
    use chrono::DateTime;

    #[tokio::test]
    async fn success_response_includes_request_metadata() {
        let response =
            crate::tracing::scope_request_id(crate::tracing::RequestId::new("meta-123"), async {
                ApiResponse::success("ok").with_message("saved")
            })
            .await;

        assert_eq!(response.message.as_deref(), Some("saved"));
        let meta = response.meta.expect("metadata expected");
        assert_eq!(meta.request_id.as_deref(), Some("meta-123"));
        DateTime::parse_from_rfc3339(&meta.timestamp).expect("timestamp should parse");
    }
}

/// Standard API result type for JSON responses
pub type ApiResult<T> = Result<Json<ApiResponse<T>>, errors::ServiceError>;

/// Internal API: bearer token required, admin routes additionally need the admin role.
pub fn api_v1_routes() -> Router<AppState> {
    let floor = Router::new()
        .nest("/production", handlers::production::production_routes())
        .nest(
            "/buffer",
            handlers::exceptions::exception_routes(ExceptionKind::Buffer),
        )
        .nest(
            "/reject",
            handlers::exceptions::exception_routes(ExceptionKind::Reject),
        )
        .nest("/mo", handlers::mo::mo_routes())
        .nest("/statistics", handlers::statistics::statistics_routes())
        .nest("/reports", handlers::statistics::report_routes())
        .nest("/pic", handlers::pic::pic_routes())
        .with_auth();

    let admin = Router::new()
        .nest("/admin", handlers::admin::admin_routes())
        .with_role(ROLE_ADMIN);

    Router::new().merge(floor).merge(admin)
}

/// Full application router without CORS or compression.
pub fn app_router(state: AppState, auth_service: Arc<AuthService>) -> Router {
    let external = handlers::external::external_routes().layer(
        axum::middleware::from_fn_with_state(
            state.services.settings.clone(),
            auth::api_key_middleware,
        ),
    );

    Router::<AppState>::new()
        .nest("/health", handlers::health::health_routes())
        .nest("/auth", auth::auth_routes())
        .nest("/api/v1", api_v1_routes())
        .nest("/api/external", external)
        .nest("/api/receiver", handlers::receiver::receiver_routes())
        // HTTP tracing layer for consistent request/response telemetry
        .layer(crate::tracing::configure_http_tracing())
        // Inject AuthService into request extensions for auth middleware
        .layer(axum::middleware::from_fn_with_state(
            auth_service,
            |axum::extract::State(auth): axum::extract::State<Arc<AuthService>>,
             mut req: axum::http::Request<axum::body::Body>,
             next: axum::middleware::Next| async move {
                req.extensions_mut().insert(auth);
                next.run(req).await
            },
        ))
        // Ensure every request carries a request id for traceability
        .layer(axum::middleware::from_fn(
            middleware_helpers::request_id_middleware,
        ))
        .with_state(state)
}

/// Builds the CORS layer from configuration. Explicit origins win; otherwise
/// permissive CORS is only allowed in development or by explicit override.
pub fn cors_layer(cfg: &config::AppConfig) -> Result<CorsLayer, String> {
    let configured_origins: Option<Vec<HeaderValue>> = cfg
        .cors_allowed_origins
        .as_ref()
        .map(|raw| {
            raw.split(',')
                .filter_map(|origin| {
                    let trimmed = origin.trim();
                    if trimmed.is_empty() {
                        None
                    } else {
                        HeaderValue::from_str(trimmed).ok()
                    }
                })
                .collect::<Vec<_>>()
        })
        .filter(|origins| !origins.is_empty());

    if let Some(origins) = configured_origins {
        Ok(CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any))
    } else if cfg.should_allow_permissive_cors() {
        ::tracing::info!(
            "Using permissive CORS because explicit origins were not configured ({})",
            if cfg.is_development() {
                "development environment"
            } else {
                "explicit override enabled"
            }
        );
        Ok(CorsLayer::permissive())
    } else {
        Err("Missing CORS configuration: set APP__CORS_ALLOWED_ORIGINS or APP__CORS_ALLOW_ANY_ORIGIN=true".to_string())
    }
}
