use crate::{errors::ServiceError, models::ProductionLine, ApiResponse};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::str::FromStr;

/// Standard success response with a message
pub fn success_with_message<T: Serialize>(data: T, message: &str) -> Response {
    (
        StatusCode::OK,
        Json(ApiResponse::success(data).with_message(message)),
    )
        .into_response()
}

/// Standard created response
pub fn created_response<T: Serialize>(data: T, message: &str) -> Response {
    (
        StatusCode::CREATED,
        Json(ApiResponse::success(data).with_message(message)),
    )
        .into_response()
}

/// Parses the `:line` path segment.
pub fn parse_line(raw: &str) -> Result<ProductionLine, ServiceError> {
    ProductionLine::from_str(raw.trim())
        .map_err(|_| ServiceError::BadRequest(format!("Invalid production type: {}", raw)))
}

/// Required, non-blank query value.
pub fn required_param<'a>(value: &'a Option<String>, name: &str) -> Result<&'a str, ServiceError> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ServiceError::ValidationError(format!("{} is required", name)))
}
