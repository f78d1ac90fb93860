//! Outbound manufacturing-status notifications.
//!
//! The workflow decides *what* to send and *where* (see [`EndpointResolver`]),
//! then hands a [`Notification`] to a [`StatusNotifier`]. The HTTP notifier
//! delivers on a spawned task so the caller never waits on the third party.

use chrono::{DateTime, FixedOffset, SecondsFormat, Utc};
use metrics::counter;
use reqwest::{Method, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::circuit_breaker::{CircuitBreaker, CircuitBreakerError, FailureKind};
use crate::errors::ServiceError;
use crate::services::admin_settings::AdminSettingsService;

/// Body sent to the third-party manufacturing API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManufacturingPayload {
    pub manufacturing_id: String,
    pub sku: String,
    pub sku_name: String,
    pub target_qty: f64,
    pub done_qty: Option<u64>,
    pub leader_name: String,
    pub finished_at: Option<String>,
}

impl ManufacturingPayload {
    pub fn new(
        mo_number: &str,
        sku: &str,
        target_qty: f64,
        done_qty: Option<u64>,
        leader_name: &str,
        finished_at: Option<DateTime<Utc>>,
        utc_offset_hours: i32,
    ) -> Self {
        Self {
            manufacturing_id: mo_number.to_string(),
            sku: sku.to_string(),
            sku_name: format!("Product {}", sku),
            target_qty,
            done_qty,
            leader_name: leader_name.to_string(),
            finished_at: finished_at.map(|ts| format_report_time(ts, utc_offset_hours)),
        }
    }
}

/// RFC 3339 with millisecond precision at a fixed reporting offset.
pub fn format_report_time(ts: DateTime<Utc>, utc_offset_hours: i32) -> String {
    match FixedOffset::east_opt(utc_offset_hours * 3600) {
        Some(offset) => ts
            .with_timezone(&offset)
            .to_rfc3339_opts(SecondsFormat::Millis, false),
        None => ts.to_rfc3339_opts(SecondsFormat::Millis, false),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DeliveryMethod {
    Post,
    Put,
}

impl From<DeliveryMethod> for Method {
    fn from(m: DeliveryMethod) -> Self {
        match m {
            DeliveryMethod::Post => Method::POST,
            DeliveryMethod::Put => Method::PUT,
        }
    }
}

/// A fully resolved outbound call
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub method: DeliveryMethod,
    pub url: String,
    pub payload: ManufacturingPayload,
}

/// Sink for status notifications. Implementations must not block the caller.
pub trait StatusNotifier: Send + Sync {
    fn dispatch(&self, notification: Notification);
}

#[derive(Debug, Error)]
pub enum NotifierError {
    #[error("circuit breaker is open")]
    CircuitOpen,
    #[error("invalid endpoint URL '{0}'")]
    InvalidUrl(String),
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("API returned status {status}: {body}")]
    Status { status: u16, body: String },
}

impl NotifierError {
    fn failure_kind(&self) -> FailureKind {
        match self {
            Self::Status { status, .. } if *status == StatusCode::METHOD_NOT_ALLOWED.as_u16() => {
                FailureKind::MethodNotAllowed
            }
            _ => FailureKind::Other,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryOutcome {
    pub status: u16,
}

/// Delivers notifications over HTTP behind a shared circuit breaker
#[derive(Clone)]
pub struct HttpStatusNotifier {
    client: reqwest::Client,
    breaker: Arc<CircuitBreaker>,
}

impl HttpStatusNotifier {
    pub fn new(timeout: Duration, breaker: Arc<CircuitBreaker>) -> Result<Self, NotifierError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, breaker })
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    /// Sends one JSON body. Only 2xx counts as success.
    pub async fn send_json<T: Serialize + ?Sized>(
        &self,
        method: Method,
        url: &str,
        body: &T,
    ) -> Result<DeliveryOutcome, NotifierError> {
        self.breaker
            .try_acquire()
            .map_err(|CircuitBreakerError::CircuitOpen| NotifierError::CircuitOpen)?;

        let result = self.send_unguarded(method, url, body).await;
        match &result {
            Ok(_) => self.breaker.record_success(),
            Err(e) => self.breaker.record_failure(e.failure_kind()),
        }
        result
    }

    async fn send_unguarded<T: Serialize + ?Sized>(
        &self,
        method: Method,
        url: &str,
        body: &T,
    ) -> Result<DeliveryOutcome, NotifierError> {
        let response = self.client.request(method, url).json(body).send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(DeliveryOutcome {
                status: status.as_u16(),
            });
        }
        let text = response.text().await.unwrap_or_default();
        Err(NotifierError::Status {
            status: status.as_u16(),
            body: text.chars().take(100).collect(),
        })
    }

    pub async fn deliver(
        &self,
        notification: &Notification,
    ) -> Result<DeliveryOutcome, NotifierError> {
        debug!(
            url = %notification.url,
            method = ?notification.method,
            manufacturing_id = %notification.payload.manufacturing_id,
            "sending manufacturing status"
        );
        self.send_json(
            notification.method.into(),
            &notification.url,
            &notification.payload,
        )
        .await
    }
}

impl StatusNotifier for HttpStatusNotifier {
    fn dispatch(&self, notification: Notification) {
        let notifier = self.clone();
        tokio::spawn(async move {
            match notifier.deliver(&notification).await {
                Ok(outcome) => {
                    counter!("authenticity_notifier.delivered", 1);
                    info!(
                        manufacturing_id = %notification.payload.manufacturing_id,
                        status = outcome.status,
                        "manufacturing status delivered"
                    );
                }
                Err(NotifierError::CircuitOpen) => {
                    counter!("authenticity_notifier.skipped", 1);
                    warn!(
                        manufacturing_id = %notification.payload.manufacturing_id,
                        "circuit breaker open, manufacturing status not sent"
                    );
                }
                Err(e) => {
                    counter!("authenticity_notifier.failed", 1);
                    error!(
                        manufacturing_id = %notification.payload.manufacturing_id,
                        url = %notification.url,
                        error = %e,
                        "manufacturing status delivery failed"
                    );
                }
            }
        });
    }
}

/// Strips the query string and any `/test...` tail.
fn clean_base(url: &str) -> &str {
    let without_query = url.split('?').next().unwrap_or(url);
    let path_start = without_query.find("://").map(|i| i + 3).unwrap_or(0);
    match without_query[path_start..].find("/test") {
        Some(idx) => &without_query[..path_start + idx],
        None => without_query,
    }
}

/// Derives the POST endpoint for active notifications from the general URL.
pub fn active_url_from_general(general: &str) -> String {
    if general.contains("/manufacturing") {
        return general.to_string();
    }
    format!("{}/manufacturing", clean_base(general))
}

/// Derives the PUT base for completed notifications from the general URL.
pub fn completed_base_from_general(general: &str) -> String {
    clean_base(general).trim_end_matches('/').to_string()
}

/// `{base}/{id}` when the base already ends in `/manufacturing`, else
/// `{base}/manufacturing/{id}`. The identifier is one encoded path segment.
pub fn completed_put_url(base: &str, identifier: &str) -> Result<String, NotifierError> {
    let trimmed = base.trim_end_matches('/');
    let mut url = Url::parse(trimmed).map_err(|_| NotifierError::InvalidUrl(base.to_string()))?;
    let ends_with_manufacturing = trimmed.to_ascii_lowercase().ends_with("/manufacturing");
    {
        let mut segments = url
            .path_segments_mut()
            .map_err(|_| NotifierError::InvalidUrl(base.to_string()))?;
        segments.pop_if_empty();
        if !ends_with_manufacturing {
            segments.push("manufacturing");
        }
        segments.push(identifier);
    }
    Ok(url.to_string())
}

/// Resolves notification endpoints from admin settings, falling back to the
/// configured general URL.
#[derive(Clone)]
pub struct EndpointResolver {
    settings: AdminSettingsService,
    fallback_url: Option<String>,
}

impl EndpointResolver {
    pub fn new(settings: AdminSettingsService, fallback_url: Option<String>) -> Self {
        Self {
            settings,
            fallback_url: fallback_url.filter(|u| !u.trim().is_empty()),
        }
    }

    /// General URL: admin setting first, then configuration.
    pub async fn general_url(&self) -> Result<Option<String>, ServiceError> {
        let urls = self.settings.external_api_urls().await?;
        Ok(urls.general.or_else(|| self.fallback_url.clone()))
    }

    pub async fn active_url(&self) -> Result<Option<String>, ServiceError> {
        let urls = self.settings.external_api_urls().await?;
        if let Some(url) = urls.active {
            return Ok(Some(url));
        }
        Ok(urls
            .general
            .or_else(|| self.fallback_url.clone())
            .map(|g| active_url_from_general(&g)))
    }

    pub async fn completed_base(&self) -> Result<Option<String>, ServiceError> {
        let urls = self.settings.external_api_urls().await?;
        if let Some(url) = urls.completed {
            return Ok(Some(url));
        }
        Ok(urls
            .general
            .or_else(|| self.fallback_url.clone())
            .map(|g| completed_base_from_general(&g)))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MoListItem {
    pub mo_number: String,
    pub sku_name: String,
    pub quantity: f64,
    pub uom: Option<String>,
    pub note: Option<String>,
}

#[derive(Debug, Serialize)]
struct MoListBody<'a> {
    mo_list: &'a [MoListItem],
}

/// POSTs the cached MO list to the general external URL.
pub async fn publish_mo_list(
    notifier: &HttpStatusNotifier,
    url: &str,
    items: &[MoListItem],
) -> Result<DeliveryOutcome, NotifierError> {
    notifier
        .send_json(Method::POST, url, &MoListBody { mo_list: items })
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rstest::rstest;

    #[rstest]
    #[case("https://dash.example.com/API", "https://dash.example.com/API/manufacturing")]
    #[case(
        "https://dash.example.com/API/test?x=1",
        "https://dash.example.com/API/manufacturing"
    )]
    #[case(
        "https://dash.example.com/api/manufacturing",
        "https://dash.example.com/api/manufacturing"
    )]
    fn active_url_is_derived(#[case] general: &str, #[case] expected: &str) {
        assert_eq!(active_url_from_general(general), expected);
    }

    #[rstest]
    #[case("https://dash.example.com/API/", "https://dash.example.com/API")]
    #[case("https://dash.example.com/API/testing?k=v", "https://dash.example.com/API")]
    fn completed_base_is_derived(#[case] general: &str, #[case] expected: &str) {
        assert_eq!(completed_base_from_general(general), expected);
    }

    #[rstest]
    #[case("https://d.example.com/API", "42", "https://d.example.com/API/manufacturing/42")]
    #[case(
        "https://d.example.com/API/Manufacturing/",
        "42",
        "https://d.example.com/API/Manufacturing/42"
    )]
    #[case(
        "https://d.example.com/API",
        "MO/2024/001",
        "https://d.example.com/API/manufacturing/MO%2F2024%2F001"
    )]
    fn put_url_appends_identifier(#[case] base: &str, #[case] id: &str, #[case] expected: &str) {
        assert_eq!(completed_put_url(base, id).unwrap(), expected);
    }

    #[test]
    fn put_url_rejects_garbage() {
        assert!(completed_put_url("not a url", "1").is_err());
    }

    #[test]
    fn payload_formats_finish_time_in_report_offset() {
        let finished = Utc.with_ymd_and_hms(2024, 5, 1, 10, 30, 0).unwrap();
        let payload =
            ManufacturingPayload::new("MO1", "SKU-A", 100.0, Some(50), "Budi", Some(finished), 7);
        assert_eq!(payload.sku_name, "Product SKU-A");
        assert_eq!(
            payload.finished_at.as_deref(),
            Some("2024-05-01T17:30:00.000+07:00")
        );

        let active = ManufacturingPayload::new("MO1", "SKU-A", 0.0, None, "", None, 7);
        assert!(active.finished_at.is_none());
        assert!(active.done_qty.is_none());
    }
}
