//! Local mirror of ERP manufacturing orders.
//!
//! Orders are pulled from Odoo's JSON-RPC `search_read` endpoint per
//! production line, upserted by MO number, and read back by the capture
//! forms, the completion workflow (target quantity) and the MO list publisher.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, NaiveDateTime, Utc};
use metrics::counter;
use reqwest::header::COOKIE;
use sea_orm::{
    sea_query::{Expr, Func, OnConflict},
    ColumnTrait, Condition, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect,
    Set,
};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{error, info, instrument, warn};

use crate::{
    config::AppConfig,
    db::DbPool,
    entities::mo_cache::{self, Entity as MoCache},
    errors::ServiceError,
    models::ProductionLine,
    services::{
        admin_settings::AdminSettingsService,
        notifier::{publish_mo_list, EndpointResolver, HttpStatusNotifier, MoListItem},
    },
};

const SEARCH_LIMIT: u64 = 50;
const LIST_LIMIT: u64 = 1000;

/// One manufacturing order as returned by the ERP
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ErpManufacturingOrder {
    pub id: i64,
    pub name: String,
    #[serde(rename = "product_id", default, deserialize_with = "many2one_name")]
    pub product: Option<String>,
    #[serde(rename = "product_qty", default)]
    pub quantity: f64,
    #[serde(rename = "product_uom_id", default, deserialize_with = "many2one_name")]
    pub uom: Option<String>,
    #[serde(default, deserialize_with = "odoo_text")]
    pub note: Option<String>,
    #[serde(default, deserialize_with = "odoo_datetime")]
    pub create_date: Option<DateTime<Utc>>,
}

/// Many2one fields arrive as `[id, "display name"]` or `false`.
fn many2one_name<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Array(items) => items.get(1).and_then(Value::as_str).map(str::to_string),
        _ => None,
    })
}

/// Text fields are `false` when empty.
fn odoo_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(value
        .as_str()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string))
}

/// Datetimes are naive UTC strings, `YYYY-MM-DD HH:MM:SS`.
fn odoo_datetime<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(value.as_str().and_then(|s| {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
            .ok()
            .map(|naive| naive.and_utc())
    }))
}

#[derive(Debug, Error)]
pub enum OdooError {
    #[error("ERP session is not configured")]
    NotConfigured,
    #[error("ERP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("ERP returned status {0}")]
    Status(u16),
    #[error("ERP error: {0}")]
    Rpc(String),
}

/// Where manufacturing orders come from
#[async_trait]
pub trait ManufacturingOrderSource: Send + Sync {
    async fn fetch_manufacturing_orders(
        &self,
        line: ProductionLine,
        since: NaiveDate,
    ) -> Result<Vec<ErpManufacturingOrder>, OdooError>;
}

/// Search domain: note matches any line keyword, created on or after `since`.
pub fn build_domain(keywords: &[&str], since: NaiveDate) -> Value {
    let mut domain: Vec<Value> = vec![json!("&")];
    for _ in 1..keywords.len() {
        domain.push(json!("|"));
    }
    for keyword in keywords {
        domain.push(json!(["note", "ilike", keyword]));
    }
    domain.push(json!([
        "create_date",
        ">=",
        format!("{} 00:00:00", since.format("%Y-%m-%d"))
    ]));
    Value::Array(domain)
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Vec<ErpManufacturingOrder>>,
    #[serde(default)]
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    #[serde(default)]
    message: String,
    #[serde(default)]
    data: Option<RpcErrorData>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorData {
    #[serde(default)]
    message: Option<String>,
}

/// Odoo JSON-RPC client authenticated with a browser session cookie
#[derive(Clone)]
pub struct OdooClient {
    client: reqwest::Client,
    base_url: String,
    session_id: String,
    limit: u32,
}

impl OdooClient {
    pub fn new(
        base_url: &str,
        session_id: &str,
        timeout: Duration,
        limit: u32,
    ) -> Result<Self, OdooError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            session_id: session_id.to_string(),
            limit,
        })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/web/dataset/call_kw/mrp.production/search_read",
            self.base_url
        )
    }
}

#[async_trait]
impl ManufacturingOrderSource for OdooClient {
    async fn fetch_manufacturing_orders(
        &self,
        line: ProductionLine,
        since: NaiveDate,
    ) -> Result<Vec<ErpManufacturingOrder>, OdooError> {
        let body = json!({
            "jsonrpc": "2.0",
            "method": "call",
            "params": {
                "model": "mrp.production",
                "method": "search_read",
                "args": [build_domain(line.note_keywords(), since)],
                "kwargs": {
                    "fields": ["id", "name", "product_id", "product_qty", "product_uom_id", "note", "create_date"],
                    "limit": self.limit,
                    "order": "create_date desc"
                }
            }
        });

        let response = self
            .client
            .post(self.endpoint())
            .header(COOKIE, format!("session_id={}", self.session_id))
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(OdooError::Status(response.status().as_u16()));
        }

        let rpc: RpcResponse = response.json().await?;
        if let Some(err) = rpc.error {
            let detail = err
                .data
                .and_then(|d| d.message)
                .filter(|m| !m.is_empty())
                .unwrap_or(err.message);
            return Err(OdooError::Rpc(detail));
        }
        Ok(rpc.result.unwrap_or_default())
    }
}

/// Tuning for the cache and its ERP pulls
#[derive(Debug, Clone)]
pub struct MoCacheConfig {
    pub days_back: i64,
    pub fetch_limit: u32,
    pub fetch_timeout: Duration,
    pub retention_days: i64,
    pub odoo_base_url: Option<String>,
    pub odoo_session_id: Option<String>,
}

impl From<&AppConfig> for MoCacheConfig {
    fn from(cfg: &AppConfig) -> Self {
        Self {
            days_back: cfg.mo_sync_days_back,
            fetch_limit: cfg.mo_sync_limit,
            fetch_timeout: Duration::from_secs(cfg.odoo_timeout_secs),
            retention_days: cfg.mo_retention_days,
            odoo_base_url: cfg.odoo_base_url.clone(),
            odoo_session_id: cfg.odoo_session_id.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct LineRefresh {
    pub line: String,
    pub fetched: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RefreshReport {
    pub skipped: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub total_updated: usize,
    pub lines: Vec<LineRefresh>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MoCacheStats {
    pub total: u64,
    pub recent_24h: u64,
    pub older_than_7_days: u64,
    pub last_updated: Option<DateTime<Utc>>,
}

#[derive(Clone)]
pub struct MoCacheService {
    db: Arc<DbPool>,
    settings: AdminSettingsService,
    config: MoCacheConfig,
}

impl MoCacheService {
    pub fn new(db: Arc<DbPool>, settings: AdminSettingsService, config: MoCacheConfig) -> Self {
        Self {
            db,
            settings,
            config,
        }
    }

    /// Builds an ERP client from admin settings, falling back to configuration.
    pub async fn odoo_client(&self) -> Result<OdooClient, ServiceError> {
        let (base, session) = self.settings.odoo_session().await?;
        let base = base.or_else(|| self.config.odoo_base_url.clone());
        let session = session.or_else(|| self.config.odoo_session_id.clone());
        match (base, session) {
            (Some(base), Some(session)) => OdooClient::new(
                &base,
                &session,
                self.config.fetch_timeout,
                self.config.fetch_limit,
            )
            .map_err(|e| ServiceError::InternalError(e.to_string())),
            _ => Err(ServiceError::ExternalServiceError(
                OdooError::NotConfigured.to_string(),
            )),
        }
    }

    /// Refreshes from the configured ERP. A missing session skips the refresh.
    #[instrument(skip(self))]
    pub async fn refresh(&self) -> Result<RefreshReport, ServiceError> {
        match self.odoo_client().await {
            Ok(client) => self.refresh_from(&client, Utc::now()).await,
            Err(ServiceError::ExternalServiceError(msg)) => {
                warn!("skipping MO refresh: {}", msg);
                Ok(RefreshReport {
                    skipped: true,
                    message: Some(msg),
                    ..RefreshReport::default()
                })
            }
            Err(e) => Err(e),
        }
    }

    /// Pulls every line from `source` and upserts the results. A failing line
    /// is reported and does not stop the others.
    pub async fn refresh_from(
        &self,
        source: &dyn ManufacturingOrderSource,
        now: DateTime<Utc>,
    ) -> Result<RefreshReport, ServiceError> {
        let since = (now - ChronoDuration::days(self.config.days_back)).date_naive();
        let mut report = RefreshReport::default();

        for line in ProductionLine::all() {
            match source.fetch_manufacturing_orders(line, since).await {
                Ok(orders) => {
                    let fetched = orders.len();
                    self.upsert(&orders, now).await?;
                    report.total_updated += fetched;
                    info!(line = %line, fetched, "MO cache updated");
                    report.lines.push(LineRefresh {
                        line: line.to_string(),
                        fetched,
                        error: None,
                    });
                }
                Err(e) => {
                    counter!("authenticity_mo_cache.refresh_failures", 1);
                    error!(line = %line, error = %e, "MO fetch failed");
                    report.lines.push(LineRefresh {
                        line: line.to_string(),
                        fetched: 0,
                        error: Some(e.to_string()),
                    });
                }
            }
        }

        info!(total = report.total_updated, "MO cache refresh completed");
        Ok(report)
    }

    /// Inserts or updates rows keyed by MO number. `fetched_at` keeps the
    /// first time an MO was seen.
    pub async fn upsert(
        &self,
        orders: &[ErpManufacturingOrder],
        now: DateTime<Utc>,
    ) -> Result<(), ServiceError> {
        for order in orders {
            let model = mo_cache::ActiveModel {
                mo_number: Set(order.name.clone()),
                sku_name: Set(order.product.clone().unwrap_or_else(|| "N/A".to_string())),
                quantity: Set(order.quantity),
                uom: Set(order.uom.clone()),
                note: Set(order.note.clone()),
                create_date: Set(Some(order.create_date.unwrap_or(now))),
                fetched_at: Set(now),
                last_updated: Set(now),
                ..Default::default()
            };

            MoCache::insert(model)
                .on_conflict(
                    OnConflict::column(mo_cache::Column::MoNumber)
                        .update_columns([
                            mo_cache::Column::SkuName,
                            mo_cache::Column::Quantity,
                            mo_cache::Column::Uom,
                            mo_cache::Column::Note,
                            mo_cache::Column::CreateDate,
                            mo_cache::Column::LastUpdated,
                        ])
                        .to_owned(),
                )
                .exec(&*self.db)
                .await?;
        }
        Ok(())
    }

    pub async fn get(&self, mo_number: &str) -> Result<Option<mo_cache::Model>, ServiceError> {
        Ok(MoCache::find()
            .filter(mo_cache::Column::MoNumber.eq(mo_number))
            .one(&*self.db)
            .await?)
    }

    /// Target quantity for an MO, if cached.
    pub async fn lookup_quantity(&self, mo_number: &str) -> Result<Option<f64>, ServiceError> {
        Ok(self.get(mo_number).await?.map(|m| m.quantity))
    }

    fn note_condition(line: ProductionLine) -> Condition {
        line.note_keywords()
            .iter()
            .fold(Condition::any(), |cond, keyword| {
                cond.add(
                    Expr::expr(Func::lower(Expr::col(mo_cache::Column::Note)))
                        .like(format!("%{}%", keyword)),
                )
            })
    }

    /// Cached MOs whose note matches the line, newest first.
    pub async fn list_for_line(
        &self,
        line: Option<ProductionLine>,
    ) -> Result<Vec<mo_cache::Model>, ServiceError> {
        let mut query = MoCache::find();
        if let Some(line) = line {
            query = query.filter(Self::note_condition(line));
        }
        Ok(query
            .order_by_desc(mo_cache::Column::CreateDate)
            .order_by_asc(mo_cache::Column::MoNumber)
            .limit(LIST_LIMIT)
            .all(&*self.db)
            .await?)
    }

    /// Case-insensitive match on MO number or SKU name.
    pub async fn search(
        &self,
        query: &str,
        line: Option<ProductionLine>,
    ) -> Result<Vec<mo_cache::Model>, ServiceError> {
        let term = query.trim().to_lowercase();
        if term.is_empty() {
            return Err(ServiceError::ValidationError(
                "Search query (q) is required".to_string(),
            ));
        }
        let pattern = format!("%{}%", term);

        let mut select = MoCache::find().filter(
            Condition::any()
                .add(Expr::expr(Func::lower(Expr::col(mo_cache::Column::MoNumber))).like(&pattern))
                .add(Expr::expr(Func::lower(Expr::col(mo_cache::Column::SkuName))).like(&pattern)),
        );
        if let Some(line) = line {
            select = select.filter(Self::note_condition(line));
        }
        Ok(select
            .order_by_asc(mo_cache::Column::MoNumber)
            .limit(SEARCH_LIMIT)
            .all(&*self.db)
            .await?)
    }

    pub async fn stats(&self, now: DateTime<Utc>) -> Result<MoCacheStats, ServiceError> {
        let db = &*self.db;
        let total = MoCache::find().count(db).await?;
        let recent_24h = MoCache::find()
            .filter(mo_cache::Column::FetchedAt.gt(now - ChronoDuration::hours(24)))
            .count(db)
            .await?;
        let older_than_7_days = MoCache::find()
            .filter(mo_cache::Column::CreateDate.lt(self.retention_cutoff(now)))
            .count(db)
            .await?;
        let last_updated = MoCache::find()
            .order_by_desc(mo_cache::Column::LastUpdated)
            .one(db)
            .await?
            .map(|m| m.last_updated);

        Ok(MoCacheStats {
            total,
            recent_24h,
            older_than_7_days,
            last_updated,
        })
    }

    fn retention_cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - ChronoDuration::days(self.config.retention_days)
    }

    /// Deletes cache rows created before the retention window.
    #[instrument(skip(self))]
    pub async fn cleanup(&self, now: DateTime<Utc>) -> Result<u64, ServiceError> {
        let res = MoCache::delete_many()
            .filter(mo_cache::Column::CreateDate.lt(self.retention_cutoff(now)))
            .exec(&*self.db)
            .await?;
        info!(deleted = res.rows_affected, "MO cache retention sweep");
        Ok(res.rows_affected)
    }

    /// Every cached MO, ordered by number, in publishable form.
    pub async fn mo_list(&self) -> Result<Vec<MoListItem>, ServiceError> {
        let rows = MoCache::find()
            .order_by_asc(mo_cache::Column::MoNumber)
            .all(&*self.db)
            .await?;
        Ok(rows
            .into_iter()
            .map(|r| MoListItem {
                mo_number: r.mo_number,
                sku_name: r.sku_name,
                quantity: r.quantity,
                uom: r.uom,
                note: r.note,
            })
            .collect())
    }
}

/// Schedule for the background refresh
#[derive(Debug, Clone)]
pub struct MoSyncSchedule {
    pub initial_delay: Duration,
    pub interval: Duration,
    pub publish_delay: Duration,
}

impl From<&AppConfig> for MoSyncSchedule {
    fn from(cfg: &AppConfig) -> Self {
        Self {
            initial_delay: Duration::from_secs(cfg.mo_sync_initial_delay_secs),
            interval: Duration::from_secs(cfg.mo_sync_interval_secs),
            publish_delay: Duration::from_secs(cfg.mo_list_publish_delay_secs),
        }
    }
}

/// Periodically refreshes the cache and publishes the MO list afterwards
#[derive(Clone)]
pub struct MoSyncScheduler {
    cache: MoCacheService,
    resolver: EndpointResolver,
    notifier: HttpStatusNotifier,
    schedule: MoSyncSchedule,
}

impl MoSyncScheduler {
    pub fn new(
        cache: MoCacheService,
        resolver: EndpointResolver,
        notifier: HttpStatusNotifier,
        schedule: MoSyncSchedule,
    ) -> Self {
        Self {
            cache,
            resolver,
            notifier,
            schedule,
        }
    }

    /// Sends the cached MO list to the general external URL. Returns the
    /// number of items sent, or `None` when there was nothing to send.
    pub async fn publish(&self) -> Result<Option<usize>, ServiceError> {
        let items = self.cache.mo_list().await?;
        if items.is_empty() {
            info!("no MO data to publish");
            return Ok(None);
        }
        let Some(url) = self.resolver.general_url().await? else {
            warn!("External API URL not configured, MO list not published");
            return Ok(None);
        };
        publish_mo_list(&self.notifier, &url, &items)
            .await
            .map_err(|e| ServiceError::ExternalServiceError(e.to_string()))?;
        info!(count = items.len(), "MO list published");
        Ok(Some(items.len()))
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            tokio::time::sleep(self.schedule.initial_delay).await;
            let mut ticker = tokio::time::interval(self.schedule.interval);
            loop {
                ticker.tick().await;
                match self.cache.refresh().await {
                    Ok(report) if !report.skipped => {
                        tokio::time::sleep(self.schedule.publish_delay).await;
                        if let Err(e) = self.publish().await {
                            error!(error = %e, "MO list publish failed");
                        }
                    }
                    Ok(_) => {}
                    Err(e) => error!(error = %e, "scheduled MO refresh failed"),
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_ors_keywords_and_ands_date() {
        let since = NaiveDate::from_ymd_opt(2024, 4, 1).unwrap();
        let domain = build_domain(ProductionLine::Cartridge.note_keywords(), since);
        assert_eq!(
            domain,
            json!([
                "&",
                "|",
                "|",
                ["note", "ilike", "cartridge"],
                ["note", "ilike", "cartirdge"],
                ["note", "ilike", "cartrige"],
                ["create_date", ">=", "2024-04-01 00:00:00"]
            ])
        );

        let single = build_domain(ProductionLine::Liquid.note_keywords(), since);
        assert_eq!(
            single,
            json!([
                "&",
                ["note", "ilike", "liquid"],
                ["create_date", ">=", "2024-04-01 00:00:00"]
            ])
        );
    }

    #[test]
    fn erp_records_tolerate_false_fields() {
        let raw = json!({
            "id": 7,
            "name": "MO/0007",
            "product_id": [12, "[SKU-1] Mango Liquid"],
            "product_qty": 250.0,
            "product_uom_id": false,
            "note": false,
            "create_date": "2024-04-02 08:15:00"
        });
        let mo: ErpManufacturingOrder = serde_json::from_value(raw).unwrap();
        assert_eq!(mo.product.as_deref(), Some("[SKU-1] Mango Liquid"));
        assert_eq!(mo.uom, None);
        assert_eq!(mo.note, None);
        assert_eq!(
            mo.create_date.map(|d| d.to_rfc3339()),
            Some("2024-04-02T08:15:00+00:00".to_string())
        );
    }
}
