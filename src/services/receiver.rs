//! Inbound copies of manufacturing records from the third-party dashboard.
//!
//! The dashboard echoes what it stored back to us; the newest record per MO
//! supplies the identifier used for completed PUTs.

use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Set, TryIntoModel,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};

use crate::{
    db::DbPool,
    entities::manufacturing_identity::{self, Entity as ManufacturingIdentity},
    errors::ServiceError,
};

pub const STATUS_ACTIVE: &str = "active";
pub const STATUS_COMPLETED: &str = "completed";

const DEFAULT_LIMIT: u64 = 100;

/// Body posted by the dashboard
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ManufacturingRecord {
    pub manufacturing_id: Option<String>,
    pub sku: Option<String>,
    pub sku_name: Option<String>,
    pub target_qty: Option<f64>,
    pub done_qty: Option<f64>,
    pub leader_name: Option<String>,
    pub finished_at: Option<DateTime<Utc>>,
}

struct RequiredFields {
    sku: String,
    sku_name: String,
    target_qty: f64,
    leader_name: String,
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

impl ManufacturingRecord {
    fn required(&self) -> Result<RequiredFields, ServiceError> {
        match (
            non_blank(&self.sku),
            non_blank(&self.sku_name),
            self.target_qty,
            non_blank(&self.leader_name),
        ) {
            (Some(sku), Some(sku_name), Some(target_qty), Some(leader_name)) => {
                Ok(RequiredFields {
                    sku,
                    sku_name,
                    target_qty,
                    leader_name,
                })
            }
            _ => Err(ServiceError::ValidationError(
                "Missing required fields: sku, sku_name, target_qty, leader_name".to_string(),
            )),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ReceiptAck {
    pub manufacturing_id: String,
    pub status: &'static str,
    pub received_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct IdentityQuery {
    pub status: Option<String>,
    pub manufacturing_id: Option<String>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct IdentityPage {
    pub total: u64,
    pub limit: u64,
    pub offset: u64,
    pub data: Vec<manufacturing_identity::Model>,
}

#[derive(Clone)]
pub struct ReceiverService {
    db: Arc<DbPool>,
}

impl ReceiverService {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self { db }
    }

    /// Stores an active record, updating the existing active one for the MO.
    #[instrument(skip(self, record))]
    pub async fn receive_active(
        &self,
        record: ManufacturingRecord,
    ) -> Result<ReceiptAck, ServiceError> {
        let manufacturing_id = non_blank(&record.manufacturing_id).ok_or_else(|| {
            ServiceError::ValidationError(
                "Missing required fields: manufacturing_id, sku, sku_name, target_qty, leader_name"
                    .to_string(),
            )
        })?;
        let fields = record.required()?;

        let existing = ManufacturingIdentity::find()
            .filter(manufacturing_identity::Column::ManufacturingId.eq(manufacturing_id.as_str()))
            .filter(manufacturing_identity::Column::Status.eq(STATUS_ACTIVE))
            .one(&*self.db)
            .await?;
        self.save(
            existing,
            &manufacturing_id,
            fields,
            &record,
            STATUS_ACTIVE,
        )
        .await?;

        info!(manufacturing_id = %manufacturing_id, "active manufacturing record received");
        Ok(ReceiptAck {
            manufacturing_id,
            status: STATUS_ACTIVE,
            received_at: Utc::now(),
        })
    }

    /// Marks an MO completed. The MO number in the body wins over the path,
    /// which may carry the numeric id instead.
    #[instrument(skip(self, record))]
    pub async fn receive_completed(
        &self,
        path_id: &str,
        record: ManufacturingRecord,
    ) -> Result<ReceiptAck, ServiceError> {
        let manufacturing_id = non_blank(&record.manufacturing_id)
            .or_else(|| Some(path_id.trim().to_string()).filter(|v| !v.is_empty()))
            .ok_or_else(|| {
                ServiceError::ValidationError(
                    "manufacturing_id is required (in URL parameter or request body)".to_string(),
                )
            })?;
        let fields = record.required()?;

        let candidates = ManufacturingIdentity::find()
            .filter(manufacturing_identity::Column::ManufacturingId.eq(manufacturing_id.as_str()))
            .filter(
                manufacturing_identity::Column::Status.is_in([STATUS_COMPLETED, STATUS_ACTIVE]),
            )
            .order_by_desc(manufacturing_identity::Column::CreatedAt)
            .all(&*self.db)
            .await?;
        let existing = candidates
            .iter()
            .find(|r| r.status == STATUS_COMPLETED)
            .or_else(|| candidates.first())
            .cloned();
        self.save(
            existing,
            &manufacturing_id,
            fields,
            &record,
            STATUS_COMPLETED,
        )
        .await?;

        info!(manufacturing_id = %manufacturing_id, "completed manufacturing record received");
        Ok(ReceiptAck {
            manufacturing_id,
            status: STATUS_COMPLETED,
            received_at: Utc::now(),
        })
    }

    async fn save(
        &self,
        existing: Option<manufacturing_identity::Model>,
        manufacturing_id: &str,
        fields: RequiredFields,
        record: &ManufacturingRecord,
        status: &str,
    ) -> Result<manufacturing_identity::Model, ServiceError> {
        let now = Utc::now();
        let mut model: manufacturing_identity::ActiveModel = match existing {
            Some(row) => row.into(),
            None => manufacturing_identity::ActiveModel {
                manufacturing_id: Set(manufacturing_id.to_string()),
                created_at: Set(now),
                ..Default::default()
            },
        };
        model.sku = Set(fields.sku);
        model.sku_name = Set(fields.sku_name);
        model.target_qty = Set(fields.target_qty);
        model.done_qty = Set(record.done_qty);
        model.leader_name = Set(fields.leader_name);
        model.finished_at = Set(record.finished_at);
        model.status = Set(status.to_string());
        model.updated_at = Set(now);
        Ok(model.save(&*self.db).await?.try_into_model()?)
    }

    pub async fn list(&self, query: &IdentityQuery) -> Result<IdentityPage, ServiceError> {
        let mut condition = Condition::all();
        if let Some(status) = non_blank(&query.status) {
            condition = condition.add(manufacturing_identity::Column::Status.eq(status));
        }
        if let Some(id) = non_blank(&query.manufacturing_id) {
            condition = condition.add(manufacturing_identity::Column::ManufacturingId.eq(id));
        }
        let limit = query.limit.filter(|l| *l > 0).unwrap_or(DEFAULT_LIMIT);
        let offset = query.offset.unwrap_or(0);

        let total = ManufacturingIdentity::find()
            .filter(condition.clone())
            .count(&*self.db)
            .await?;
        let data = ManufacturingIdentity::find()
            .filter(condition)
            .order_by_desc(manufacturing_identity::Column::CreatedAt)
            .order_by_desc(manufacturing_identity::Column::Id)
            .limit(limit)
            .offset(offset)
            .all(&*self.db)
            .await?;
        Ok(IdentityPage {
            total,
            limit,
            offset,
            data,
        })
    }

    /// All records for one MO, newest first. 404 when there are none.
    pub async fn find(
        &self,
        manufacturing_id: &str,
        status: Option<&str>,
    ) -> Result<Vec<manufacturing_identity::Model>, ServiceError> {
        let mut query = ManufacturingIdentity::find()
            .filter(manufacturing_identity::Column::ManufacturingId.eq(manufacturing_id));
        if let Some(status) = status.filter(|s| !s.is_empty()) {
            query = query.filter(manufacturing_identity::Column::Status.eq(status));
        }
        let rows = query
            .order_by_desc(manufacturing_identity::Column::CreatedAt)
            .all(&*self.db)
            .await?;
        if rows.is_empty() {
            return Err(ServiceError::NotFound(
                "Manufacturing identity not found".to_string(),
            ));
        }
        Ok(rows)
    }
}
