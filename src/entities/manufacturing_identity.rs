use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Manufacturing record as accepted back from the third-party dashboard
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "manufacturing_identity")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub manufacturing_id: String,
    pub sku: String,
    pub sku_name: String,
    pub target_qty: f64,
    pub done_qty: Option<f64>,
    pub leader_name: String,
    pub finished_at: Option<DateTime<Utc>>,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
