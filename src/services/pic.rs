use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DbErr, EntityTrait, QueryFilter, QueryOrder, Set,
    SqlErr,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, instrument};

use crate::{
    db::DbPool,
    entities::pic::{self, Entity as Pic},
    errors::ServiceError,
};

#[derive(Debug, Clone, Deserialize)]
pub struct PicUpdate {
    pub name: String,
    pub is_active: Option<bool>,
}

/// Roster of operators selectable as person in charge
#[derive(Clone)]
pub struct PicService {
    db: Arc<DbPool>,
}

fn duplicate_or(err: DbErr) -> ServiceError {
    match err.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(_)) => {
            ServiceError::ValidationError("PIC name already exists".to_string())
        }
        _ => ServiceError::DatabaseError(err),
    }
}

fn required_name(name: &str) -> Result<String, ServiceError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ServiceError::ValidationError(
            "PIC name is required".to_string(),
        ));
    }
    Ok(name.to_string())
}

impl PicService {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self { db }
    }

    /// Active PICs, alphabetical. `include_inactive` returns the full roster.
    pub async fn list(&self, include_inactive: bool) -> Result<Vec<pic::Model>, ServiceError> {
        let mut query = Pic::find().order_by_asc(pic::Column::Name);
        if !include_inactive {
            query = query.filter(pic::Column::IsActive.eq(true));
        }
        Ok(query.all(&*self.db).await?)
    }

    #[instrument(skip(self))]
    pub async fn add(&self, name: &str) -> Result<pic::Model, ServiceError> {
        let name = required_name(name)?;
        let now = Utc::now();
        let model = pic::ActiveModel {
            name: Set(name),
            is_active: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        };
        let saved = model.insert(&*self.db).await.map_err(duplicate_or)?;
        info!(id = saved.id, "PIC added");
        Ok(saved)
    }

    #[instrument(skip(self, update))]
    pub async fn update(&self, id: i32, update: PicUpdate) -> Result<pic::Model, ServiceError> {
        let name = required_name(&update.name)?;
        let existing = Pic::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("PIC not found".to_string()))?;

        let mut model: pic::ActiveModel = existing.into();
        model.name = Set(name);
        model.is_active = Set(update.is_active.unwrap_or(true));
        model.updated_at = Set(Utc::now());
        Ok(model.update(&*self.db).await.map_err(duplicate_or)?)
    }

    /// Soft delete: the PIC stays on old records but leaves the picker.
    #[instrument(skip(self))]
    pub async fn deactivate(&self, id: i32) -> Result<(), ServiceError> {
        let existing = Pic::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("PIC not found".to_string()))?;

        let mut model: pic::ActiveModel = existing.into();
        model.is_active = Set(false);
        model.updated_at = Set(Utc::now());
        model.update(&*self.db).await?;
        info!(id, "PIC deactivated");
        Ok(())
    }
}
