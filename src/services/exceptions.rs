use chrono::Utc;
use std::sync::Arc;
use tracing::{info, instrument};
use validator::Validate;

use crate::{
    db::DbPool,
    errors::ServiceError,
    models::{
        normalize_numbers, ExceptionEntry, ExceptionKind, NewExceptionEntry, ProductionLine,
        UpdateExceptionEntry,
    },
    repositories::ExceptionStore,
};

/// Buffer and reject records for every line
#[derive(Clone)]
pub struct ExceptionService {
    db: Arc<DbPool>,
}

impl ExceptionService {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self { db }
    }

    pub async fn list_by_mo(
        &self,
        line: ProductionLine,
        kind: ExceptionKind,
        mo_number: &str,
    ) -> Result<Vec<ExceptionEntry>, ServiceError> {
        if mo_number.trim().is_empty() {
            return Err(ServiceError::ValidationError(
                "MO Number is required".to_string(),
            ));
        }
        let entries = ExceptionStore::new(line, kind)
            .list_by_mo(&*self.db, mo_number.trim())
            .await?;
        Ok(entries)
    }

    #[instrument(skip(self, entry), fields(mo_number = %entry.mo_number))]
    pub async fn create(
        &self,
        line: ProductionLine,
        kind: ExceptionKind,
        mut entry: NewExceptionEntry,
    ) -> Result<i32, ServiceError> {
        entry.authenticity_numbers = normalize_numbers(entry.authenticity_numbers);
        entry.validate()?;
        let id = ExceptionStore::new(line, kind)
            .insert(&*self.db, &entry, Utc::now())
            .await?;
        info!(id, line = %line, kind = %kind, "exception entry saved");
        Ok(id)
    }

    #[instrument(skip(self, update))]
    pub async fn update(
        &self,
        line: ProductionLine,
        kind: ExceptionKind,
        id: i32,
        mut update: UpdateExceptionEntry,
    ) -> Result<ExceptionEntry, ServiceError> {
        update.authenticity_numbers = update.authenticity_numbers.map(normalize_numbers);
        let store = ExceptionStore::new(line, kind);
        let not_found = || ServiceError::NotFound(format!("{} data {} not found", kind, id));

        let changed = store.update(&*self.db, id, &update).await?;
        let entry = store.get(&*self.db, id).await?.ok_or_else(not_found)?;
        info!(id, changed, "exception entry updated");
        Ok(entry)
    }
}
