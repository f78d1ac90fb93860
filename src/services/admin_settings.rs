use chrono::Utc;
use rand::RngCore;
use sea_orm::{
    sea_query::OnConflict, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, instrument};

use crate::{
    db::DbPool,
    entities::admin_config::{self, Entity as AdminConfig},
    errors::ServiceError,
};

pub const EXTERNAL_API_URL: &str = "external_api_url";
pub const EXTERNAL_API_URL_ACTIVE: &str = "external_api_url_active";
pub const EXTERNAL_API_URL_COMPLETED: &str = "external_api_url_completed";
pub const ODOO_BASE_URL: &str = "odoo_base_url";
pub const ODOO_SESSION_ID: &str = "odoo_session_id";
pub const API_KEY: &str = "api_key";

/// Keys an admin may write through the config endpoint
pub const KNOWN_KEYS: [&str; 6] = [
    EXTERNAL_API_URL,
    EXTERNAL_API_URL_ACTIVE,
    EXTERNAL_API_URL_COMPLETED,
    ODOO_BASE_URL,
    ODOO_SESSION_ID,
    API_KEY,
];

/// URLs configured for the third-party notification API
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExternalApiUrls {
    pub general: Option<String>,
    pub active: Option<String>,
    pub completed: Option<String>,
}

/// Key/value settings editable by admins at runtime
#[derive(Clone)]
pub struct AdminSettingsService {
    db: Arc<DbPool>,
}

impl AdminSettingsService {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self { db }
    }

    /// Value for `key`, treating blank values as unset.
    pub async fn get(&self, key: &str) -> Result<Option<String>, ServiceError> {
        let row = AdminConfig::find()
            .filter(admin_config::Column::ConfigKey.eq(key))
            .one(&*self.db)
            .await?;
        Ok(row
            .map(|r| r.config_value.trim().to_string())
            .filter(|v| !v.is_empty()))
    }

    pub async fn all(&self) -> Result<BTreeMap<String, String>, ServiceError> {
        let rows = AdminConfig::find()
            .order_by_asc(admin_config::Column::ConfigKey)
            .all(&*self.db)
            .await?;
        Ok(rows
            .into_iter()
            .map(|r| (r.config_key, r.config_value))
            .collect())
    }

    #[instrument(skip(self, value))]
    pub async fn set(&self, key: &str, value: &str) -> Result<(), ServiceError> {
        let model = admin_config::ActiveModel {
            config_key: Set(key.to_string()),
            config_value: Set(value.trim().to_string()),
            updated_at: Set(Utc::now()),
            ..Default::default()
        };

        AdminConfig::insert(model)
            .on_conflict(
                OnConflict::column(admin_config::Column::ConfigKey)
                    .update_columns([
                        admin_config::Column::ConfigValue,
                        admin_config::Column::UpdatedAt,
                    ])
                    .to_owned(),
            )
            .exec(&*self.db)
            .await?;
        Ok(())
    }

    /// Writes several keys at once. Unknown keys are rejected before anything is written.
    pub async fn set_many(&self, values: &BTreeMap<String, String>) -> Result<(), ServiceError> {
        if let Some(unknown) = values.keys().find(|k| !KNOWN_KEYS.contains(&k.as_str())) {
            return Err(ServiceError::ValidationError(format!(
                "Unknown configuration key: {}",
                unknown
            )));
        }
        for (key, value) in values {
            self.set(key, value).await?;
        }
        info!(keys = values.len(), "admin configuration updated");
        Ok(())
    }

    pub async fn api_key(&self) -> Result<Option<String>, ServiceError> {
        self.get(API_KEY).await
    }

    /// Replaces the external API key with 32 random bytes, hex encoded.
    pub async fn generate_api_key(&self) -> Result<String, ServiceError> {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        let key = hex::encode(bytes);
        self.set(API_KEY, &key).await?;
        info!("external API key regenerated");
        Ok(key)
    }

    pub async fn external_api_urls(&self) -> Result<ExternalApiUrls, ServiceError> {
        Ok(ExternalApiUrls {
            general: self.get(EXTERNAL_API_URL).await?,
            active: self.get(EXTERNAL_API_URL_ACTIVE).await?,
            completed: self.get(EXTERNAL_API_URL_COMPLETED).await?,
        })
    }

    /// ERP base URL and session cookie, if both are configured.
    pub async fn odoo_session(&self) -> Result<(Option<String>, Option<String>), ServiceError> {
        Ok((
            self.get(ODOO_BASE_URL).await?,
            self.get(ODOO_SESSION_ID).await?,
        ))
    }
}
