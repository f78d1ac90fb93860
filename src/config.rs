use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info};
use validator::{Validate, ValidationError, ValidationErrors};

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_PORT: u16 = 8080;
const CONFIG_DIR: &str = "config";
const DEFAULT_MAX_RANGE_SPAN: u64 = 7000;
const DEV_DEFAULT_JWT_SECRET: &str =
    "development_only_jwt_secret_for_the_authenticity_tracker_service_0001";

/// Application configuration structure with validation
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Database connection URL
    pub database_url: String,

    /// JWT secret key
    #[validate(length(min = 32), custom = "validate_jwt_secret")]
    pub jwt_secret: String,

    /// JWT expiration time in seconds
    #[validate(range(min = 300, max = 604800))]
    pub jwt_expiration: u64,

    #[serde(default = "default_auth_issuer")]
    pub auth_issuer: String,

    #[serde(default = "default_auth_audience")]
    pub auth_audience: String,

    /// Argon2 PHC hash for the `admin` login; login disabled when unset
    #[serde(default)]
    pub admin_password_hash: Option<String>,

    /// Argon2 PHC hash for the `production` login; login disabled when unset
    #[serde(default)]
    pub production_password_hash: Option<String>,

    /// Server host address
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Application environment
    pub environment: String,

    #[serde(default = "default_log_level")]
    #[validate(custom = "validate_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// Whether to run database migrations on startup
    #[serde(default)]
    pub auto_migrate: bool,

    /// CORS: comma-separated list of allowed origins
    #[serde(default)]
    pub cors_allowed_origins: Option<String>,

    #[serde(default)]
    pub cors_allow_any_origin: bool,

    /// DB pool tuning
    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,
    #[serde(default = "default_db_min_connections")]
    pub db_min_connections: u32,
    #[serde(default = "default_db_connect_timeout_secs")]
    pub db_connect_timeout_secs: u64,
    #[serde(default = "default_db_idle_timeout_secs")]
    pub db_idle_timeout_secs: u64,
    #[serde(default = "default_db_acquire_timeout_secs")]
    pub db_acquire_timeout_secs: u64,

    /// Largest accepted `last - first` span for one authenticity range
    #[serde(default = "default_max_range_span")]
    #[validate(range(min = 1))]
    pub max_range_span: u64,

    /// General third-party endpoint used when no per-status URL is stored in admin config
    #[serde(default)]
    pub external_api_url: Option<String>,

    #[serde(default = "default_notifier_timeout_secs")]
    pub notifier_timeout_secs: u64,

    /// Consecutive failures before the notifier circuit opens
    #[serde(default = "default_circuit_breaker_failures")]
    #[validate(range(min = 1))]
    pub circuit_breaker_failure_threshold: u32,

    /// Seconds the circuit stays open before probing
    #[serde(default = "default_circuit_breaker_timeout")]
    pub circuit_breaker_timeout_secs: u64,

    /// Successful probes needed to close the circuit again
    #[serde(default = "default_circuit_breaker_probes")]
    #[validate(range(min = 1))]
    pub circuit_breaker_success_threshold: u32,

    #[serde(default)]
    pub odoo_base_url: Option<String>,

    #[serde(default)]
    pub odoo_session_id: Option<String>,

    #[serde(default = "default_odoo_timeout_secs")]
    pub odoo_timeout_secs: u64,

    /// Run the periodic MO cache refresh
    #[serde(default = "default_true_bool")]
    pub mo_sync_enabled: bool,

    #[serde(default = "default_mo_sync_interval_secs")]
    #[validate(range(min = 60))]
    pub mo_sync_interval_secs: u64,

    #[serde(default = "default_mo_sync_initial_delay_secs")]
    pub mo_sync_initial_delay_secs: u64,

    #[serde(default = "default_mo_sync_days_back")]
    pub mo_sync_days_back: i64,

    #[serde(default = "default_mo_sync_limit")]
    pub mo_sync_limit: u32,

    /// Delay between a cache refresh and publishing the MO list
    #[serde(default = "default_mo_list_publish_delay_secs")]
    pub mo_list_publish_delay_secs: u64,

    #[serde(default = "default_mo_retention_days")]
    #[validate(range(min = 1))]
    pub mo_retention_days: i64,

    /// Offset applied to `finished_at` in outbound payloads and report dates
    #[serde(default = "default_report_utc_offset_hours")]
    pub report_utc_offset_hours: i32,
}

impl AppConfig {
    /// Minimal configuration with defaults for everything optional
    pub fn new(
        database_url: String,
        jwt_secret: String,
        jwt_expiration: u64,
        host: String,
        port: u16,
        environment: String,
    ) -> Self {
        Self {
            database_url,
            jwt_secret,
            jwt_expiration,
            auth_issuer: default_auth_issuer(),
            auth_audience: default_auth_audience(),
            admin_password_hash: None,
            production_password_hash: None,
            host,
            port,
            environment,
            log_level: default_log_level(),
            log_json: false,
            auto_migrate: false,
            cors_allowed_origins: None,
            cors_allow_any_origin: false,
            db_max_connections: default_db_max_connections(),
            db_min_connections: default_db_min_connections(),
            db_connect_timeout_secs: default_db_connect_timeout_secs(),
            db_idle_timeout_secs: default_db_idle_timeout_secs(),
            db_acquire_timeout_secs: default_db_acquire_timeout_secs(),
            max_range_span: default_max_range_span(),
            external_api_url: None,
            notifier_timeout_secs: default_notifier_timeout_secs(),
            circuit_breaker_failure_threshold: default_circuit_breaker_failures(),
            circuit_breaker_timeout_secs: default_circuit_breaker_timeout(),
            circuit_breaker_success_threshold: default_circuit_breaker_probes(),
            odoo_base_url: None,
            odoo_session_id: None,
            odoo_timeout_secs: default_odoo_timeout_secs(),
            mo_sync_enabled: true,
            mo_sync_interval_secs: default_mo_sync_interval_secs(),
            mo_sync_initial_delay_secs: default_mo_sync_initial_delay_secs(),
            mo_sync_days_back: default_mo_sync_days_back(),
            mo_sync_limit: default_mo_sync_limit(),
            mo_list_publish_delay_secs: default_mo_list_publish_delay_secs(),
            mo_retention_days: default_mo_retention_days(),
            report_utc_offset_hours: default_report_utc_offset_hours(),
        }
    }

    pub fn is_development(&self) -> bool {
        self.environment.eq_ignore_ascii_case("development")
    }

    pub fn has_cors_allowed_origins(&self) -> bool {
        self.cors_allowed_origins
            .as_deref()
            .map(|s| s.split(',').any(|o| !o.trim().is_empty()))
            .unwrap_or(false)
    }

    /// Whether we should fall back to permissive CORS
    pub fn should_allow_permissive_cors(&self) -> bool {
        self.is_development() || self.cors_allow_any_origin
    }

    pub fn log_level(&self) -> &str {
        &self.log_level
    }

    pub fn notifier_timeout(&self) -> Duration {
        Duration::from_secs(self.notifier_timeout_secs)
    }

    pub fn circuit_breaker_timeout(&self) -> Duration {
        Duration::from_secs(self.circuit_breaker_timeout_secs)
    }

    fn validate_additional_constraints(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if !self.should_allow_permissive_cors() && !self.has_cors_allowed_origins() {
            let mut err = ValidationError::new("cors_allowed_origins_required");
            err.message = Some(
                "Set APP__CORS_ALLOWED_ORIGINS for non-development environments or explicitly opt-in via APP__CORS_ALLOW_ANY_ORIGIN=true".into(),
            );
            errors.add("cors_allowed_origins", err);
        }

        if !self.is_development() && self.jwt_secret.trim() == DEV_DEFAULT_JWT_SECRET {
            let mut err = ValidationError::new("jwt_secret_default_dev");
            err.message = Some(
                "The bundled development JWT secret must not be used outside development. Set APP__JWT_SECRET to a unique value."
                    .into(),
            );
            errors.add("jwt_secret", err);
        }

        if self.mo_sync_days_back <= 0 {
            let mut err = ValidationError::new("mo_sync_days_back");
            err.message = Some("mo_sync_days_back must be positive".into());
            errors.add("mo_sync_days_back", err);
        }

        if !(-12..=14).contains(&self.report_utc_offset_hours) {
            let mut err = ValidationError::new("report_utc_offset_hours");
            err.message = Some("report_utc_offset_hours must be between -12 and 14".into());
            errors.add("report_utc_offset_hours", err);
        }

        if errors.errors().is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("Configuration loading failed: {0}")]
    Load(#[from] ConfigError),

    #[error("Configuration validation failed: {0}")]
    Validation(#[from] ValidationErrors),
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}
fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_auth_issuer() -> String {
    "authenticity-tracker".to_string()
}
fn default_auth_audience() -> String {
    "authenticity-tracker-clients".to_string()
}
fn default_db_max_connections() -> u32 {
    16
}
fn default_db_min_connections() -> u32 {
    2
}
fn default_db_connect_timeout_secs() -> u64 {
    30
}
fn default_db_idle_timeout_secs() -> u64 {
    600
}
fn default_db_acquire_timeout_secs() -> u64 {
    8
}
fn default_true_bool() -> bool {
    true
}
fn default_max_range_span() -> u64 {
    DEFAULT_MAX_RANGE_SPAN
}
fn default_notifier_timeout_secs() -> u64 {
    30
}
fn default_circuit_breaker_failures() -> u32 {
    10
}
fn default_circuit_breaker_timeout() -> u64 {
    300
}
fn default_circuit_breaker_probes() -> u32 {
    3
}
fn default_odoo_timeout_secs() -> u64 {
    30
}
fn default_mo_sync_interval_secs() -> u64 {
    6 * 60 * 60
}
fn default_mo_sync_initial_delay_secs() -> u64 {
    5
}
fn default_mo_sync_days_back() -> i64 {
    30
}
fn default_mo_sync_limit() -> u32 {
    1000
}
fn default_mo_list_publish_delay_secs() -> u64 {
    10 * 60
}
fn default_mo_retention_days() -> i64 {
    7
}
fn default_report_utc_offset_hours() -> i32 {
    7
}

/// Validates log level values
fn validate_log_level(level: &str) -> Result<(), ValidationError> {
    let valid_levels = ["trace", "debug", "info", "warn", "error"];
    if valid_levels.contains(&level.to_lowercase().as_str()) {
        Ok(())
    } else {
        let mut err = ValidationError::new("log_level");
        err.message = Some("Must be one of: trace, debug, info, warn, error".into());
        Err(err)
    }
}

fn validate_jwt_secret(secret: &str) -> Result<(), ValidationError> {
    let trimmed = secret.trim();

    if let Some(first) = trimmed.chars().next() {
        if trimmed.chars().all(|c| c == first) {
            let mut err = ValidationError::new("jwt_secret");
            err.message = Some("JWT secret cannot be a repeated character sequence".into());
            return Err(err);
        }
    }

    let lower = trimmed.to_ascii_lowercase();
    if ["changeme", "your-secret-key", "default-secret-key"]
        .iter()
        .any(|pattern| lower.contains(pattern))
    {
        let mut err = ValidationError::new("jwt_secret");
        err.message = Some("JWT secret must be overridden with a secure random value".into());
        return Err(err);
    }

    Ok(())
}

/// Initializes tracing using the provided log level as the default filter
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_directive = format!("authenticity_tracker={},tower_http=debug", level);
    let filter_directive = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);

    let filter = EnvFilter::new(filter_directive);
    if json {
        let _ = fmt().with_env_filter(filter).json().try_init();
    } else {
        let _ = fmt().with_env_filter(filter).try_init();
    }
}

/// Loads application configuration
///
/// Layers configuration sources in this order:
/// 1. Built-in defaults
/// 2. Default config (config/default.toml)
/// 3. Environment-specific config (config/{env}.toml)
/// 4. Environment variables (APP__*)
pub fn load_config() -> Result<AppConfig, AppConfigError> {
    let run_env = env::var("RUN_ENV")
        .or_else(|_| env::var("APP_ENV"))
        .unwrap_or_else(|_| DEFAULT_ENV.to_string());
    info!("Loading configuration for environment: {}", run_env);

    if !Path::new(CONFIG_DIR).exists() {
        info!(
            "Config directory '{}' not found; relying on built-in defaults and environment variables",
            CONFIG_DIR
        );
    }

    let mut builder = Config::builder()
        .set_default("database_url", "postgres://localhost/authenticity")?
        .set_default("jwt_expiration", 43_200)?
        .set_default("host", "0.0.0.0")?
        .set_default("port", DEFAULT_PORT as i64)?
        .set_default("environment", run_env.as_str())?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .set_default("log_json", false)?;

    if run_env == DEFAULT_ENV {
        builder = builder.set_default("jwt_secret", DEV_DEFAULT_JWT_SECRET)?;
    }

    let config = builder
        .add_source(File::with_name(&format!("{}/default", CONFIG_DIR)).required(false))
        .add_source(File::with_name(&format!("{}/{}", CONFIG_DIR, run_env)).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    if config.get_string("jwt_secret").is_err() {
        error!("JWT secret is not configured. Set APP__JWT_SECRET to a random string of at least 32 characters.");
        return Err(AppConfigError::Load(ConfigError::NotFound(
            "jwt_secret is required but not configured. Set APP__JWT_SECRET environment variable."
                .into(),
        )));
    }

    let app_config: AppConfig = config.try_deserialize()?;

    app_config.validate().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    app_config.validate_additional_constraints().map_err(|e| {
        error!("Configuration security validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    info!("Configuration loaded successfully");
    Ok(app_config)
}
