#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHasher, SaltString},
    Argon2,
};
use authenticity_tracker::{
    auth::{AuthConfig, AuthService, AuthUser, ROLE_ADMIN, ROLE_PRODUCTION},
    config::AppConfig,
    db,
    models::{AuthenticityRange, NewProductionInput, ProductionLine},
    services::{
        factory::{ServiceContainer, ServiceFactory},
        notifier::{Notification, StatusNotifier},
    },
    AppState,
};
use axum::{
    body::{to_bytes, Body},
    http::{Method, Request, StatusCode},
    Router,
};
use serde_json::Value;
use tower::ServiceExt;

pub const ADMIN_PASSWORD: &str = "admin-floor-pass";
pub const PRODUCTION_PASSWORD: &str = "line-floor-pass";
pub const DASHBOARD_URL: &str = "http://dashboard.test/api";

/// Collects notifications instead of sending them.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().unwrap().clone()
    }
}

impl StatusNotifier for RecordingNotifier {
    fn dispatch(&self, notification: Notification) {
        self.sent.lock().unwrap().push(notification);
    }
}

fn hash(password: &str) -> String {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .unwrap()
        .to_string()
}

pub fn test_config(external_api_url: Option<&str>) -> AppConfig {
    let mut cfg = AppConfig::new(
        "sqlite::memory:".to_string(),
        "test_secret_key_for_testing_purposes_only_32chars".to_string(),
        3600,
        "127.0.0.1".to_string(),
        18_080,
        "test".to_string(),
    );
    cfg.db_max_connections = 1;
    cfg.db_min_connections = 1;
    cfg.mo_sync_enabled = false;
    cfg.external_api_url = external_api_url.map(str::to_string);
    cfg.admin_password_hash = Some(hash(ADMIN_PASSWORD));
    cfg.production_password_hash = Some(hash(PRODUCTION_PASSWORD));
    cfg
}

/// Application backed by an in-memory SQLite database with a recording notifier.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub notifier: Arc<RecordingNotifier>,
    pub auth_service: Arc<AuthService>,
    admin_token: String,
    production_token: String,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_external_url(Some(DASHBOARD_URL)).await
    }

    pub async fn with_external_url(external_api_url: Option<&str>) -> Self {
        let cfg = test_config(external_api_url);
        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");
        let db_arc = Arc::new(pool);

        let notifier = Arc::new(RecordingNotifier::default());
        let factory = ServiceFactory::new(db_arc.clone(), cfg.clone())
            .expect("notifier client")
            .with_status_notifier(notifier.clone());
        let services = ServiceContainer::new(&factory);

        let auth_service = Arc::new(AuthService::new(AuthConfig::from(&cfg)));
        let admin_token = auth_service
            .issue_token(ROLE_ADMIN, vec![ROLE_ADMIN.to_string()])
            .expect("admin token");
        let production_token = auth_service
            .issue_token(ROLE_PRODUCTION, vec![ROLE_PRODUCTION.to_string()])
            .expect("production token");

        let state = AppState {
            db: db_arc,
            config: cfg,
            services,
        };
        let router = authenticity_tracker::app_router(state.clone(), auth_service.clone());

        Self {
            router,
            state,
            notifier,
            auth_service,
            admin_token,
            production_token,
        }
    }

    pub fn admin_token(&self) -> &str {
        &self.admin_token
    }

    pub fn production_token(&self) -> &str {
        &self.production_token
    }

    /// Send a request against the router with an optional bearer token.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        headers: &[(&str, &str)],
    ) -> axum::response::Response {
        let mut builder = Request::builder().method(method).uri(uri);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let body = if let Some(json) = body {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&json).expect("serialize json request body"))
        } else {
            Body::empty()
        };

        self.router
            .clone()
            .oneshot(builder.body(body).expect("build request"))
            .await
            .expect("router error during test request")
    }

    /// JSON request with a bearer token; returns status and parsed body.
    pub async fn call(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> (StatusCode, Value) {
        let auth = token.map(|t| format!("Bearer {}", t));
        let headers: Vec<(&str, &str)> = auth
            .as_deref()
            .map(|a| vec![("authorization", a)])
            .unwrap_or_default();
        let response = self.request(method, uri, body, &headers).await;
        read_json(response).await
    }

    pub async fn insert(
        &self,
        line: ProductionLine,
        mo_number: &str,
        first: &str,
        last: &str,
    ) -> i32 {
        self.state
            .services
            .completion
            .insert_input(line, new_input("S1", mo_number, &[(first, last)]))
            .await
            .expect("insert production input")
            .id
    }
}

pub async fn read_json(response: axum::response::Response) -> (StatusCode, Value) {
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body");
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("json body")
    };
    (status, value)
}

pub fn new_input(session_id: &str, mo_number: &str, ranges: &[(&str, &str)]) -> NewProductionInput {
    NewProductionInput {
        session_id: session_id.to_string(),
        leader_name: "Rina".to_string(),
        shift_number: "1".to_string(),
        pic: "Adi".to_string(),
        mo_number: mo_number.to_string(),
        sku_name: "MANGO-30ML".to_string(),
        authenticity_data: ranges
            .iter()
            .enumerate()
            .map(|(i, (first, last))| AuthenticityRange::new(*first, *last, format!("R{}", i + 1)))
            .collect(),
    }
}

pub fn admin_user() -> AuthUser {
    AuthUser {
        user_id: ROLE_ADMIN.to_string(),
        roles: vec![ROLE_ADMIN.to_string()],
        token_id: "test-admin".to_string(),
    }
}

pub fn production_user() -> AuthUser {
    AuthUser {
        user_id: ROLE_PRODUCTION.to_string(),
        roles: vec![ROLE_PRODUCTION.to_string()],
        token_id: "test-production".to_string(),
    }
}
