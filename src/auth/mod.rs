/*!
 * # Authentication and Authorization
 *
 * Two principals exist on the floor: `admin` and `production`. Both log in
 * with a shared password whose argon2 PHC hash lives in configuration, and
 * receive an HS256 JWT carrying their role. Admin-only routes are gated with
 * [`AuthRouterExt::with_role`].
 *
 * External read endpoints use a separate API key stored in admin config and
 * checked by [`api_key_middleware`].
 */

use argon2::{Argon2, PasswordHash, PasswordVerifier};
use axum::{
    extract::{DefaultBodyLimit, Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Extension, Json,
};
use chrono::{Duration as ChronoDuration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::AppConfig;
use crate::services::admin_settings::AdminSettingsService;

pub const ROLE_ADMIN: &str = "admin";
pub const ROLE_PRODUCTION: &str = "production";

/// Claim structure for JWT tokens
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,        // Subject (login name)
    pub roles: Vec<String>, // Granted roles
    pub jti: String,        // JWT ID
    pub iat: i64,           // Issued at time
    pub exp: i64,           // Expiration time
    pub nbf: i64,           // Not valid before time
    pub iss: String,        // Issuer
    pub aud: String,        // Audience
}

/// Authenticated user data extracted from the JWT token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthUser {
    pub user_id: String,
    pub roles: Vec<String>,
    pub token_id: String,
}

impl AuthUser {
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }

    pub fn is_admin(&self) -> bool {
        self.has_role(ROLE_ADMIN)
    }
}

/// Authentication configuration
#[derive(Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub jwt_audience: String,
    pub jwt_issuer: String,
    pub access_token_expiration: Duration,
    pub admin_password_hash: Option<String>,
    pub production_password_hash: Option<String>,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("jwt_audience", &self.jwt_audience)
            .field("jwt_issuer", &self.jwt_issuer)
            .field("access_token_expiration", &self.access_token_expiration)
            .finish_non_exhaustive()
    }
}

impl From<&AppConfig> for AuthConfig {
    fn from(cfg: &AppConfig) -> Self {
        Self {
            jwt_secret: cfg.jwt_secret.clone(),
            jwt_audience: cfg.auth_audience.clone(),
            jwt_issuer: cfg.auth_issuer.clone(),
            access_token_expiration: Duration::from_secs(cfg.jwt_expiration),
            admin_password_hash: cfg.admin_password_hash.clone(),
            production_password_hash: cfg.production_password_hash.clone(),
        }
    }
}

/// Issues and validates access tokens
#[derive(Debug, Clone)]
pub struct AuthService {
    pub config: AuthConfig,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginCredentials {
    pub username: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub success: bool,
    pub message: String,
    pub role: String,
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

impl AuthService {
    pub fn new(config: AuthConfig) -> Self {
        Self { config }
    }

    /// Checks a username/password pair and returns the role it grants.
    pub fn authenticate(&self, username: &str, password: &str) -> Result<&'static str, AuthError> {
        let (role, hash) = match username {
            ROLE_ADMIN => (ROLE_ADMIN, self.config.admin_password_hash.as_deref()),
            ROLE_PRODUCTION => (
                ROLE_PRODUCTION,
                self.config.production_password_hash.as_deref(),
            ),
            _ => return Err(AuthError::InvalidCredentials),
        };

        let Some(hash) = hash else {
            warn!(username, "login attempted for a role without a configured password");
            return Err(AuthError::InvalidCredentials);
        };

        let parsed = PasswordHash::new(hash)
            .map_err(|e| AuthError::InternalError(format!("invalid password hash: {}", e)))?;
        Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .map_err(|_| AuthError::InvalidCredentials)?;
        Ok(role)
    }

    /// Issues an access token for `subject` holding `roles`.
    pub fn issue_token(&self, subject: &str, roles: Vec<String>) -> Result<String, AuthError> {
        let now = Utc::now();
        let exp = now
            + ChronoDuration::from_std(self.config.access_token_expiration)
                .map_err(|_| AuthError::InternalError("Invalid token duration".to_string()))?;

        let claims = Claims {
            sub: subject.to_string(),
            roles,
            jti: Uuid::new_v4().to_string(),
            iat: now.timestamp(),
            exp: exp.timestamp(),
            nbf: now.timestamp(),
            iss: self.config.jwt_issuer.clone(),
            aud: self.config.jwt_audience.clone(),
        };

        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(self.config.jwt_secret.as_bytes()),
        )
        .map_err(|e| AuthError::TokenCreation(e.to_string()))
    }

    /// Validate a JWT token and extract the claims
    pub fn validate_token(&self, token: &str) -> Result<Claims, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_audience(&[self.config.jwt_audience.as_str()]);
        validation.set_issuer(&[self.config.jwt_issuer.as_str()]);

        decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.config.jwt_secret.as_bytes()),
            &validation,
        )
        .map(|data| data.claims)
        .map_err(|e| match e.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::TokenExpired,
            _ => AuthError::InvalidToken,
        })
    }

    pub fn login(&self, credentials: LoginCredentials) -> Result<LoginResponse, AuthError> {
        let username = credentials.username.unwrap_or_default();
        let password = credentials.password.unwrap_or_default();
        if username.is_empty() || password.is_empty() {
            return Err(AuthError::MissingCredentials);
        }

        let role = self.authenticate(&username, &password)?;
        let access_token = self.issue_token(&username, vec![role.to_string()])?;
        debug!(role, "login successful");

        Ok(LoginResponse {
            success: true,
            message: "Login successful".to_string(),
            role: role.to_string(),
            access_token,
            token_type: "Bearer".to_string(),
            expires_in: self.config.access_token_expiration.as_secs() as i64,
        })
    }
}

/// Authentication errors
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Username and password are required")]
    MissingCredentials,

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Authentication required")]
    MissingAuth,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Token has expired")]
    TokenExpired,

    #[error("Token creation failed: {0}")]
    TokenCreation(String),

    #[error("API key is required")]
    MissingApiKey,

    #[error("Invalid API key")]
    InvalidApiKey,

    #[error("Insufficient permissions")]
    InsufficientPermissions,

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, error_code, error_message): (StatusCode, &str, String) = match &self {
            Self::MissingCredentials => (
                StatusCode::BAD_REQUEST,
                "AUTH_MISSING_CREDENTIALS",
                self.to_string(),
            ),
            Self::InvalidCredentials => (
                StatusCode::UNAUTHORIZED,
                "AUTH_INVALID_CREDENTIALS",
                self.to_string(),
            ),
            Self::MissingAuth => (StatusCode::UNAUTHORIZED, "AUTH_MISSING", self.to_string()),
            Self::InvalidToken => (
                StatusCode::UNAUTHORIZED,
                "AUTH_INVALID_TOKEN",
                "Invalid authentication token".to_string(),
            ),
            Self::TokenExpired => (
                StatusCode::UNAUTHORIZED,
                "AUTH_TOKEN_EXPIRED",
                self.to_string(),
            ),
            Self::TokenCreation(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "AUTH_TOKEN_CREATION_FAILED",
                "Token creation failed".to_string(),
            ),
            Self::MissingApiKey => (
                StatusCode::UNAUTHORIZED,
                "AUTH_MISSING_API_KEY",
                "API key is required. Provide an X-API-Key header or Authorization Bearer token."
                    .to_string(),
            ),
            Self::InvalidApiKey => (
                StatusCode::FORBIDDEN,
                "AUTH_INVALID_API_KEY",
                self.to_string(),
            ),
            Self::InsufficientPermissions => (
                StatusCode::FORBIDDEN,
                "AUTH_INSUFFICIENT_PERMISSIONS",
                self.to_string(),
            ),
            Self::InternalError(msg) => {
                tracing::error!(error = %msg, "authentication failure");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "AUTH_INTERNAL_ERROR",
                    "Internal server error".to_string(),
                )
            }
        };

        let body = Json(serde_json::json!({
            "success": false,
            "error": {
                "code": error_code,
                "message": error_message,
            }
        }));

        (status, body).into_response()
    }
}

/// Role middleware to check if a user has the required role
pub async fn role_middleware(
    State(required_role): State<String>,
    request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let user = request
        .extensions()
        .get::<AuthUser>()
        .ok_or(AuthError::MissingAuth)?;

    if !user.has_role(&required_role) {
        return Err(AuthError::InsufficientPermissions);
    }

    Ok(next.run(request).await)
}

/// Authentication middleware that extracts and validates bearer tokens
pub async fn auth_middleware(mut request: Request, next: Next) -> Response {
    let auth_service = match request.extensions().get::<Arc<AuthService>>() {
        Some(service) => service.clone(),
        None => {
            return AuthError::InternalError("authentication service not available".to_string())
                .into_response();
        }
    };

    match extract_auth_from_headers(request.headers(), &auth_service) {
        Ok(user) => {
            request.extensions_mut().insert(user);
            next.run(request).await
        }
        Err(e) => e.into_response(),
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

fn extract_auth_from_headers(
    headers: &HeaderMap,
    auth_service: &AuthService,
) -> Result<AuthUser, AuthError> {
    let token = bearer_token(headers).ok_or(AuthError::MissingAuth)?;
    let claims = auth_service.validate_token(token)?;
    Ok(AuthUser {
        user_id: claims.sub,
        roles: claims.roles,
        token_id: claims.jti,
    })
}

/// Guards external read endpoints with the admin-configured API key. When no
/// key has been configured the endpoints stay open.
pub async fn api_key_middleware(
    State(settings): State<AdminSettingsService>,
    request: Request,
    next: Next,
) -> Result<Response, Response> {
    let stored = settings
        .api_key()
        .await
        .map_err(IntoResponse::into_response)?;

    let Some(stored) = stored.filter(|k| !k.is_empty()) else {
        return Ok(next.run(request).await);
    };

    let headers = request.headers();
    let provided = headers
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .or_else(|| bearer_token(headers))
        .ok_or_else(|| AuthError::MissingApiKey.into_response())?;

    if provided != stored {
        warn!("rejected request with an invalid API key");
        return Err(AuthError::InvalidApiKey.into_response());
    }

    Ok(next.run(request).await)
}

/// Authentication routes
pub fn auth_routes() -> axum::Router<crate::AppState> {
    axum::Router::new()
        .route("/login", axum::routing::post(login_handler))
        .layer(DefaultBodyLimit::max(1024 * 64))
}

/// Login handler
pub async fn login_handler(
    Extension(auth_service): Extension<Arc<AuthService>>,
    Json(credentials): Json<LoginCredentials>,
) -> Result<Json<LoginResponse>, AuthError> {
    auth_service.login(credentials).map(Json)
}

/// Extension methods for Router to add auth middleware
pub trait AuthRouterExt {
    fn with_auth(self) -> Self;
    fn with_role(self, role: &str) -> Self;
}

impl<S> AuthRouterExt for axum::Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    fn with_auth(self) -> Self {
        self.layer(axum::middleware::from_fn(auth_middleware))
    }

    fn with_role(self, role: &str) -> Self {
        self.layer(axum::middleware::from_fn_with_state(
            role.to_string(),
            role_middleware,
        ))
        .with_auth()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use argon2::password_hash::{rand_core::OsRng, PasswordHasher, SaltString};
    use assert_matches::assert_matches;

    fn hash(password: &str) -> String {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .unwrap()
            .to_string()
    }

    fn service() -> AuthService {
        AuthService::new(AuthConfig {
            jwt_secret: "an-adequately-long-secret-for-tests-0123".to_string(),
            jwt_audience: "authenticity-tracker".to_string(),
            jwt_issuer: "authenticity-tracker-auth".to_string(),
            access_token_expiration: Duration::from_secs(3600),
            admin_password_hash: Some(hash("admin-pass")),
            production_password_hash: Some(hash("line-pass")),
        })
    }

    #[test]
    fn login_grants_role_for_matching_password() {
        let svc = service();
        assert_eq!(svc.authenticate("admin", "admin-pass").unwrap(), ROLE_ADMIN);
        assert_eq!(
            svc.authenticate("production", "line-pass").unwrap(),
            ROLE_PRODUCTION
        );
        assert_matches!(
            svc.authenticate("admin", "line-pass"),
            Err(AuthError::InvalidCredentials)
        );
        assert_matches!(
            svc.authenticate("guest", "x"),
            Err(AuthError::InvalidCredentials)
        );
    }

    #[test]
    fn empty_credentials_are_rejected() {
        let result = service().login(LoginCredentials {
            username: Some("admin".into()),
            password: None,
        });
        assert_matches!(result, Err(AuthError::MissingCredentials));
    }

    #[test]
    fn issued_token_round_trips_roles() {
        let svc = service();
        let token = svc.issue_token("admin", vec![ROLE_ADMIN.into()]).unwrap();
        let claims = svc.validate_token(&token).unwrap();
        assert_eq!(claims.sub, "admin");
        assert_eq!(claims.roles, vec!["admin".to_string()]);
    }

    #[test]
    fn token_with_foreign_audience_is_rejected() {
        let svc = service();
        let mut other = svc.clone();
        other.config.jwt_audience = "someone-else".into();
        let token = other.issue_token("admin", vec![ROLE_ADMIN.into()]).unwrap();
        assert_matches!(svc.validate_token(&token), Err(AuthError::InvalidToken));
    }

    #[test]
    fn bearer_token_is_extracted() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, "Bearer abc".parse().unwrap());
        assert_eq!(bearer_token(&headers), Some("abc"));
        headers.insert(header::AUTHORIZATION, "Basic abc".parse().unwrap());
        assert_eq!(bearer_token(&headers), None);
    }
}
