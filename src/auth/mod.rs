/*!
 * # Authentication and Authorization Module
 *
 * JWT authentication with refresh-token rotation, Argon2 password
 * verification against the `users` table, and role-based access control.
 * Permission checks wrap route groups through [`AuthRouterExt`].
 */

use argon2::{
    password_hash::{rand_core::OsRng, SaltString},
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
};
use async_trait::async_trait;
use axum::{
    extract::{DefaultBodyLimit, FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json, Router,
};
use chrono::{Duration as ChronoDuration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::db::DbPool;
use crate::entities::user;
use crate::events::{Event, EventSender};

pub mod permissions;
pub mod rbac;

pub use permissions::consts as permission;

/// Claim structure for JWT tokens
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,              // Subject (user ID)
    pub username: Option<String>, // Login name
    pub email: Option<String>,    // User's email
    pub roles: Vec<String>,       // Role names
    pub permissions: Vec<String>, // Resolved permission strings
    pub jti: String,              // JWT ID (unique identifier for this token)
    pub iat: i64,                 // Issued at time
    pub exp: i64,                 // Expiration time
    pub nbf: i64,                 // Not valid before time
    pub iss: String,              // Issuer
    pub aud: String,              // Audience
}

/// Authenticated user data extracted from the JWT token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub username: String,
    pub email: Option<String>,
    pub roles: Vec<String>,
    pub permissions: Vec<String>,
    pub token_id: String,
}

impl AuthUser {
    /// Check if the user has a specific role
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }

    /// Check if the user holds a permission, honoring wildcards
    pub fn has_permission(&self, required: &str) -> bool {
        self.permissions
            .iter()
            .any(|granted| rbac::permission_matches(granted, required))
    }

    /// Check if the user is an admin
    pub fn is_admin(&self) -> bool {
        self.has_role("admin")
    }
}

/// Extracts the user that the auth middleware placed in request extensions.
#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthUser>()
            .cloned()
            .ok_or(AuthError::MissingAuth)
    }
}

/// Authentication configuration
#[derive(Clone, Debug)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub jwt_issuer: String,
    pub jwt_audience: String,
    pub access_token_expiration: Duration,
    pub refresh_token_expiration: Duration,
}

impl AuthConfig {
    pub fn new(
        jwt_secret: String,
        jwt_issuer: String,
        jwt_audience: String,
        access_token_expiration: Duration,
        refresh_token_expiration: Duration,
    ) -> Self {
        Self {
            jwt_secret,
            jwt_issuer,
            jwt_audience,
            access_token_expiration,
            refresh_token_expiration,
        }
    }

    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            jwt_secret: config.jwt_secret.clone(),
            jwt_issuer: config.auth_issuer.clone(),
            jwt_audience: config.auth_audience.clone(),
            access_token_expiration: Duration::from_secs(config.jwt_expiration as u64),
            refresh_token_expiration: Duration::from_secs(config.refresh_token_expiration as u64),
        }
    }
}

/// Authentication service that handles credential checks and token issuance
#[derive(Clone)]
pub struct AuthService {
    pub config: AuthConfig,
    db: Arc<DbPool>,
    event_sender: Option<Arc<EventSender>>,
}

impl AuthService {
    /// Create a new authentication service
    pub fn new(config: AuthConfig, db: Arc<DbPool>, event_sender: Option<Arc<EventSender>>) -> Self {
        Self {
            config,
            db,
            event_sender,
        }
    }

    /// Verify credentials against the users table and issue a token pair
    pub async fn login(&self, username: &str, password: &str) -> Result<TokenPair, AuthError> {
        let found = user::Entity::find()
            .filter(user::Column::Username.eq(username))
            .one(&*self.db)
            .await
            .map_err(|e| AuthError::DatabaseError(e.to_string()))?;

        // Inactive accounts and unknown usernames both read as bad credentials
        let account = match found {
            Some(u) if u.active => u,
            _ => return Err(AuthError::InvalidCredentials),
        };

        if !Self::verify_password(password, &account.password_hash)? {
            return Err(AuthError::InvalidCredentials);
        }

        debug!("User {} authenticated", account.username);

        if let Some(sender) = &self.event_sender {
            let _ = sender.send(Event::UserLoggedIn(account.id)).await;
        }

        self.generate_token(&account)
    }

    /// Generate an access/refresh JWT pair for a user
    pub fn generate_token(&self, account: &user::Model) -> Result<TokenPair, AuthError> {
        let now = Utc::now();
        let access_exp = now
            + ChronoDuration::from_std(self.config.access_token_expiration)
                .map_err(|_| AuthError::InternalError("Invalid token duration".to_string()))?;
        let refresh_exp = now
            + ChronoDuration::from_std(self.config.refresh_token_expiration)
                .map_err(|_| AuthError::InternalError("Invalid token duration".to_string()))?;

        let roles = vec![account.role.clone()];
        let permissions = rbac::permissions_for_role(&account.role);

        let access_claims = Claims {
            sub: account.id.to_string(),
            username: Some(account.username.clone()),
            email: Some(account.email.clone()),
            roles,
            permissions,
            jti: Uuid::new_v4().to_string(),
            iat: now.timestamp(),
            exp: access_exp.timestamp(),
            nbf: now.timestamp(),
            iss: self.config.jwt_issuer.clone(),
            aud: self.config.jwt_audience.clone(),
        };

        // Refresh token carries identity only; roles are re-resolved on use
        let refresh_claims = Claims {
            sub: account.id.to_string(),
            username: None,
            email: None,
            roles: vec![],
            permissions: vec![],
            jti: Uuid::new_v4().to_string(),
            iat: now.timestamp(),
            exp: refresh_exp.timestamp(),
            nbf: now.timestamp(),
            iss: self.config.jwt_issuer.clone(),
            aud: self.config.jwt_audience.clone(),
        };

        let key = EncodingKey::from_secret(self.config.jwt_secret.as_bytes());

        let access_token = encode(&Header::new(Algorithm::HS256), &access_claims, &key)
            .map_err(|e| AuthError::TokenCreation(e.to_string()))?;

        let refresh_token = encode(&Header::new(Algorithm::HS256), &refresh_claims, &key)
            .map_err(|e| AuthError::TokenCreation(e.to_string()))?;

        Ok(TokenPair {
            access_token,
            refresh_token,
            token_type: "Bearer".to_string(),
            expires_in: self.config.access_token_expiration.as_secs() as i64,
            refresh_expires_in: self.config.refresh_token_expiration.as_secs() as i64,
        })
    }

    /// Validate a JWT token and extract the claims
    pub fn validate_token(&self, token: &str) -> Result<Claims, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_nbf = true;
        validation.set_audience(&[self.config.jwt_audience.clone()]);
        validation.set_issuer(&[self.config.jwt_issuer.clone()]);

        let claims = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.config.jwt_secret.as_bytes()),
            &validation,
        )
        .map_err(|e| match e.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::TokenExpired,
            _ => AuthError::InvalidToken,
        })?
        .claims;

        Ok(claims)
    }

    /// Exchange a valid refresh token for a new token pair
    pub async fn refresh_token(&self, refresh_token: &str) -> Result<TokenPair, AuthError> {
        let claims = self.validate_token(refresh_token)?;

        let user_id = Uuid::parse_str(&claims.sub).map_err(|_| AuthError::InvalidToken)?;

        // Re-fetch so role or deactivation changes take effect immediately
        let account = self.get_user(user_id).await?;

        self.generate_token(&account)
    }

    /// Get an active user by ID
    async fn get_user(&self, user_id: Uuid) -> Result<user::Model, AuthError> {
        let account = user::Entity::find_by_id(user_id)
            .one(&*self.db)
            .await
            .map_err(|e| AuthError::DatabaseError(e.to_string()))?
            .ok_or(AuthError::UserNotFound)?;

        if !account.active {
            return Err(AuthError::UserInactive);
        }

        Ok(account)
    }

    /// Hash a password with Argon2 and a fresh salt
    pub fn hash_password(password: &str) -> Result<String, AuthError> {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| AuthError::InternalError(format!("Password hashing failed: {}", e)))
    }

    /// Verify a password against a stored Argon2 hash
    fn verify_password(password: &str, hash: &str) -> Result<bool, AuthError> {
        let parsed = PasswordHash::new(hash)
            .map_err(|e| AuthError::InternalError(format!("Stored hash is invalid: {}", e)))?;

        Ok(Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok())
    }
}

/// Token pair response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: i64,
    pub refresh_expires_in: i64,
}

/// Login credentials
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// Refresh token request
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RefreshTokenRequest {
    pub refresh_token: String,
}

/// Authenticated principal, as returned by `/auth/me`
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct MeResponse {
    pub id: Uuid,
    pub username: String,
    pub email: Option<String>,
    pub roles: Vec<String>,
    pub permissions: Vec<String>,
}

/// Authentication error types
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Missing authentication")]
    MissingAuth,

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Token has expired")]
    TokenExpired,

    #[error("Token creation failed: {0}")]
    TokenCreation(String),

    #[error("Invalid request: {0}")]
    ValidationFailed(String),

    #[error("User not found")]
    UserNotFound,

    #[error("User account is inactive")]
    UserInactive,

    #[error("Insufficient permissions")]
    InsufficientPermissions,

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, error_code, error_message): (StatusCode, &str, String) = match &self {
            Self::MissingAuth => (
                StatusCode::UNAUTHORIZED,
                "AUTH_MISSING",
                "Authentication required".to_string(),
            ),
            Self::InvalidCredentials => (
                StatusCode::UNAUTHORIZED,
                "AUTH_INVALID_CREDENTIALS",
                "Invalid credentials".to_string(),
            ),
            Self::InvalidToken => (
                StatusCode::UNAUTHORIZED,
                "AUTH_INVALID_TOKEN",
                "Invalid authentication token".to_string(),
            ),
            Self::TokenExpired => (
                StatusCode::UNAUTHORIZED,
                "AUTH_TOKEN_EXPIRED",
                "Token has expired".to_string(),
            ),
            Self::TokenCreation(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "AUTH_TOKEN_CREATION_FAILED",
                "Token creation failed".to_string(),
            ),
            Self::ValidationFailed(msg) => (
                StatusCode::BAD_REQUEST,
                "AUTH_VALIDATION",
                msg.clone(),
            ),
            Self::UserNotFound => (
                StatusCode::UNAUTHORIZED,
                "AUTH_USER_NOT_FOUND",
                "User not found".to_string(),
            ),
            Self::UserInactive => (
                StatusCode::UNAUTHORIZED,
                "AUTH_USER_INACTIVE",
                "User account is inactive".to_string(),
            ),
            Self::InsufficientPermissions => (
                StatusCode::FORBIDDEN,
                "AUTH_INSUFFICIENT_PERMISSIONS",
                "Insufficient permissions".to_string(),
            ),
            Self::DatabaseError(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "AUTH_DATABASE_ERROR",
                "Internal authentication error".to_string(),
            ),
            Self::InternalError(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "AUTH_INTERNAL_ERROR",
                "Internal authentication error".to_string(),
            ),
        };

        let body = Json(serde_json::json!({
            "error": {
                "code": error_code,
                "message": error_message,
            }
        }));

        (status, body).into_response()
    }
}

/// Permission middleware to check if a user has the required permission
pub async fn permission_middleware(
    State(required_permission): State<String>,
    request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let user = match request.extensions().get::<AuthUser>() {
        Some(user) => user.clone(),
        None => return Err(AuthError::MissingAuth),
    };

    // Admins bypass individual permission checks
    if user.is_admin() {
        return Ok(next.run(request).await);
    }

    if !user.has_permission(&required_permission) {
        return Err(AuthError::InsufficientPermissions);
    }

    Ok(next.run(request).await)
}

/// Authentication middleware that extracts and validates bearer tokens
pub async fn auth_middleware(mut request: Request, next: Next) -> Response {
    let headers = request.headers().clone();

    let auth_service = match request.extensions().get::<Arc<AuthService>>() {
        Some(service) => service.clone(),
        None => {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Authentication service not available",
            )
                .into_response();
        }
    };

    match extract_auth_from_headers(&headers, &auth_service) {
        Ok(user) => {
            request.extensions_mut().insert(user);
            next.run(request).await
        }
        Err(e) => e.into_response(),
    }
}

/// Extract authentication info from request headers
fn extract_auth_from_headers(
    headers: &HeaderMap,
    auth_service: &AuthService,
) -> Result<AuthUser, AuthError> {
    let auth_header = headers
        .get(header::AUTHORIZATION)
        .ok_or(AuthError::MissingAuth)?;

    let auth_value = auth_header.to_str().map_err(|_| AuthError::InvalidToken)?;

    let token = auth_value
        .strip_prefix("Bearer ")
        .ok_or(AuthError::MissingAuth)?
        .trim();

    let claims = auth_service.validate_token(token)?;

    let user_id = Uuid::parse_str(&claims.sub).map_err(|_| AuthError::InvalidToken)?;

    Ok(AuthUser {
        user_id,
        username: claims.username.unwrap_or_default(),
        email: claims.email,
        roles: claims.roles,
        permissions: claims.permissions,
        token_id: claims.jti,
    })
}

/// Authentication routes: login and refresh are public, me requires a token
pub fn auth_routes() -> Router<Arc<AuthService>> {
    let public = Router::new()
        .route("/login", axum::routing::post(login_handler))
        .route("/refresh", axum::routing::post(refresh_token_handler));

    let authenticated = Router::new()
        .route("/me", axum::routing::get(me_handler))
        .with_auth();

    public
        .merge(authenticated)
        .layer(DefaultBodyLimit::max(1024 * 64)) // 64KB limit
}

/// Login handler
#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Token pair issued", body = TokenPair),
        (status = 401, description = "Invalid credentials")
    ),
    tag = "auth"
)]
pub async fn login_handler(
    State(auth_service): State<Arc<AuthService>>,
    Json(credentials): Json<LoginRequest>,
) -> Result<Json<TokenPair>, AuthError> {
    if credentials.username.trim().is_empty() || credentials.password.is_empty() {
        return Err(AuthError::ValidationFailed(
            "Username and password are required".to_string(),
        ));
    }

    let token_pair = auth_service
        .login(credentials.username.trim(), &credentials.password)
        .await?;

    Ok(Json(token_pair))
}

/// Refresh token handler
#[utoipa::path(
    post,
    path = "/auth/refresh",
    request_body = RefreshTokenRequest,
    responses(
        (status = 200, description = "New token pair issued", body = TokenPair),
        (status = 401, description = "Refresh token invalid or expired")
    ),
    tag = "auth"
)]
pub async fn refresh_token_handler(
    State(auth_service): State<Arc<AuthService>>,
    Json(refresh_request): Json<RefreshTokenRequest>,
) -> Result<Json<TokenPair>, AuthError> {
    let token_pair = auth_service
        .refresh_token(&refresh_request.refresh_token)
        .await?;

    Ok(Json(token_pair))
}

/// Current principal handler
#[utoipa::path(
    get,
    path = "/auth/me",
    responses(
        (status = 200, description = "Authenticated principal", body = MeResponse),
        (status = 401, description = "Not authenticated")
    ),
    security(("bearer_auth" = [])),
    tag = "auth"
)]
pub async fn me_handler(user: AuthUser) -> Json<MeResponse> {
    Json(MeResponse {
        id: user.user_id,
        username: user.username,
        email: user.email,
        roles: user.roles,
        permissions: user.permissions,
    })
}

/// Extension methods for Router to add auth middleware
pub trait AuthRouterExt {
    fn with_auth(self) -> Self;
    fn with_permission(self, permission: &str) -> Self;
}

impl<S> AuthRouterExt for Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    fn with_auth(self) -> Self {
        self.layer(axum::middleware::from_fn(auth_middleware))
    }

    fn with_permission(self, permission: &str) -> Self {
        self.layer(axum::middleware::from_fn_with_state(
            permission.to_string(),
            permission_middleware,
        ))
        .with_auth()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_user() -> AuthUser {
        AuthUser {
            user_id: Uuid::new_v4(),
            username: "clerk1".to_string(),
            email: Some("clerk1@example.com".to_string()),
            roles: vec!["clerk".to_string()],
            permissions: rbac::permissions_for_role("clerk"),
            token_id: Uuid::new_v4().to_string(),
        }
    }

    #[test]
    fn clerk_permissions_resolve_through_wildcards() {
        let user = test_user();
        assert!(user.has_permission("purchaseorders:manage"));
        assert!(user.has_permission("stock:adjust"));
        assert!(!user.has_permission("suppliers:manage"));
        assert!(!user.has_permission("users:manage"));
        assert!(!user.is_admin());
    }

    #[test]
    fn password_hash_round_trip() {
        let hash = AuthService::hash_password("correct horse battery staple").unwrap();
        assert!(AuthService::verify_password("correct horse battery staple", &hash).unwrap());
        assert!(!AuthService::verify_password("wrong password", &hash).unwrap());
    }

    #[test]
    fn token_round_trip_carries_identity() {
        let config = AuthConfig::new(
            "kTqHbWjc4R9sYfLp2XzNvAeG7mQdU3CiK6oPnB8tJxZwSyV5rE1uDhMgF0aOlI4N".to_string(),
            "stockroom-api".to_string(),
            "stockroom-auth".to_string(),
            Duration::from_secs(900),
            Duration::from_secs(86_400),
        );
        let db = Arc::new(sea_orm::DatabaseConnection::Disconnected);
        let service = AuthService::new(config, db, None);

        let account = user::Model {
            id: Uuid::new_v4(),
            username: "manager1".to_string(),
            email: "manager1@example.com".to_string(),
            password_hash: String::new(),
            role: "manager".to_string(),
            active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        let pair = service.generate_token(&account).unwrap();
        let claims = service.validate_token(&pair.access_token).unwrap();

        assert_eq!(claims.sub, account.id.to_string());
        assert_eq!(claims.username.as_deref(), Some("manager1"));
        assert!(claims.roles.contains(&"manager".to_string()));
        assert!(claims
            .permissions
            .contains(&"purchaseorders:*".to_string()));

        // Refresh tokens validate but carry no privileges
        let refresh_claims = service.validate_token(&pair.refresh_token).unwrap();
        assert!(refresh_claims.permissions.is_empty());
    }

    #[test]
    fn tokens_from_a_different_secret_are_rejected() {
        let mk = |secret: &str| {
            AuthService::new(
                AuthConfig::new(
                    secret.to_string(),
                    "stockroom-api".to_string(),
                    "stockroom-auth".to_string(),
                    Duration::from_secs(900),
                    Duration::from_secs(86_400),
                ),
                Arc::new(sea_orm::DatabaseConnection::Disconnected),
                None,
            )
        };

        let issuing = mk("kTqHbWjc4R9sYfLp2XzNvAeG7mQdU3CiK6oPnB8tJxZwSyV5rE1uDhMgF0aOlI4N");
        let other = mk("A0bC1dE2fG3hI4jK5lM6nO7pQ8rS9tU0vW1xY2zA3bC4dE5fG6hI7jK8lM9nO0p");

        let account = user::Model {
            id: Uuid::new_v4(),
            username: "viewer1".to_string(),
            email: "viewer1@example.com".to_string(),
            password_hash: String::new(),
            role: "viewer".to_string(),
            active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        let pair = issuing.generate_token(&account).unwrap();
        assert!(matches!(
            other.validate_token(&pair.access_token),
            Err(AuthError::InvalidToken)
        ));
    }
}
