use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use axum::{
    async_trait,
    extract::{FromRequestParts, State},
    http::{header::AUTHORIZATION, request::Parts, HeaderMap},
    Json,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::{Duration, Utc};
use rand::Rng;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use subtle::ConstantTimeEq;

use super::error::{ApiError, ValidationErrorBuilder};
use super::rpc::{RpcJson, Success};
use super::validation::{validate_email, validate_name};
use crate::config::AuthConfig;
use crate::db::{
    delete_auth_session, find_user_by_email, find_user_by_id, find_valid_auth_session,
    format_timestamp, insert_auth_session, insert_user, now_timestamp, touch_last_signed_in,
    DbPool, LoginRequest, LoginResponse, SubscriptionTier, User, UserResponse, UserRole,
};
use crate::engine::{EngineError, EngineResult};
use crate::AppState;

/// Hash a password using Argon2
pub fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let hash = argon2.hash_password(password.as_bytes(), &salt)?;
    Ok(hash.to_string())
}

/// Verify a password against a hash
pub fn verify_password(password: &str, hash: &str) -> bool {
    let parsed_hash = match PasswordHash::new(hash) {
        Ok(h) => h,
        Err(_) => return false,
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok()
}

/// Generate a random token
fn generate_token() -> String {
    let mut rng = rand::rng();
    let bytes: [u8; 32] = rng.random();
    hex::encode(bytes)
}

/// Hash a token for storage
fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

/// Validate password strength
/// Returns None if valid, or Some(error_message) if invalid
fn validate_password_strength(password: &str) -> Option<String> {
    if password.chars().count() < 10 {
        return Some("Password must be at least 10 characters".to_string());
    }
    if password.len() > 256 {
        return Some("Password is too long (max 256 characters)".to_string());
    }

    let has_letter = password.chars().any(|c| c.is_alphabetic());
    let has_digit = password.chars().any(|c| c.is_ascii_digit());
    if !has_letter || !has_digit {
        return Some("Password must contain both letters and digits".to_string());
    }

    let common_passwords = [
        "password1", "qwerty123", "letmein1", "welcome1", "iloveyou1", "123456789a",
    ];
    let lower = password.to_lowercase();
    if common_passwords.iter().any(|common| lower.contains(common)) {
        return Some("Password is too common. Please choose a stronger password.".to_string());
    }

    None
}

/// Constant-time comparison against the configured admin token
fn is_admin_token(config: &AuthConfig, token: &str) -> bool {
    let admin_token = config.admin_token.as_bytes();
    let provided_token = token.as_bytes();
    admin_token.len() == provided_token.len() && admin_token.ct_eq(provided_token).into()
}

/// Extract the token from the Authorization header, the X-API-Key header
/// or the session cookie, in that order
fn extract_token(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    if let Some(auth_header) = headers.get(AUTHORIZATION).and_then(|h| h.to_str().ok()) {
        if let Some(token) = auth_header.strip_prefix("Bearer ") {
            return Some(token.trim().to_string()).filter(|t| !t.is_empty());
        }
    }

    if let Some(api_key) = headers.get("X-API-Key").and_then(|h| h.to_str().ok()) {
        return Some(api_key.trim().to_string()).filter(|t| !t.is_empty());
    }

    CookieJar::from_headers(headers)
        .get(cookie_name)
        .map(|c| c.value().to_string())
        .filter(|t| !t.is_empty())
}

/// Resolve a token to its user. `Ok(None)` means unknown or expired.
async fn current_user(state: &AppState, token: &str) -> EngineResult<Option<User>> {
    if is_admin_token(&state.config.auth, token) {
        return Ok(Some(User::system()));
    }

    let pool = state.store.pool()?;
    let Some(session) = find_valid_auth_session(pool, &hash_token(token)).await? else {
        return Ok(None);
    };
    Ok(find_user_by_id(pool, &session.user_id).await?)
}

fn session_cookie(config: &AuthConfig, token: String) -> Cookie<'static> {
    Cookie::build((config.cookie_name.clone(), token))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(config.cookie_secure)
        .build()
}

/// auth.login - verifies an existing account or creates one on first login
pub async fn login(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    RpcJson(request): RpcJson<LoginRequest>,
) -> Result<(CookieJar, Json<LoginResponse>), ApiError> {
    let email = request.email.trim().to_lowercase();

    let mut errors = ValidationErrorBuilder::new();
    errors.check("email", validate_email(&email));
    if request.password.is_empty() {
        errors.add("password", "Password is required");
    }
    if let Some(name) = &request.name {
        errors.check("name", validate_name(name));
    }
    errors.finish()?;

    let pool = state.store.pool()?;
    let mut user = match find_user_by_email(pool, &email).await? {
        Some(user) => {
            if !verify_password(&request.password, &user.password_hash) {
                tracing::warn!(email = %email, "Failed login attempt");
                return Err(ApiError::unauthorized("Invalid credentials"));
            }
            user
        }
        None => register(&state.config.auth, pool, &email, &request).await?,
    };

    touch_last_signed_in(pool, &user.id).await?;
    user.last_signed_in = now_timestamp();

    let token = generate_token();
    let expires_at = Utc::now() + Duration::hours(state.config.auth.token_ttl_hours.max(1));
    insert_auth_session(pool, &user.id, &hash_token(&token), &format_timestamp(expires_at))
        .await?;

    tracing::info!(user_id = %user.id, "User logged in");

    let jar = jar.add(session_cookie(&state.config.auth, token.clone()));
    Ok((
        jar,
        Json(LoginResponse {
            token,
            user: UserResponse::from(user),
        }),
    ))
}

async fn register(
    config: &AuthConfig,
    pool: &DbPool,
    email: &str,
    request: &LoginRequest,
) -> Result<User, ApiError> {
    if let Some(error) = validate_password_strength(&request.password) {
        return Err(ApiError::validation_field("password", error));
    }
    let password_hash = hash_password(&request.password)
        .map_err(|e| ApiError::internal(format!("Failed to hash password: {}", e)))?;

    let is_owner = config
        .owner_email
        .as_deref()
        .is_some_and(|owner| owner.trim().eq_ignore_ascii_case(email));
    let name = request
        .name
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| email.split('@').next().unwrap_or(email))
        .to_string();

    let now = now_timestamp();
    let user = User {
        id: uuid::Uuid::new_v4().to_string(),
        email: email.to_string(),
        name,
        password_hash,
        login_method: "password".to_string(),
        role: if is_owner { UserRole::Admin } else { UserRole::User },
        subscription_tier: SubscriptionTier::Free,
        subscription_expiry: None,
        created_at: now.clone(),
        last_signed_in: now,
    };
    insert_user(pool, &user).await?;

    tracing::info!(user_id = %user.id, role = ?user.role, "Created user on first login");
    Ok(user)
}

/// auth.me - the caller, or null when anonymous
pub async fn me(MaybeUser(user): MaybeUser) -> Json<Option<UserResponse>> {
    Json(user.map(UserResponse::from))
}

/// auth.logout - revokes the presented token and clears the cookie
pub async fn logout(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    jar: CookieJar,
) -> Result<(CookieJar, Json<Success>), ApiError> {
    let cookie_name = state.config.auth.cookie_name.clone();

    if let Some(token) = extract_token(&headers, &cookie_name) {
        if !is_admin_token(&state.config.auth, &token) {
            let pool = state.store.pool()?;
            let revoked = delete_auth_session(pool, &hash_token(&token)).await?;
            tracing::debug!(revoked = revoked, "Logout");
        }
    }

    // Always send the removal cookie, even when the request carried none
    let mut removal = Cookie::build((cookie_name, "")).path("/").build();
    removal.make_removal();
    Ok((jar.add(removal), Success::ok()))
}

/// Extractor for the authenticated caller; rejects with 401
#[async_trait]
impl FromRequestParts<Arc<AppState>> for User {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = extract_token(&parts.headers, &state.config.auth.cookie_name)
            .ok_or_else(|| ApiError::unauthorized("Authentication required"))?;
        current_user(state, &token)
            .await?
            .ok_or_else(|| ApiError::unauthorized("Invalid or expired token"))
    }
}

/// Extractor for procedures that also serve anonymous callers.
///
/// Without a database only the admin token can be resolved; other tokens
/// read as anonymous.
pub struct MaybeUser(pub Option<User>);

#[async_trait]
impl FromRequestParts<Arc<AppState>> for MaybeUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let Some(token) = extract_token(&parts.headers, &state.config.auth.cookie_name) else {
            return Ok(MaybeUser(None));
        };
        match current_user(state, &token).await {
            Ok(user) => Ok(MaybeUser(user)),
            Err(EngineError::Unavailable(_)) => {
                tracing::warn!("Storage unavailable, treating caller as anonymous");
                Ok(MaybeUser(None))
            }
            Err(e) => Err(e.into()),
        }
    }
}
