//! User accounts and login tokens.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};

use crate::db::{now_timestamp, parse_timestamp};

/// Id of the synthetic account behind the configured admin token
pub const SYSTEM_USER_ID: &str = "system";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum UserRole {
    User,
    Admin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum SubscriptionTier {
    Free,
    Pro,
}

impl std::fmt::Display for SubscriptionTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Free => write!(f, "free"),
            Self::Pro => write!(f, "pro"),
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: String,
    pub email: String,
    pub name: String,
    pub password_hash: String,
    pub login_method: String,
    pub role: UserRole,
    pub subscription_tier: SubscriptionTier,
    pub subscription_expiry: Option<String>,
    pub created_at: String,
    pub last_signed_in: String,
}

impl User {
    /// Tier that gates features right now. A pro subscription whose expiry
    /// has passed counts as free; pro without an expiry never lapses.
    pub fn effective_tier(&self, now: DateTime<Utc>) -> SubscriptionTier {
        match self.subscription_tier {
            SubscriptionTier::Free => SubscriptionTier::Free,
            SubscriptionTier::Pro => match self.subscription_expiry.as_deref().and_then(parse_timestamp) {
                Some(expiry) if expiry <= now => SubscriptionTier::Free,
                _ => SubscriptionTier::Pro,
            },
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }

    /// The in-memory account used for admin-token requests
    pub fn system() -> Self {
        let now = now_timestamp();
        Self {
            id: SYSTEM_USER_ID.to_string(),
            email: "system@shieldd.local".to_string(),
            name: "System Admin".to_string(),
            password_hash: String::new(),
            login_method: "token".to_string(),
            role: UserRole::Admin,
            subscription_tier: SubscriptionTier::Pro,
            subscription_expiry: None,
            created_at: now.clone(),
            last_signed_in: now,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub id: String,
    pub email: String,
    pub name: String,
    pub role: UserRole,
    pub subscription_tier: SubscriptionTier,
    pub subscription_expiry: Option<String>,
    pub created_at: String,
    pub last_signed_in: String,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            name: user.name,
            role: user.role,
            subscription_tier: user.subscription_tier,
            subscription_expiry: user.subscription_expiry,
            created_at: user.created_at,
            last_signed_in: user.last_signed_in,
        }
    }
}

/// Login token row; only the SHA-256 of the token is stored
#[derive(Debug, Clone, FromRow)]
pub struct AuthSession {
    pub id: String,
    pub user_id: String,
    pub token_hash: String,
    pub expires_at: String,
    pub created_at: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: UserResponse,
}

pub async fn find_user_by_id(pool: &SqlitePool, id: &str) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM users WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub async fn find_user_by_email(
    pool: &SqlitePool,
    email: &str,
) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM users WHERE email = ?")
        .bind(email)
        .fetch_optional(pool)
        .await
}

pub async fn insert_user(pool: &SqlitePool, user: &User) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO users (id, email, name, password_hash, login_method, role,
                           subscription_tier, subscription_expiry, created_at, last_signed_in)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&user.id)
    .bind(&user.email)
    .bind(&user.name)
    .bind(&user.password_hash)
    .bind(&user.login_method)
    .bind(user.role)
    .bind(user.subscription_tier)
    .bind(&user.subscription_expiry)
    .bind(&user.created_at)
    .bind(&user.last_signed_in)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn touch_last_signed_in(pool: &SqlitePool, user_id: &str) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE users SET last_signed_in = ? WHERE id = ?")
        .bind(now_timestamp())
        .bind(user_id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn update_user_subscription(
    pool: &SqlitePool,
    user_id: &str,
    tier: SubscriptionTier,
    expiry: Option<&str>,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE users SET subscription_tier = ?, subscription_expiry = ? WHERE id = ?",
    )
    .bind(tier)
    .bind(expiry)
    .bind(user_id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

/// Make sure the admin-token account has a row so its sessions and
/// payments satisfy foreign keys.
pub async fn ensure_system_user(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    let system = User::system();
    sqlx::query(
        r#"
        INSERT OR IGNORE INTO users (id, email, name, password_hash, login_method, role,
                                     subscription_tier, subscription_expiry, created_at, last_signed_in)
        VALUES (?, ?, ?, '', ?, ?, ?, NULL, ?, ?)
        "#,
    )
    .bind(&system.id)
    .bind(&system.email)
    .bind(&system.name)
    .bind(&system.login_method)
    .bind(system.role)
    .bind(system.subscription_tier)
    .bind(&system.created_at)
    .bind(&system.last_signed_in)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn insert_auth_session(
    pool: &SqlitePool,
    user_id: &str,
    token_hash: &str,
    expires_at: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO auth_sessions (id, user_id, token_hash, expires_at, created_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(uuid::Uuid::new_v4().to_string())
    .bind(user_id)
    .bind(token_hash)
    .bind(expires_at)
    .bind(now_timestamp())
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn find_valid_auth_session(
    pool: &SqlitePool,
    token_hash: &str,
) -> Result<Option<AuthSession>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM auth_sessions WHERE token_hash = ? AND expires_at > ?")
        .bind(token_hash)
        .bind(now_timestamp())
        .fetch_optional(pool)
        .await
}

pub async fn delete_auth_session(pool: &SqlitePool, token_hash: &str) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM auth_sessions WHERE token_hash = ?")
        .bind(token_hash)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

#[cfg(test)]
pub(crate) async fn create_test_user(
    pool: &SqlitePool,
    email: &str,
    tier: SubscriptionTier,
) -> User {
    let now = now_timestamp();
    let user = User {
        id: uuid::Uuid::new_v4().to_string(),
        email: email.to_string(),
        name: email.split('@').next().unwrap_or_default().to_string(),
        password_hash: String::new(),
        login_method: "password".to_string(),
        role: UserRole::User,
        subscription_tier: tier,
        subscription_expiry: None,
        created_at: now.clone(),
        last_signed_in: now,
    };
    insert_user(pool, &user).await.unwrap();
    user
}
