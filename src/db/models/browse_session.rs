//! Browsing sessions and their lifecycle columns.

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Completed,
    Terminated,
    Deleted,
}

impl SessionStatus {
    /// Terminal states never change again
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Active)
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Completed => write!(f, "completed"),
            Self::Terminated => write!(f, "terminated"),
            Self::Deleted => write!(f, "deleted"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum ThreatLevel {
    Safe,
    Warning,
    Danger,
}

impl ThreatLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Safe => "safe",
            Self::Warning => "warning",
            Self::Danger => "danger",
        }
    }
}

/// Explanation attached to a non-safe verdict
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreatDetails {
    #[serde(rename = "type")]
    pub threat_type: String,
    pub description: String,
    /// Integer percentage, e.g. "92%"
    pub confidence: String,
}

#[derive(Debug, Clone, FromRow)]
pub struct BrowseSession {
    pub id: String,
    pub user_id: String,
    pub url: String,
    pub vpn_ip: Option<String>,
    pub vpn_location: Option<String>,
    pub vpn_country: Option<String>,
    pub vpn_latitude: Option<String>,
    pub vpn_longitude: Option<String>,
    pub threat_level: ThreatLevel,
    /// JSON-encoded [`ThreatDetails`]
    pub threat_details: Option<String>,
    pub status: SessionStatus,
    pub auto_delete_at: Option<String>,
    pub started_at: String,
    pub ended_at: Option<String>,
    pub deleted_at: Option<String>,
}

impl BrowseSession {
    pub fn threat_details(&self) -> Option<ThreatDetails> {
        self.threat_details
            .as_deref()
            .and_then(|raw| serde_json::from_str(raw).ok())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrowseSessionResponse {
    pub id: String,
    pub url: String,
    pub vpn_ip: Option<String>,
    pub vpn_location: Option<String>,
    pub vpn_country: Option<String>,
    pub vpn_latitude: Option<String>,
    pub vpn_longitude: Option<String>,
    pub threat_level: ThreatLevel,
    pub threat_details: Option<ThreatDetails>,
    pub status: SessionStatus,
    pub auto_delete_at: Option<String>,
    pub started_at: String,
    pub ended_at: Option<String>,
    pub deleted_at: Option<String>,
}

impl From<BrowseSession> for BrowseSessionResponse {
    fn from(session: BrowseSession) -> Self {
        let threat_details = session.threat_details();
        Self {
            id: session.id,
            url: session.url,
            vpn_ip: session.vpn_ip,
            vpn_location: session.vpn_location,
            vpn_country: session.vpn_country,
            vpn_latitude: session.vpn_latitude,
            vpn_longitude: session.vpn_longitude,
            threat_level: session.threat_level,
            threat_details,
            status: session.status,
            auto_delete_at: session.auto_delete_at,
            started_at: session.started_at,
            ended_at: session.ended_at,
            deleted_at: session.deleted_at,
        }
    }
}

/// Per-user session counts for the analytics view
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionCounts {
    pub total: i64,
    pub active: i64,
    pub safe: i64,
    pub dangerous: i64,
}

pub async fn insert_browse_session(
    pool: &SqlitePool,
    session: &BrowseSession,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO browse_sessions (id, user_id, url, vpn_ip, vpn_location, vpn_country,
                                     vpn_latitude, vpn_longitude, threat_level, threat_details,
                                     status, auto_delete_at, started_at, ended_at, deleted_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&session.id)
    .bind(&session.user_id)
    .bind(&session.url)
    .bind(&session.vpn_ip)
    .bind(&session.vpn_location)
    .bind(&session.vpn_country)
    .bind(&session.vpn_latitude)
    .bind(&session.vpn_longitude)
    .bind(session.threat_level)
    .bind(&session.threat_details)
    .bind(session.status)
    .bind(&session.auto_delete_at)
    .bind(&session.started_at)
    .bind(&session.ended_at)
    .bind(&session.deleted_at)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn find_browse_session(
    pool: &SqlitePool,
    id: &str,
) -> Result<Option<BrowseSession>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM browse_sessions WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await
}

/// All sessions owned by the user, newest first
pub async fn list_browse_sessions(
    pool: &SqlitePool,
    user_id: &str,
) -> Result<Vec<BrowseSession>, sqlx::Error> {
    sqlx::query_as(
        "SELECT * FROM browse_sessions WHERE user_id = ? ORDER BY started_at DESC, rowid DESC",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await
}

/// Move an active session to a terminal status.
///
/// Only a row that is still `active` is updated, so of two racing callers
/// exactly one sees `1` here. `deleted_at` is stamped for `deleted` and
/// `terminated`, `ended_at` for every target.
pub async fn close_browse_session(
    pool: &SqlitePool,
    id: &str,
    to: SessionStatus,
    now: &str,
) -> Result<u64, sqlx::Error> {
    let deleted_at = match to {
        SessionStatus::Deleted | SessionStatus::Terminated => Some(now),
        _ => None,
    };
    let result = sqlx::query(
        r#"
        UPDATE browse_sessions
        SET status = ?, ended_at = ?, deleted_at = COALESCE(?, deleted_at)
        WHERE id = ? AND status = 'active'
        "#,
    )
    .bind(to)
    .bind(now)
    .bind(deleted_at)
    .bind(id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

/// Terminate every active session whose auto-delete deadline is at or before `now`
pub async fn terminate_expired_sessions(pool: &SqlitePool, now: &str) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE browse_sessions
        SET status = 'terminated', ended_at = ?, deleted_at = ?
        WHERE status = 'active' AND auto_delete_at IS NOT NULL AND auto_delete_at <= ?
        "#,
    )
    .bind(now)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

pub async fn count_browse_sessions(
    pool: &SqlitePool,
    user_id: &str,
) -> Result<SessionCounts, sqlx::Error> {
    // SUM over zero rows is NULL
    let (total, active, safe, dangerous): (i64, Option<i64>, Option<i64>, Option<i64>) =
        sqlx::query_as(
            r#"
            SELECT COUNT(*),
                   SUM(CASE WHEN status = 'active' THEN 1 ELSE 0 END),
                   SUM(CASE WHEN threat_level = 'safe' THEN 1 ELSE 0 END),
                   SUM(CASE WHEN threat_level IN ('danger', 'warning') THEN 1 ELSE 0 END)
            FROM browse_sessions
            WHERE user_id = ?
            "#,
        )
        .bind(user_id)
        .fetch_one(pool)
        .await?;

    Ok(SessionCounts {
        total,
        active: active.unwrap_or(0),
        safe: safe.unwrap_or(0),
        dangerous: dangerous.unwrap_or(0),
    })
}

#[cfg(test)]
pub(crate) fn test_session(user_id: &str, started_at: &str) -> BrowseSession {
    BrowseSession {
        id: uuid::Uuid::new_v4().to_string(),
        user_id: user_id.to_string(),
        url: "https://example.com/".to_string(),
        vpn_ip: None,
        vpn_location: None,
        vpn_country: None,
        vpn_latitude: None,
        vpn_longitude: None,
        threat_level: ThreatLevel::Safe,
        threat_details: None,
        status: SessionStatus::Active,
        auto_delete_at: None,
        started_at: started_at.to_string(),
        ended_at: None,
        deleted_at: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_test_user, memory_store, SubscriptionTier};

    #[test]
    fn test_only_active_is_not_terminal() {
        assert!(!SessionStatus::Active.is_terminal());
        assert!(SessionStatus::Completed.is_terminal());
        assert!(SessionStatus::Terminated.is_terminal());
        assert!(SessionStatus::Deleted.is_terminal());
    }

    #[test]
    fn test_threat_details_wire_shape() {
        let details = ThreatDetails {
            threat_type: "URL Shortener".to_string(),
            description: "Shortened links can hide their destination".to_string(),
            confidence: "55%".to_string(),
        };
        let json = serde_json::to_value(&details).unwrap();
        assert_eq!(json["type"], "URL Shortener");
        assert_eq!(json["confidence"], "55%");
    }

    #[tokio::test]
    async fn test_list_is_newest_first_and_scoped() {
        let store = memory_store().await;
        let pool = store.pool().unwrap();
        let alice = create_test_user(pool, "alice@example.com", SubscriptionTier::Free).await;
        let bob = create_test_user(pool, "bob@example.com", SubscriptionTier::Free).await;

        let older = test_session(&alice.id, "2026-01-01T10:00:00.000Z");
        let newer = test_session(&alice.id, "2026-01-01T11:00:00.000Z");
        let other = test_session(&bob.id, "2026-01-01T12:00:00.000Z");
        for s in [&older, &newer, &other] {
            insert_browse_session(pool, s).await.unwrap();
        }

        let listed = list_browse_sessions(pool, &alice.id).await.unwrap();
        let ids: Vec<_> = listed.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec![newer.id.as_str(), older.id.as_str()]);
    }

    #[tokio::test]
    async fn test_close_only_transitions_active_rows() {
        let store = memory_store().await;
        let pool = store.pool().unwrap();
        let user = create_test_user(pool, "carl@example.com", SubscriptionTier::Free).await;
        let session = test_session(&user.id, "2026-01-01T10:00:00.000Z");
        insert_browse_session(pool, &session).await.unwrap();

        let now = "2026-01-01T10:05:00.000Z";
        assert_eq!(
            close_browse_session(pool, &session.id, SessionStatus::Deleted, now).await.unwrap(),
            1
        );
        assert_eq!(
            close_browse_session(pool, &session.id, SessionStatus::Completed, now).await.unwrap(),
            0
        );

        let reloaded = find_browse_session(pool, &session.id).await.unwrap().unwrap();
        assert_eq!(reloaded.status, SessionStatus::Deleted);
        assert_eq!(reloaded.deleted_at.as_deref(), Some(now));
        assert_eq!(reloaded.ended_at.as_deref(), Some(now));
    }

    #[tokio::test]
    async fn test_completed_sessions_have_no_deleted_at() {
        let store = memory_store().await;
        let pool = store.pool().unwrap();
        let user = create_test_user(pool, "dina@example.com", SubscriptionTier::Free).await;
        let session = test_session(&user.id, "2026-01-01T10:00:00.000Z");
        insert_browse_session(pool, &session).await.unwrap();

        close_browse_session(pool, &session.id, SessionStatus::Completed, "2026-01-01T10:01:00.000Z")
            .await
            .unwrap();
        let reloaded = find_browse_session(pool, &session.id).await.unwrap().unwrap();
        assert_eq!(reloaded.status, SessionStatus::Completed);
        assert!(reloaded.deleted_at.is_none());
    }

    #[tokio::test]
    async fn test_terminate_expired_respects_deadline() {
        let store = memory_store().await;
        let pool = store.pool().unwrap();
        let user = create_test_user(pool, "ed@example.com", SubscriptionTier::Free).await;

        let mut expired = test_session(&user.id, "2026-01-01T10:00:00.000Z");
        expired.auto_delete_at = Some("2026-01-01T10:30:00.000Z".to_string());
        let mut pending = test_session(&user.id, "2026-01-01T10:00:00.000Z");
        pending.auto_delete_at = Some("2026-01-01T12:00:00.000Z".to_string());
        let forever = test_session(&user.id, "2026-01-01T10:00:00.000Z");
        for s in [&expired, &pending, &forever] {
            insert_browse_session(pool, s).await.unwrap();
        }

        let terminated = terminate_expired_sessions(pool, "2026-01-01T11:00:00.000Z")
            .await
            .unwrap();
        assert_eq!(terminated, 1);

        let reloaded = find_browse_session(pool, &expired.id).await.unwrap().unwrap();
        assert_eq!(reloaded.status, SessionStatus::Terminated);
        let untouched = find_browse_session(pool, &pending.id).await.unwrap().unwrap();
        assert_eq!(untouched.status, SessionStatus::Active);
    }

    #[tokio::test]
    async fn test_counts_with_and_without_rows() {
        let store = memory_store().await;
        let pool = store.pool().unwrap();
        let user = create_test_user(pool, "flo@example.com", SubscriptionTier::Free).await;

        assert_eq!(count_browse_sessions(pool, &user.id).await.unwrap(), SessionCounts::default());

        let safe = test_session(&user.id, "2026-01-01T10:00:00.000Z");
        let mut danger = test_session(&user.id, "2026-01-01T10:01:00.000Z");
        danger.threat_level = ThreatLevel::Danger;
        danger.status = SessionStatus::Deleted;
        let mut warning = test_session(&user.id, "2026-01-01T10:02:00.000Z");
        warning.threat_level = ThreatLevel::Warning;
        for s in [&safe, &danger, &warning] {
            insert_browse_session(pool, s).await.unwrap();
        }

        let counts = count_browse_sessions(pool, &user.id).await.unwrap();
        assert_eq!(
            counts,
            SessionCounts {
                total: 3,
                active: 2,
                safe: 1,
                dangerous: 2,
            }
        );
    }
}
