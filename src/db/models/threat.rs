//! Append-only log of detected threats.

use serde::Serialize;
use sqlx::{FromRow, SqlitePool};

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Threat {
    pub id: String,
    pub session_id: String,
    pub threat_type: String,
    pub description: String,
    pub confidence: i64,
    pub blocked: bool,
    pub detected_at: String,
}

pub async fn insert_threat(pool: &SqlitePool, threat: &Threat) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO threats (id, session_id, threat_type, description, confidence, blocked, detected_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&threat.id)
    .bind(&threat.session_id)
    .bind(&threat.threat_type)
    .bind(&threat.description)
    .bind(threat.confidence)
    .bind(threat.blocked)
    .bind(&threat.detected_at)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn list_threats_for_session(
    pool: &SqlitePool,
    session_id: &str,
) -> Result<Vec<Threat>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM threats WHERE session_id = ? ORDER BY detected_at ASC")
        .bind(session_id)
        .fetch_all(pool)
        .await
}

/// Threats recorded against sessions owned by the user
pub async fn count_threats_for_user(pool: &SqlitePool, user_id: &str) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar(
        r#"
        SELECT COUNT(*) FROM threats t
        JOIN browse_sessions s ON s.id = t.session_id
        WHERE s.user_id = ?
        "#,
    )
    .bind(user_id)
    .fetch_one(pool)
    .await
}
