//! Assistant transcript, append-only.

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: String,
    pub session_id: String,
    pub user_id: String,
    pub role: ChatRole,
    pub content: String,
    pub created_at: String,
}

pub async fn insert_chat_message(pool: &SqlitePool, message: &ChatMessage) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO chat_messages (id, session_id, user_id, role, content, created_at) VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(&message.id)
    .bind(&message.session_id)
    .bind(&message.user_id)
    .bind(message.role)
    .bind(&message.content)
    .bind(&message.created_at)
    .execute(pool)
    .await?;
    Ok(())
}

/// Whole transcript, oldest first. Insertion order breaks timestamp ties.
pub async fn list_chat_messages(
    pool: &SqlitePool,
    session_id: &str,
) -> Result<Vec<ChatMessage>, sqlx::Error> {
    sqlx::query_as(
        "SELECT * FROM chat_messages WHERE session_id = ? ORDER BY created_at ASC, rowid ASC",
    )
    .bind(session_id)
    .fetch_all(pool)
    .await
}

/// The last `limit` messages, returned oldest first
pub async fn recent_chat_messages(
    pool: &SqlitePool,
    session_id: &str,
    limit: i64,
) -> Result<Vec<ChatMessage>, sqlx::Error> {
    let mut messages: Vec<ChatMessage> = sqlx::query_as(
        r#"
        SELECT * FROM chat_messages WHERE session_id = ?
        ORDER BY created_at DESC, rowid DESC
        LIMIT ?
        "#,
    )
    .bind(session_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;
    messages.reverse();
    Ok(messages)
}
