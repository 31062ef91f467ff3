//! Per-user browsing preferences.

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};

use crate::db::now_timestamp;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum ThreatSensitivity {
    Low,
    Medium,
    High,
}

impl Default for ThreatSensitivity {
    fn default() -> Self {
        Self::Medium
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct UserSettings {
    pub id: String,
    pub user_id: String,
    pub auto_delete_sessions: bool,
    pub delete_after_minutes: i64,
    pub block_trackers: bool,
    pub block_ads: bool,
    pub block_malware: bool,
    pub enable_ai_assistant: bool,
    pub preferred_vpn_country: Option<String>,
    pub threat_sensitivity: ThreatSensitivity,
    pub created_at: String,
    pub updated_at: String,
}

impl UserSettings {
    pub const DEFAULT_DELETE_AFTER_MINUTES: i64 = 30;

    /// Settings a user gets before saving anything
    pub fn defaults(user_id: &str) -> Self {
        let now = now_timestamp();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            auto_delete_sessions: true,
            delete_after_minutes: Self::DEFAULT_DELETE_AFTER_MINUTES,
            block_trackers: true,
            block_ads: true,
            block_malware: true,
            enable_ai_assistant: true,
            preferred_vpn_country: None,
            threat_sensitivity: ThreatSensitivity::default(),
            created_at: now.clone(),
            updated_at: now,
        }
    }

    /// Auto-delete window, when enabled
    pub fn auto_delete_after(&self) -> Option<chrono::Duration> {
        self.auto_delete_sessions
            .then(|| chrono::Duration::minutes(self.delete_after_minutes))
    }
}

/// Partial update for `settings.update`; absent fields keep their value
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SettingsPatch {
    pub auto_delete_sessions: Option<bool>,
    pub delete_after_minutes: Option<i64>,
    pub block_trackers: Option<bool>,
    pub block_ads: Option<bool>,
    pub block_malware: Option<bool>,
    pub enable_ai_assistant: Option<bool>,
    pub preferred_vpn_country: Option<String>,
    pub threat_sensitivity: Option<ThreatSensitivity>,
}

impl SettingsPatch {
    pub fn apply(self, settings: &mut UserSettings) {
        if let Some(v) = self.auto_delete_sessions {
            settings.auto_delete_sessions = v;
        }
        if let Some(v) = self.delete_after_minutes {
            settings.delete_after_minutes = v;
        }
        if let Some(v) = self.block_trackers {
            settings.block_trackers = v;
        }
        if let Some(v) = self.block_ads {
            settings.block_ads = v;
        }
        if let Some(v) = self.block_malware {
            settings.block_malware = v;
        }
        if let Some(v) = self.enable_ai_assistant {
            settings.enable_ai_assistant = v;
        }
        if let Some(v) = self.preferred_vpn_country {
            // Empty string clears the preference
            settings.preferred_vpn_country = Some(v).filter(|c| !c.trim().is_empty());
        }
        if let Some(v) = self.threat_sensitivity {
            settings.threat_sensitivity = v;
        }
        settings.updated_at = now_timestamp();
    }
}

pub async fn find_settings(
    pool: &SqlitePool,
    user_id: &str,
) -> Result<Option<UserSettings>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM user_settings WHERE user_id = ?")
        .bind(user_id)
        .fetch_optional(pool)
        .await
}

pub async fn upsert_settings(pool: &SqlitePool, settings: &UserSettings) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO user_settings (id, user_id, auto_delete_sessions, delete_after_minutes,
                                   block_trackers, block_ads, block_malware, enable_ai_assistant,
                                   preferred_vpn_country, threat_sensitivity, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(user_id) DO UPDATE SET
            auto_delete_sessions = excluded.auto_delete_sessions,
            delete_after_minutes = excluded.delete_after_minutes,
            block_trackers = excluded.block_trackers,
            block_ads = excluded.block_ads,
            block_malware = excluded.block_malware,
            enable_ai_assistant = excluded.enable_ai_assistant,
            preferred_vpn_country = excluded.preferred_vpn_country,
            threat_sensitivity = excluded.threat_sensitivity,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(&settings.id)
    .bind(&settings.user_id)
    .bind(settings.auto_delete_sessions)
    .bind(settings.delete_after_minutes)
    .bind(settings.block_trackers)
    .bind(settings.block_ads)
    .bind(settings.block_malware)
    .bind(settings.enable_ai_assistant)
    .bind(&settings.preferred_vpn_country)
    .bind(settings.threat_sensitivity)
    .bind(&settings.created_at)
    .bind(&settings.updated_at)
    .execute(pool)
    .await?;
    Ok(())
}

/// Stored settings, creating and persisting the defaults on first access
pub async fn get_or_create_settings(
    pool: &SqlitePool,
    user_id: &str,
) -> Result<UserSettings, sqlx::Error> {
    if let Some(settings) = find_settings(pool, user_id).await? {
        return Ok(settings);
    }

    let defaults = UserSettings::defaults(user_id);
    upsert_settings(pool, &defaults).await?;

    // Re-read so a concurrent first access returns the row that won
    Ok(find_settings(pool, user_id).await?.unwrap_or(defaults))
}
