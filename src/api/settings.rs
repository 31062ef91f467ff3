use axum::{extract::State, Json};
use std::sync::Arc;

use super::error::{ApiError, ValidationErrorBuilder};
use super::rpc::{RpcJson, Success};
use super::validation::{validate_country, validate_delete_after_minutes};
use crate::db::{get_or_create_settings, upsert_settings, SettingsPatch, User, UserSettings};
use crate::AppState;

/// settings.get - stored settings, creating the default row on first read.
///
/// Without storage the defaults are served but not saved.
pub async fn get_settings(
    State(state): State<Arc<AppState>>,
    user: User,
) -> Result<Json<UserSettings>, ApiError> {
    let Ok(pool) = state.store.pool() else {
        tracing::warn!(procedure = "settings.get", "Storage unavailable, serving defaults");
        return Ok(Json(UserSettings::defaults(&user.id)));
    };

    let settings = get_or_create_settings(pool, &user.id).await?;
    Ok(Json(settings))
}

/// settings.update - apply a partial update
pub async fn update_settings(
    State(state): State<Arc<AppState>>,
    user: User,
    RpcJson(patch): RpcJson<SettingsPatch>,
) -> Result<Json<Success>, ApiError> {
    let mut errors = ValidationErrorBuilder::new();
    if let Some(minutes) = patch.delete_after_minutes {
        errors.check("deleteAfterMinutes", validate_delete_after_minutes(minutes));
    }
    if let Some(country) = &patch.preferred_vpn_country {
        errors.check("preferredVpnCountry", validate_country(country));
    }
    errors.finish()?;

    let pool = state.store.pool()?;
    let mut settings = get_or_create_settings(pool, &user.id).await?;
    patch.apply(&mut settings);
    upsert_settings(pool, &settings).await?;

    tracing::info!(user_id = %user.id, "Settings updated");
    Ok(Success::ok())
}
