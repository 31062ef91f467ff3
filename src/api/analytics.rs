use axum::{extract::State, Json};
use std::sync::Arc;

use super::error::ApiError;
use super::rpc::degrade;
use crate::db::User;
use crate::engine::SessionStats;
use crate::AppState;

/// analytics.stats - the caller's session and threat counters
pub async fn stats(
    State(state): State<Arc<AppState>>,
    user: User,
) -> Result<Json<SessionStats>, ApiError> {
    let stats = degrade("analytics.stats", state.analytics.stats(&user).await, SessionStats::default)?;
    Ok(Json(stats))
}
