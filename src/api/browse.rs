use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::error::ApiError;
use super::rpc::{degrade, RpcJson, SessionIdInput, Success};
use super::validation::validate_id;
use crate::db::{BrowseSessionResponse, ThreatDetails, ThreatLevel, User};
use crate::engine::{NukeOutcome, Verdict, VpnSnapshot};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ScanRequest {
    pub url: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanResponse {
    pub threat_level: ThreatLevel,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threat_details: Option<ThreatDetails>,
}

impl From<Verdict> for ScanResponse {
    fn from(verdict: Verdict) -> Self {
        Self {
            threat_level: verdict.level,
            threat_details: verdict.details(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct StartRequest {
    pub url: String,
    #[serde(default)]
    pub vpn: Option<VpnSnapshot>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartResponse {
    pub session_id: String,
    pub threat_level: ThreatLevel,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threat_details: Option<ThreatDetails>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_delete_at: Option<String>,
}

fn session_id(input: &SessionIdInput) -> Result<&str, ApiError> {
    validate_id("sessionId", &input.session_id)
        .map_err(|e| ApiError::validation_field("sessionId", e))?;
    Ok(&input.session_id)
}

/// browse.scan - verdict only, nothing is stored
pub async fn scan(
    State(state): State<Arc<AppState>>,
    _user: User,
    RpcJson(request): RpcJson<ScanRequest>,
) -> Result<Json<ScanResponse>, ApiError> {
    let verdict = state.sessions.scan(&request.url)?;
    Ok(Json(verdict.into()))
}

/// browse.start
pub async fn start(
    State(state): State<Arc<AppState>>,
    user: User,
    RpcJson(request): RpcJson<StartRequest>,
) -> Result<Json<StartResponse>, ApiError> {
    let started = state.sessions.start(&user, &request.url, request.vpn).await?;
    Ok(Json(StartResponse {
        session_id: started.session_id,
        threat_level: started.verdict.level,
        threat_details: started.verdict.details(),
        auto_delete_at: started.auto_delete_at,
    }))
}

/// browse.nuke - destroy a session; repeating it is a no-op
pub async fn nuke(
    State(state): State<Arc<AppState>>,
    user: User,
    RpcJson(input): RpcJson<SessionIdInput>,
) -> Result<Json<Success>, ApiError> {
    let outcome = state.sessions.nuke(&user, session_id(&input)?).await?;
    if outcome == NukeOutcome::AlreadyDeleted {
        tracing::debug!(session_id = %input.session_id, "Session was already nuked");
    }
    Ok(Success::ok())
}

/// browse.end - close a session normally
pub async fn end(
    State(state): State<Arc<AppState>>,
    user: User,
    RpcJson(input): RpcJson<SessionIdInput>,
) -> Result<Json<Success>, ApiError> {
    state.sessions.end(&user, session_id(&input)?).await?;
    Ok(Success::ok())
}

/// browse.sessions - the caller's sessions, newest first
pub async fn list_sessions(
    State(state): State<Arc<AppState>>,
    user: User,
) -> Result<Json<Vec<BrowseSessionResponse>>, ApiError> {
    let sessions = degrade("browse.sessions", state.sessions.list(&user).await, Vec::new)?;
    Ok(Json(sessions.into_iter().map(BrowseSessionResponse::from).collect()))
}
