use axum::{extract::State, Json};
use serde::Deserialize;
use std::sync::Arc;

use super::error::ApiError;
use super::rpc::{degrade, RpcJson};
use super::validation::validate_id;
use crate::db::{User, VpnLocationResponse};
use crate::engine::Assignment;
use crate::AppState;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectRequest {
    #[serde(default)]
    pub location_id: Option<String>,
}

/// vpn.locations - locations visible to the caller's tier
pub async fn list_locations(
    State(state): State<Arc<AppState>>,
    user: User,
) -> Result<Json<Vec<VpnLocationResponse>>, ApiError> {
    let locations = degrade("vpn.locations", state.selector.locations(&user).await, Vec::new)?;
    Ok(Json(locations.into_iter().map(VpnLocationResponse::from).collect()))
}

/// vpn.connect - assign an egress identity
pub async fn connect(
    State(state): State<Arc<AppState>>,
    user: User,
    RpcJson(request): RpcJson<ConnectRequest>,
) -> Result<Json<Assignment>, ApiError> {
    let location_id = request.location_id.filter(|id| !id.is_empty());
    if let Some(id) = &location_id {
        validate_id("locationId", id).map_err(|e| ApiError::validation_field("locationId", e))?;
    }

    let assignment = state.selector.connect(&user, location_id.as_deref()).await?;
    Ok(Json(assignment))
}
