use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::error::{ApiError, ValidationErrorBuilder};
use super::rpc::{degrade, RpcJson, RpcQuery, SessionIdInput};
use super::validation::validate_id;
use crate::db::{ChatMessage, User};
use crate::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendRequest {
    pub session_id: String,
    pub message: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendResponse {
    pub user_message: String,
    pub ai_response: String,
    /// True when the assistant could not be reached
    pub fallback: bool,
}

/// chat.messages - transcript of one session, oldest first
pub async fn list_messages(
    State(state): State<Arc<AppState>>,
    user: User,
    RpcQuery(input): RpcQuery<SessionIdInput>,
) -> Result<Json<Vec<ChatMessage>>, ApiError> {
    validate_id("sessionId", &input.session_id)
        .map_err(|e| ApiError::validation_field("sessionId", e))?;

    let messages = degrade(
        "chat.messages",
        state.chat.messages(&user, &input.session_id).await,
        Vec::new,
    )?;
    Ok(Json(messages))
}

/// chat.send - store the message, ask the assistant, store the reply
pub async fn send_message(
    State(state): State<Arc<AppState>>,
    user: User,
    RpcJson(request): RpcJson<SendRequest>,
) -> Result<Json<SendResponse>, ApiError> {
    let mut errors = ValidationErrorBuilder::new();
    errors.check("sessionId", validate_id("sessionId", &request.session_id));
    if request.message.trim().is_empty() {
        errors.add("message", "Message cannot be empty");
    }
    errors.finish()?;

    let exchange = state
        .chat
        .send(&user, &request.session_id, &request.message)
        .await?;
    Ok(Json(SendResponse {
        user_message: exchange.user_message.content,
        ai_response: exchange.ai_response.content,
        fallback: exchange.fallback,
    }))
}
