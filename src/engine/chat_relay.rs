//! Session-scoped assistant chat.
//!
//! The user's message is written before the completion call, so an
//! upstream failure never loses it. Failed or empty completions are
//! replaced by [`FALLBACK_REPLY`].

use std::sync::Arc;

use super::{EngineError, EngineResult, SessionOrchestrator};
use crate::api::metrics::record_chat_completion;
use crate::db::{
    find_settings, insert_chat_message, list_chat_messages, now_timestamp, recent_chat_messages,
    ChatMessage, ChatRole, SessionStatus, Store, User,
};
use crate::llm::{CompletionClient, CompletionMessage};

pub const FALLBACK_REPLY: &str = "I'm here to help you browse safely.";

/// Number of transcript messages sent with each prompt
pub const HISTORY_WINDOW: i64 = 10;

pub const MAX_MESSAGE_LENGTH: usize = 4000;

const SYSTEM_PROMPT: &str = "You are a cybersecurity AI assistant helping users browse safely. \
Provide concise, helpful advice about web security, privacy, and safe browsing practices. \
Current browsing URL: ";

#[derive(Debug, Clone)]
pub struct ChatExchange {
    pub user_message: ChatMessage,
    pub ai_response: ChatMessage,
    /// True when the reply is the fallback text
    pub fallback: bool,
}

pub struct ChatRelay {
    store: Store,
    sessions: SessionOrchestrator,
    client: Arc<dyn CompletionClient>,
}

impl ChatRelay {
    pub fn new(store: Store, client: Arc<dyn CompletionClient>) -> Self {
        Self {
            sessions: SessionOrchestrator::new(store.clone()),
            store,
            client,
        }
    }

    /// Transcript of a session the caller owns, oldest first
    pub async fn messages(&self, user: &User, session_id: &str) -> EngineResult<Vec<ChatMessage>> {
        self.sessions.owned_session(user, session_id).await?;
        let pool = self.store.pool()?;
        Ok(list_chat_messages(pool, session_id).await?)
    }

    pub async fn send(&self, user: &User, session_id: &str, message: &str) -> EngineResult<ChatExchange> {
        if message.trim().is_empty() {
            return Err(EngineError::Validation("Message is required".to_string()));
        }
        if message.chars().count() > MAX_MESSAGE_LENGTH {
            return Err(EngineError::Validation(format!(
                "Message is too long (max {} characters)",
                MAX_MESSAGE_LENGTH
            )));
        }

        let session = self.sessions.owned_session(user, session_id).await?;
        if session.status != SessionStatus::Active {
            return Err(EngineError::InvalidState(format!(
                "Cannot chat in a session that is {}",
                session.status
            )));
        }

        let pool = self.store.pool()?;
        if let Some(settings) = find_settings(pool, &user.id).await? {
            if !settings.enable_ai_assistant {
                return Err(EngineError::Unauthorized("AI assistant is disabled".to_string()));
            }
        }

        let user_message = ChatMessage {
            id: uuid::Uuid::new_v4().to_string(),
            session_id: session.id.clone(),
            user_id: user.id.clone(),
            role: ChatRole::User,
            content: message.to_string(),
            created_at: now_timestamp(),
        };
        insert_chat_message(pool, &user_message).await?;

        // History includes the message just written
        let history = recent_chat_messages(pool, &session.id, HISTORY_WINDOW).await?;
        let mut prompt = Vec::with_capacity(history.len() + 1);
        prompt.push(CompletionMessage::system(format!("{}{}", SYSTEM_PROMPT, session.url)));
        prompt.extend(history.iter().map(|m| {
            let role = match m.role {
                ChatRole::User => "user",
                ChatRole::Assistant => "assistant",
            };
            CompletionMessage::new(role, m.content.clone())
        }));

        let (reply, fallback) = match self.ask(&prompt).await {
            Ok(reply) => {
                record_chat_completion("ok");
                (reply, false)
            }
            Err(e) => {
                tracing::warn!(session_id = %session.id, error = %e, "Completion failed, using fallback reply");
                record_chat_completion("fallback");
                (FALLBACK_REPLY.to_string(), true)
            }
        };

        let ai_response = ChatMessage {
            id: uuid::Uuid::new_v4().to_string(),
            session_id: session.id.clone(),
            user_id: user.id.clone(),
            role: ChatRole::Assistant,
            content: reply,
            created_at: now_timestamp(),
        };
        insert_chat_message(pool, &ai_response).await?;

        Ok(ChatExchange {
            user_message,
            ai_response,
            fallback,
        })
    }

    async fn ask(&self, prompt: &[CompletionMessage]) -> EngineResult<String> {
        let reply = self
            .client
            .complete(prompt)
            .await
            .map_err(|e| EngineError::Upstream(e.to_string()))?;
        if reply.trim().is_empty() {
            return Err(EngineError::Upstream("empty completion".to_string()));
        }
        Ok(reply)
    }
}
