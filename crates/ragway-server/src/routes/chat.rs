//! Chat endpoint.
//!
//! `POST /api/v1/chat/send` answers with a `text/event-stream` of
//! `citations`, `text`*, then one `done` or `error` event.

use std::convert::Infallible;

use axum::{
    Extension, Json,
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
};
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};

use crate::auth::Identity;
use crate::error::ServerError;
use crate::merge::ResponseEvent;
use crate::state::AppState;

// ─────────────────────────────────────────────────────────────────────────────
// Request Types
// ─────────────────────────────────────────────────────────────────────────────

/// One message of the conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Author role (`user`, `assistant`).
    #[serde(default)]
    pub role: String,
    /// Message text.
    #[serde(default)]
    pub content: String,
}

/// Request body for the chat endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatRequest {
    /// Conversation so far; the last message is the query.
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
}

impl ChatRequest {
    /// The query: the last message's trimmed content.
    pub fn query(&self) -> Result<&str, ServerError> {
        let last = self
            .messages
            .last()
            .ok_or_else(|| ServerError::BadRequest("messages must not be empty".to_string()))?;
        let query = last.content.trim();
        if query.is_empty() {
            return Err(ServerError::BadRequest(
                "last message content must not be empty".to_string(),
            ));
        }
        Ok(query)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Handler
// ─────────────────────────────────────────────────────────────────────────────

fn to_sse(event: &ResponseEvent) -> Event {
    Event::default()
        .event(event.name())
        .json_data(event.data())
        .unwrap_or_else(|_| Event::default())
}

/// POST /api/v1/chat/send - Grounded streaming answer.
///
/// Failures before a stream opens are plain HTTP errors. After that, the
/// status is 200 and failures arrive as an `error` event.
pub async fn chat_send_handler(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(request): Json<ChatRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ServerError> {
    let query = request.query()?;

    tracing::debug!(
        messages = request.messages.len(),
        query_chars = query.len(),
        user = identity.user_id().is_some(),
        "Chat request"
    );

    let response = state.gateway.answer(query, &identity).await?;
    let events = response
        .into_events(state.shutdown.clone())
        .map(|event| Ok::<_, Infallible>(to_sse(&event)));

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}
