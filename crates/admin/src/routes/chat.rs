//! Merchant assistant.
//!
//! The page renders saved sessions; replies stream over SSE from
//! `POST /chat/stream` as `text`, `done` and `error` events.

use std::convert::Infallible;

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Json, Router,
    extract::{Path, State},
    response::{
        IntoResponse, Response, Sse,
        sse::{Event, KeepAlive},
    },
    routing::{get, post},
};
use futures::StreamExt;
use serde::Deserialize;
use storekeep_core::{ChatRole, ChatSessionId};
use tracing::instrument;

use super::{PageContext, format_datetime};
use crate::error::AppError;
use crate::filters;
use crate::middleware::ShopSession;
use crate::models::{ChatMessage, ChatSession};
use crate::services::{BillingContext, BillingService, ChatService, stream_reply, system_prompt};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/chat", get(index))
        .route("/chat/{session_id}", get(show))
        .route("/chat/stream", post(stream))
}

#[derive(Debug, Clone)]
pub struct SessionView {
    pub id: i32,
    pub title: String,
    pub updated_at: String,
    pub current: bool,
}

impl SessionView {
    fn new(session: &ChatSession, current: Option<ChatSessionId>) -> Self {
        Self {
            id: session.id.as_i32(),
            title: session.display_title().to_string(),
            updated_at: format_datetime(session.updated_at),
            current: current == Some(session.id),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MessageView {
    pub from_user: bool,
    pub content: String,
    pub created_at: String,
}

impl From<&ChatMessage> for MessageView {
    fn from(m: &ChatMessage) -> Self {
        Self {
            from_user: m.role == ChatRole::User,
            content: m.content.clone(),
            created_at: format_datetime(m.created_at),
        }
    }
}

/// Assistant page template.
#[derive(Template, WebTemplate)]
#[template(path = "chat/index.html")]
pub struct ChatTemplate {
    pub page: PageContext,
    pub enabled: bool,
    pub sessions: Vec<SessionView>,
    pub session_id: Option<i32>,
    pub messages: Vec<MessageView>,
}

async fn chat_page(
    state: &AppState,
    session: &ShopSession,
    current: Option<ChatSessionId>,
) -> Result<ChatTemplate, AppError> {
    let chat = ChatService::new(state.pool());
    let sessions = chat.list_sessions(session.shop.id).await?;
    let messages = match current {
        Some(id) => chat.transcript(session.shop.id, id).await?.1,
        None => Vec::new(),
    };

    Ok(ChatTemplate {
        page: PageContext::new(state, session, "/chat"),
        enabled: state.claude().is_some(),
        sessions: sessions
            .iter()
            .map(|s| SessionView::new(s, current))
            .collect(),
        session_id: current.map(|id| id.as_i32()),
        messages: messages.iter().map(MessageView::from).collect(),
    })
}

/// GET /chat - New conversation.
#[instrument(skip(session, state), fields(shop = %session.shop.domain))]
async fn index(session: ShopSession, State(state): State<AppState>) -> Result<ChatTemplate, AppError> {
    chat_page(&state, &session, None).await
}

/// GET /chat/{session_id} - A saved conversation.
#[instrument(skip(session, state), fields(shop = %session.shop.domain))]
async fn show(
    session: ShopSession,
    State(state): State<AppState>,
    Path(session_id): Path<i32>,
) -> Result<ChatTemplate, AppError> {
    chat_page(&state, &session, Some(ChatSessionId::new(session_id))).await
}

#[derive(Debug, Deserialize)]
pub struct StreamRequest {
    pub session_id: Option<i32>,
    pub message: String,
}

/// POST /chat/stream - Send a message and stream the reply.
#[instrument(skip(session, state, request), fields(shop = %session.shop.domain))]
async fn stream(
    session: ShopSession,
    State(state): State<AppState>,
    Json(request): Json<StreamRequest>,
) -> Result<Response, AppError> {
    let claude = state
        .claude()
        .cloned()
        .ok_or_else(|| AppError::Unavailable("The assistant is not configured".to_string()))?;

    let billing = BillingService::new(state.pool(), &session.client, state.config());
    let context = BillingContext {
        subscription: billing.current_subscription(&session.shop).await?,
        usage: billing.usage_summary(&session.shop).await?,
    };
    let system = system_prompt(&session.shop, &context);

    let turn = ChatService::new(state.pool())
        .prepare_turn(
            session.shop.id,
            request.session_id.map(ChatSessionId::new),
            &request.message,
        )
        .await?;

    let events = stream_reply(state.pool().clone(), claude, turn, system).map(|event| {
        Ok::<_, Infallible>(Event::default().event(event.name()).data(event.data()))
    });

    Ok(Sse::new(events)
        .keep_alive(KeepAlive::default())
        .into_response())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Utc;
    use storekeep_core::{ChatMessageId, ShopId};

    use super::*;

    #[test]
    fn test_session_view_marks_current() {
        let session = ChatSession {
            id: ChatSessionId::new(4),
            shop_id: ShopId::new(1),
            title: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let view = SessionView::new(&session, Some(ChatSessionId::new(4)));
        assert!(view.current);
        assert_eq!(view.title, "Untitled conversation");
        assert!(!SessionView::new(&session, None).current);
    }

    #[test]
    fn test_message_view_role() {
        let message = ChatMessage {
            id: ChatMessageId::new(1),
            chat_session_id: ChatSessionId::new(4),
            role: ChatRole::Assistant,
            content: "Hello".to_string(),
            created_at: Utc::now(),
        };
        assert!(!MessageView::from(&message).from_user);
    }
}
