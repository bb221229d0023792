//! Merchant assistant conversations.
//!
//! A reply is produced by:
//! 1. Saving the merchant's message
//! 2. Replaying the session history to Claude with a system prompt that
//!    describes the shop's billing state
//! 3. Streaming text deltas to the browser as they arrive
//! 4. Saving the full assistant reply once the stream ends

use askama::Template;
use futures::{Stream, StreamExt};
use sqlx::PgPool;
use storekeep_core::{ChatMessageId, ChatRole, ChatSessionId, ShopId};
use tracing::{error, info, instrument};

use super::billing::UsageSummary;
use crate::claude::{ClaudeClient, ClaudeError, Message, StreamEvent};
use crate::db::{ChatRepository, RepositoryError};
use crate::models::{ChatMessage, ChatSession, Shop, Subscription};

const MAX_TITLE_LENGTH: usize = 50;
/// Older turns beyond this are not replayed.
const MAX_HISTORY_MESSAGES: usize = 40;

#[derive(Template)]
#[template(path = "claude/system_prompt.txt")]
struct SystemPromptTemplate<'a> {
    shop_name: &'a str,
    shop_domain: &'a str,
    plan: Option<&'a str>,
    status: Option<&'a str>,
    price: Option<String>,
    usage: Option<&'a UsageSummary>,
}

/// What the assistant knows about the shop's billing.
#[derive(Debug, Clone, Default)]
pub struct BillingContext {
    pub subscription: Option<Subscription>,
    pub usage: Option<UsageSummary>,
}

/// Render the system prompt for a shop.
#[must_use]
pub fn system_prompt(shop: &Shop, context: &BillingContext) -> String {
    let subscription = context.subscription.as_ref();
    let template = SystemPromptTemplate {
        shop_name: shop.display_name(),
        shop_domain: shop.domain.as_str(),
        plan: subscription.map(|s| s.name.as_str()),
        status: subscription.map(|s| s.status.as_str()),
        price: subscription.map(|s| s.price.display()),
        usage: context.usage.as_ref(),
    };
    template.render().unwrap_or_else(|e| {
        error!(error = %e, "Failed to render system prompt");
        String::from("You are a helpful assistant for a Shopify merchant.")
    })
}

#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("database error: {0}")]
    Database(#[from] RepositoryError),

    #[error("Claude API error: {0}")]
    Claude(#[from] ClaudeError),

    #[error("session not found")]
    SessionNotFound,

    #[error("message is empty")]
    EmptyMessage,
}

/// Events sent to the browser over SSE.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatStreamEvent {
    /// A chunk of assistant text.
    Text(String),
    /// The reply is complete and saved.
    Done {
        session_id: ChatSessionId,
        message_id: Option<ChatMessageId>,
    },
    /// The reply failed; nothing was saved.
    Error(String),
}

impl ChatStreamEvent {
    /// SSE event name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Text(_) => "text",
            Self::Done { .. } => "done",
            Self::Error(_) => "error",
        }
    }

    /// SSE data payload.
    #[must_use]
    pub fn data(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Done {
                session_id,
                message_id,
            } => serde_json::json!({
                "session_id": session_id.as_i32(),
                "message_id": message_id.map(|id| id.as_i32()),
            })
            .to_string(),
            Self::Error(message) => message.clone(),
        }
    }
}

/// A session with the merchant's new message already saved, ready to stream.
#[derive(Debug)]
pub struct PreparedTurn {
    pub session: ChatSession,
    pub history: Vec<Message>,
}

pub struct ChatService<'a> {
    pool: &'a PgPool,
}

impl<'a> ChatService<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn list_sessions(&self, shop_id: ShopId) -> Result<Vec<ChatSession>, ChatError> {
        Ok(ChatRepository::new(self.pool).list_sessions(shop_id).await?)
    }

    /// Messages of a session owned by `shop_id`.
    ///
    /// # Errors
    ///
    /// Returns `SessionNotFound` if the session belongs to another shop.
    pub async fn transcript(
        &self,
        shop_id: ShopId,
        session_id: ChatSessionId,
    ) -> Result<(ChatSession, Vec<ChatMessage>), ChatError> {
        let repo = ChatRepository::new(self.pool);
        let session = repo
            .get_session(session_id, shop_id)
            .await?
            .ok_or(ChatError::SessionNotFound)?;
        let messages = repo.get_messages(session.id).await?;
        Ok((session, messages))
    }

    /// Save the merchant's message, opening a session when none is given.
    ///
    /// # Errors
    ///
    /// Returns `EmptyMessage`, `SessionNotFound`, or a database error.
    #[instrument(skip(self, text), fields(shop_id = %shop_id))]
    pub async fn prepare_turn(
        &self,
        shop_id: ShopId,
        session_id: Option<ChatSessionId>,
        text: &str,
    ) -> Result<PreparedTurn, ChatError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ChatError::EmptyMessage);
        }

        let repo = ChatRepository::new(self.pool);
        let session = match session_id {
            Some(id) => repo
                .get_session(id, shop_id)
                .await?
                .ok_or(ChatError::SessionNotFound)?,
            None => repo.create_session(shop_id, &generate_title(text)).await?,
        };

        repo.add_message(session.id, ChatRole::User, text).await?;
        let history = to_claude_messages(&repo.get_messages(session.id).await?);

        Ok(PreparedTurn { session, history })
    }
}

/// Stream Claude's reply to a prepared turn and save it when complete.
pub fn stream_reply(
    pool: PgPool,
    claude: ClaudeClient,
    turn: PreparedTurn,
    system: String,
) -> impl Stream<Item = ChatStreamEvent> + Send + 'static {
    async_stream::stream! {
        let session_id = turn.session.id;
        let events = match claude.chat_stream(turn.history, Some(system)).await {
            Ok(events) => events,
            Err(e) => {
                error!(error = %e, session = %session_id, "Assistant request failed");
                yield ChatStreamEvent::Error(merchant_message(&e));
                return;
            }
        };
        let mut events = std::pin::pin!(events);

        let mut reply = String::new();
        while let Some(event) = events.next().await {
            match event {
                Ok(StreamEvent::Error { error: detail }) => {
                    error!(kind = %detail.kind, message = %detail.message, "Assistant stream error");
                    let message = if detail.kind == "overloaded_error" {
                        merchant_message(&ClaudeError::Overloaded)
                    } else {
                        "The assistant stopped unexpectedly. Please try again.".to_string()
                    };
                    yield ChatStreamEvent::Error(message);
                    return;
                }
                Ok(StreamEvent::MessageStop) => break,
                Ok(event) => {
                    if let Some(text) = event.text() {
                        reply.push_str(text);
                        yield ChatStreamEvent::Text(text.to_string());
                    }
                }
                Err(e) => {
                    error!(error = %e, session = %session_id, "Assistant stream failed");
                    yield ChatStreamEvent::Error(merchant_message(&e));
                    return;
                }
            }
        }

        let message_id = if reply.trim().is_empty() {
            None
        } else {
            match ChatRepository::new(&pool)
                .add_message(session_id, ChatRole::Assistant, &reply)
                .await
            {
                Ok(message) => Some(message.id),
                Err(e) => {
                    error!(error = %e, session = %session_id, "Failed to save assistant reply");
                    None
                }
            }
        };

        info!(session = %session_id, chars = reply.len(), "Assistant reply complete");
        yield ChatStreamEvent::Done { session_id, message_id };
    }
}

fn merchant_message(error: &ClaudeError) -> String {
    match error {
        ClaudeError::RateLimited(secs) => {
            format!("The assistant is busy. Try again in {secs} seconds.")
        }
        e if e.is_transient() => "The assistant is busy. Try again in a minute.".to_string(),
        _ => "The assistant is unavailable right now.".to_string(),
    }
}

/// Replay persisted messages, merging consecutive turns of the same role.
fn to_claude_messages(messages: &[ChatMessage]) -> Vec<Message> {
    let start = messages.len().saturating_sub(MAX_HISTORY_MESSAGES);
    let mut result: Vec<Message> = Vec::new();

    for msg in messages.iter().skip(start) {
        match result.last_mut() {
            Some(last) if last.role == msg.role => {
                last.content.push_str("\n\n");
                last.content.push_str(&msg.content);
            }
            _ => result.push(Message {
                role: msg.role,
                content: msg.content.clone(),
            }),
        }
    }

    // the API requires the conversation to open with a user turn
    while result.first().is_some_and(|m| m.role == ChatRole::Assistant) {
        result.remove(0);
    }
    result
}

/// Session title from the first message.
fn generate_title(message: &str) -> String {
    let trimmed = message.trim();
    if trimmed.chars().count() <= MAX_TITLE_LENGTH {
        return trimmed.to_string();
    }

    let truncated: String = trimmed.chars().take(MAX_TITLE_LENGTH).collect();
    let cut = truncated
        .rsplit_once(' ')
        .map_or(truncated.as_str(), |(head, _)| head);
    format!("{cut}...")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Utc;
    use storekeep_core::{CurrencyCode, ShopDomain};

    use super::*;

    fn message(id: i32, role: ChatRole, content: &str) -> ChatMessage {
        ChatMessage {
            id: ChatMessageId::new(id),
            chat_session_id: ChatSessionId::new(1),
            role,
            content: content.to_string(),
            created_at: Utc::now(),
        }
    }

    fn shop() -> Shop {
        Shop {
            id: ShopId::new(1),
            domain: ShopDomain::parse("cool-shop.myshopify.com").unwrap(),
            name: Some("Cool Shop".to_string()),
            email: None,
            currency_code: CurrencyCode::USD,
            access_token: None,
            scopes: vec![],
            installed_at: Utc::now(),
            uninstalled_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_generate_title_short() {
        assert_eq!(generate_title("  How do usage charges work?  "), "How do usage charges work?");
    }

    #[test]
    fn test_generate_title_long() {
        let message = "This is a very long message that should be truncated because it exceeds the maximum title length";
        let title = generate_title(message);
        assert!(title.chars().count() <= MAX_TITLE_LENGTH + 3);
        assert!(title.ends_with("..."));
    }

    #[test]
    fn test_generate_title_multibyte() {
        let title = generate_title(&"é".repeat(80));
        assert_eq!(title, format!("{}...", "é".repeat(50)));
    }

    #[test]
    fn test_history_merges_same_role() {
        let history = to_claude_messages(&[
            message(1, ChatRole::User, "Hi"),
            message(2, ChatRole::User, "Are you there?"),
            message(3, ChatRole::Assistant, "Yes"),
        ]);
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].content, "Hi\n\nAre you there?");
        assert_eq!(history[1].role, ChatRole::Assistant);
    }

    #[test]
    fn test_history_is_bounded_and_starts_with_user() {
        let mut messages = Vec::new();
        for i in 0..50 {
            let role = if i % 2 == 0 { ChatRole::User } else { ChatRole::Assistant };
            messages.push(message(i, role, "x"));
        }
        let history = to_claude_messages(&messages);
        assert!(history.len() <= MAX_HISTORY_MESSAGES);
        assert_eq!(history[0].role, ChatRole::User);
    }

    #[test]
    fn test_system_prompt_without_subscription() {
        let prompt = system_prompt(&shop(), &BillingContext::default());
        assert!(prompt.contains("Cool Shop"));
        assert!(prompt.contains("no active plan"));
    }

    #[test]
    fn test_stream_event_wire_format() {
        let done = ChatStreamEvent::Done {
            session_id: ChatSessionId::new(4),
            message_id: None,
        };
        assert_eq!(done.name(), "done");
        let data: serde_json::Value = serde_json::from_str(&done.data()).unwrap();
        assert_eq!(data["session_id"], 4);
        assert!(data["message_id"].is_null());
        assert_eq!(ChatStreamEvent::Text("Hi".to_string()).name(), "text");
    }
}
