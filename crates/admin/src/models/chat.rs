//! Assistant conversation models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use storekeep_core::{ChatMessageId, ChatRole, ChatSessionId, ShopId};

/// A conversation with the merchant assistant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatSession {
    /// Unique session ID.
    pub id: ChatSessionId,
    /// Shop that owns this session.
    pub shop_id: ShopId,
    /// Optional title (taken from the first message).
    pub title: Option<String>,
    /// When the session was created.
    pub created_at: DateTime<Utc>,
    /// When the session was last updated.
    pub updated_at: DateTime<Utc>,
}

impl ChatSession {
    /// Title for the session list.
    #[must_use]
    pub fn display_title(&self) -> &str {
        self.title
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .unwrap_or("Untitled conversation")
    }
}

/// A message in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Unique message ID.
    pub id: ChatMessageId,
    /// Session this message belongs to.
    pub chat_session_id: ChatSessionId,
    /// Who sent the message.
    pub role: ChatRole,
    /// Plain-text content.
    pub content: String,
    /// When the message was created.
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_message_serialization() {
        let message = ChatMessage {
            id: ChatMessageId::new(1),
            chat_session_id: ChatSessionId::new(1),
            role: ChatRole::Assistant,
            content: "Your plan renews on the 3rd.".to_string(),
            created_at: Utc::now(),
        };

        let json = serde_json::to_string(&message).expect("serialize");
        assert!(json.contains("\"role\":\"assistant\""));
        assert!(json.contains("renews on the 3rd"));
    }

    #[test]
    fn test_blank_title_falls_back() {
        let mut session = ChatSession {
            id: ChatSessionId::new(1),
            shop_id: ShopId::new(1),
            title: Some("  ".to_string()),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert_eq!(session.display_title(), "Untitled conversation");
        session.title = Some("Usage caps".to_string());
        assert_eq!(session.display_title(), "Usage caps");
    }
}
