//! Database operations for assistant sessions and messages.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use storekeep_core::{ChatMessageId, ChatRole, ChatSessionId, ShopId};

use super::RepositoryError;
use crate::models::{ChatMessage, ChatSession};

#[derive(Debug, sqlx::FromRow)]
struct ChatSessionRow {
    id: i32,
    shop_id: i32,
    title: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<ChatSessionRow> for ChatSession {
    fn from(row: ChatSessionRow) -> Self {
        Self {
            id: ChatSessionId::new(row.id),
            shop_id: ShopId::new(row.shop_id),
            title: row.title,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ChatMessageRow {
    id: i32,
    chat_session_id: i32,
    role: ChatRole,
    content: String,
    created_at: DateTime<Utc>,
}

impl From<ChatMessageRow> for ChatMessage {
    fn from(row: ChatMessageRow) -> Self {
        Self {
            id: ChatMessageId::new(row.id),
            chat_session_id: ChatSessionId::new(row.chat_session_id),
            role: row.role,
            content: row.content,
            created_at: row.created_at,
        }
    }
}

/// Repository for chat database operations.
pub struct ChatRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> ChatRepository<'a> {
    /// Create a new chat repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Create a new session titled after its first message.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn create_session(
        &self,
        shop_id: ShopId,
        title: &str,
    ) -> Result<ChatSession, RepositoryError> {
        let row = sqlx::query_as::<_, ChatSessionRow>(
            r"
            INSERT INTO app.chat_session (shop_id, title)
            VALUES ($1, $2)
            RETURNING id, shop_id, title, created_at, updated_at
            ",
        )
        .bind(shop_id.as_i32())
        .bind(title)
        .fetch_one(self.pool)
        .await?;

        Ok(row.into())
    }

    /// Get a session that belongs to `shop_id`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_session(
        &self,
        id: ChatSessionId,
        shop_id: ShopId,
    ) -> Result<Option<ChatSession>, RepositoryError> {
        let row = sqlx::query_as::<_, ChatSessionRow>(
            r"
            SELECT id, shop_id, title, created_at, updated_at
            FROM app.chat_session
            WHERE id = $1 AND shop_id = $2
            ",
        )
        .bind(id.as_i32())
        .bind(shop_id.as_i32())
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(Into::into))
    }

    /// List a shop's sessions, most recently updated first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_sessions(&self, shop_id: ShopId) -> Result<Vec<ChatSession>, RepositoryError> {
        let rows = sqlx::query_as::<_, ChatSessionRow>(
            r"
            SELECT id, shop_id, title, created_at, updated_at
            FROM app.chat_session
            WHERE shop_id = $1
            ORDER BY updated_at DESC
            LIMIT 50
            ",
        )
        .bind(shop_id.as_i32())
        .fetch_all(self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Add a message to a session and bump the session's `updated_at`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn add_message(
        &self,
        chat_session_id: ChatSessionId,
        role: ChatRole,
        content: &str,
    ) -> Result<ChatMessage, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, ChatMessageRow>(
            r"
            INSERT INTO app.chat_message (chat_session_id, role, content)
            VALUES ($1, $2, $3)
            RETURNING id, chat_session_id, role, content, created_at
            ",
        )
        .bind(chat_session_id.as_i32())
        .bind(role)
        .bind(content)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query("UPDATE app.chat_session SET updated_at = NOW() WHERE id = $1")
            .bind(chat_session_id.as_i32())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(row.into())
    }

    /// Get all messages of a session, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_messages(
        &self,
        chat_session_id: ChatSessionId,
    ) -> Result<Vec<ChatMessage>, RepositoryError> {
        let rows = sqlx::query_as::<_, ChatMessageRow>(
            r"
            SELECT id, chat_session_id, role, content, created_at
            FROM app.chat_message
            WHERE chat_session_id = $1
            ORDER BY created_at ASC, id ASC
            ",
        )
        .bind(chat_session_id.as_i32())
        .fetch_all(self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }
}
