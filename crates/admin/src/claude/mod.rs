//! Anthropic Messages API integration for the merchant assistant.
//!
//! Only streaming text replies are used; conversations are persisted in
//! `app.chat_session` / `app.chat_message` by [`crate::services::chat`].

mod client;
mod error;
mod types;

pub use client::ClaudeClient;
pub use error::ClaudeError;
pub use types::{
    ChatRequest, ContentBlockDelta, ContentBlockStart, Message, StopReason, StreamEvent, Usage,
};
