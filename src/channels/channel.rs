//! Channel trait and the message types that cross it.

use std::pin::Pin;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::Stream;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ChannelError;

/// Stream of inbound messages produced by a started channel.
pub type MessageStream = Pin<Box<dyn Stream<Item = IncomingMessage> + Send>>;

/// A user-originated event: free text, or a pick from an offered choice set.
#[derive(Debug, Clone)]
pub struct IncomingMessage {
    pub id: Uuid,
    /// Name of the channel that received it.
    pub channel: String,
    /// Stable user identity within the channel.
    pub user_id: String,
    pub user_name: Option<String>,
    /// Message text. For selections, the token itself.
    pub content: String,
    /// Selection token, when the user picked an offered choice.
    pub selection: Option<String>,
    /// Channel-specific routing data (e.g. Telegram `chat_id`).
    pub metadata: serde_json::Value,
    pub received_at: DateTime<Utc>,
}

impl IncomingMessage {
    /// A free-text message.
    pub fn new(channel: &str, user_id: &str, content: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            channel: channel.to_string(),
            user_id: user_id.to_string(),
            user_name: None,
            content: content.to_string(),
            selection: None,
            metadata: serde_json::json!({}),
            received_at: Utc::now(),
        }
    }

    /// A pick from a previously offered choice set.
    pub fn selection(channel: &str, user_id: &str, token: &str) -> Self {
        Self {
            selection: Some(token.to_string()),
            ..Self::new(channel, user_id, token)
        }
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_user_name(mut self, name: &str) -> Self {
        self.user_name = Some(name.to_string());
        self
    }

    pub fn is_selection(&self) -> bool {
        self.selection.is_some()
    }
}

/// One selectable option: what the user sees and what comes back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Choice {
    pub label: String,
    pub token: String,
}

impl Choice {
    pub fn new(label: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            token: token.into(),
        }
    }
}

/// A reply to send back on the originating channel.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OutgoingResponse {
    pub content: String,
    /// Options to offer with the text. Empty means a free-text reply is expected.
    pub choices: Vec<Choice>,
}

impl OutgoingResponse {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            choices: Vec::new(),
        }
    }

    pub fn with_choices(mut self, choices: Vec<Choice>) -> Self {
        self.choices = choices;
        self
    }
}

/// A chat transport.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Short unique name, also stamped on every message it produces.
    fn name(&self) -> &str;

    /// Begin receiving messages.
    async fn start(&self) -> Result<MessageStream, ChannelError>;

    /// Send a response to the sender of `msg`.
    async fn respond(
        &self,
        msg: &IncomingMessage,
        response: OutgoingResponse,
    ) -> Result<(), ChannelError>;

    async fn health_check(&self) -> Result<(), ChannelError> {
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), ChannelError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selection_carries_token() {
        let msg = IncomingMessage::selection("telegram", "42", "male");
        assert!(msg.is_selection());
        assert_eq!(msg.selection.as_deref(), Some("male"));
        assert_eq!(msg.content, "male");
        assert_eq!(msg.user_id, "42");
    }

    #[test]
    fn text_is_not_selection() {
        let msg = IncomingMessage::new("cli", "local-user", "hello").with_user_name("Ann");
        assert!(!msg.is_selection());
        assert_eq!(msg.user_name.as_deref(), Some("Ann"));
        assert_eq!(msg.metadata, serde_json::json!({}));
    }

    #[test]
    fn response_builder() {
        let r = OutgoingResponse::text("pick").with_choices(vec![Choice::new("A", "a")]);
        assert_eq!(r.content, "pick");
        assert_eq!(r.choices, vec![Choice::new("A", "a")]);
    }
}
