//! Messaging gateway abstraction
//!
//! The core never talks to Telegram directly. Everything it needs from the
//! platform goes through [`MessagingGateway`], which the transport crate
//! implements on top of the Bot API.

use async_trait::async_trait;
use std::fmt;
use thiserror::Error;

/// Reference to a chat that can be addressed either by public username or id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ChatRef {
    /// Public username, stored without the leading `@`.
    Username(String),
    /// Numeric chat id (`-100…` for channels and supergroups).
    Id(i64),
}

impl ChatRef {
    /// Parse a configured chat reference: `@handle`, `handle` or a numeric id.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if let Ok(id) = raw.parse::<i64>() {
            return Some(Self::Id(id));
        }
        let handle = raw.strip_prefix('@').unwrap_or(raw);
        let valid = !handle.is_empty()
            && handle
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_');
        valid.then(|| Self::Username(handle.to_string()))
    }

    /// Public `t.me` URL for username chats.
    #[must_use]
    pub fn public_url(&self) -> Option<String> {
        match self {
            Self::Username(handle) => Some(format!("https://t.me/{handle}")),
            Self::Id(_) => None,
        }
    }
}

impl fmt::Display for ChatRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Username(handle) => write!(f, "@{handle}"),
            Self::Id(id) => write!(f, "{id}"),
        }
    }
}

/// Membership role of a user in a chat, as reported by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberStatus {
    /// Chat creator.
    Owner,
    /// Chat administrator.
    Administrator,
    /// Regular member.
    Member,
    /// Restricted member.
    Restricted,
    /// Not in the chat.
    Left,
    /// Banned from the chat.
    Banned,
}

impl MemberStatus {
    /// Whether this role grants access: member, administrator or creator.
    #[must_use]
    pub const fn grants_access(self) -> bool {
        matches!(self, Self::Owner | Self::Administrator | Self::Member)
    }
}

/// What happens when an inline button is pressed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ButtonAction {
    /// Open a URL.
    Url(String),
    /// Send an opaque action tag back to the bot.
    Callback(String),
}

/// A single inline button under a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineButton {
    /// Button label.
    pub text: String,
    /// Button behaviour.
    pub action: ButtonAction,
}

impl InlineButton {
    /// Create a URL button.
    pub fn url(text: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            action: ButtonAction::Url(url.into()),
        }
    }

    /// Create a callback button carrying `tag`.
    pub fn callback(text: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            action: ButtonAction::Callback(tag.into()),
        }
    }
}

/// Rows of inline buttons.
pub type Keyboard = Vec<Vec<InlineButton>>;

/// Location of a message produced by a forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForwardedMessage {
    /// Chat the copy landed in.
    pub chat_id: i64,
    /// Id of the copy within that chat.
    pub message_id: i32,
}

/// Errors reported by the messaging gateway
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    /// The platform rejected the request and described why
    #[error("API error: {description}")]
    Api {
        /// Description supplied by the platform
        description: String,
    },
    /// Network, IO or decoding failure
    #[error("Transport error: {0}")]
    Transport(String),
}

impl GatewayError {
    /// The platform-supplied description, if any.
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        match self {
            Self::Api { description } if !description.trim().is_empty() => Some(description),
            _ => None,
        }
    }
}

/// Outbound operations the relay workflow needs from the messaging platform
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MessagingGateway: Send + Sync {
    /// Send a plain text message; returns the new message id
    async fn send_text(&self, chat_id: i64, text: &str) -> Result<i32, GatewayError>;
    /// Send a text message with inline buttons; returns the new message id
    async fn send_with_buttons(
        &self,
        chat_id: i64,
        text: &str,
        keyboard: Keyboard,
    ) -> Result<i32, GatewayError>;
    /// Replace the text of an existing message
    async fn edit_text(&self, chat_id: i64, message_id: i32, text: &str)
        -> Result<(), GatewayError>;
    /// Delete a message
    async fn delete_message(&self, chat_id: i64, message_id: i32) -> Result<(), GatewayError>;
    /// Look up the membership role of `user_id` in `chat`
    async fn member_status(&self, chat: &ChatRef, user_id: i64)
        -> Result<MemberStatus, GatewayError>;
    /// Forward `message_id` from `from` into `to_chat_id`
    async fn forward_message(
        &self,
        to_chat_id: i64,
        from: &ChatRef,
        message_id: i32,
    ) -> Result<ForwardedMessage, GatewayError>;
    /// Answer a button press, optionally with a notice or an alert
    async fn acknowledge(
        &self,
        action_id: &str,
        notice: Option<String>,
        alert: bool,
    ) -> Result<(), GatewayError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_ref_parse() {
        assert_eq!(
            ChatRef::parse("@whiz_t"),
            Some(ChatRef::Username("whiz_t".to_string()))
        );
        assert_eq!(
            ChatRef::parse("whiz_t"),
            Some(ChatRef::Username("whiz_t".to_string()))
        );
        assert_eq!(
            ChatRef::parse("-1001234567890"),
            Some(ChatRef::Id(-1_001_234_567_890))
        );
        assert_eq!(ChatRef::parse("@"), None);
        assert_eq!(ChatRef::parse("bad handle"), None);
    }

    #[test]
    fn test_chat_ref_display_and_url() {
        let channel = ChatRef::Username("whiz_t".to_string());
        assert_eq!(channel.to_string(), "@whiz_t");
        assert_eq!(channel.public_url().as_deref(), Some("https://t.me/whiz_t"));
        assert_eq!(ChatRef::Id(-100_42).public_url(), None);
    }

    #[test]
    fn test_member_status_access() {
        assert!(MemberStatus::Owner.grants_access());
        assert!(MemberStatus::Administrator.grants_access());
        assert!(MemberStatus::Member.grants_access());
        assert!(!MemberStatus::Restricted.grants_access());
        assert!(!MemberStatus::Left.grants_access());
        assert!(!MemberStatus::Banned.grants_access());
    }

    #[test]
    fn test_error_description() {
        let api = GatewayError::Api {
            description: "Bad Request: chat not found".to_string(),
        };
        assert_eq!(api.description(), Some("Bad Request: chat not found"));
        assert_eq!(
            GatewayError::Api {
                description: "  ".to_string()
            }
            .description(),
            None
        );
        assert_eq!(GatewayError::Transport("timeout".into()).description(), None);
    }
}
