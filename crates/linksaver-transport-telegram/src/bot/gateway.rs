//! [`MessagingGateway`] backed by the Telegram Bot API.

use async_trait::async_trait;
use linksaver_core::gateway::{
    ButtonAction, ChatRef, ForwardedMessage, GatewayError, Keyboard, MemberStatus,
    MessagingGateway,
};
use teloxide::prelude::*;
use teloxide::types::{
    CallbackQueryId, ChatMemberStatus, InlineKeyboardButton, InlineKeyboardMarkup, MessageId,
    Recipient,
};
use teloxide::RequestError;

/// Telegram implementation of the messaging gateway
#[derive(Clone)]
pub struct TelegramGateway {
    bot: Bot,
}

impl TelegramGateway {
    /// Wrap a bot handle
    #[must_use]
    pub const fn new(bot: Bot) -> Self {
        Self { bot }
    }

    /// Build the answer to a button press without sending it
    fn acknowledge_request(
        &self,
        action_id: &str,
        notice: Option<String>,
        alert: bool,
    ) -> <Bot as Requester>::AnswerCallbackQuery {
        let request = self
            .bot
            .answer_callback_query(CallbackQueryId(action_id.to_owned()));
        match notice {
            Some(text) => request.text(text).show_alert(alert),
            None => request,
        }
    }
}

/// Map a chat reference onto a Bot API recipient.
#[must_use]
pub fn recipient(chat: &ChatRef) -> Recipient {
    match chat {
        ChatRef::Username(handle) => Recipient::ChannelUsername(format!("@{handle}")),
        ChatRef::Id(id) => Recipient::Id(ChatId(*id)),
    }
}

/// Map a Bot API member status onto the platform-neutral one.
#[must_use]
pub const fn member_status(status: ChatMemberStatus) -> MemberStatus {
    match status {
        ChatMemberStatus::Owner => MemberStatus::Owner,
        ChatMemberStatus::Administrator => MemberStatus::Administrator,
        ChatMemberStatus::Member => MemberStatus::Member,
        ChatMemberStatus::Restricted => MemberStatus::Restricted,
        ChatMemberStatus::Left => MemberStatus::Left,
        ChatMemberStatus::Banned => MemberStatus::Banned,
    }
}

/// Convert a request error, keeping the API's description when there is one.
#[must_use]
pub fn gateway_error(error: RequestError) -> GatewayError {
    match error {
        RequestError::Api(api) => GatewayError::Api {
            description: api.to_string(),
        },
        other => GatewayError::Transport(other.to_string()),
    }
}

/// Build an inline keyboard from rows of buttons.
///
/// # Errors
///
/// Returns `GatewayError::Transport` if a link button carries an invalid URL.
pub fn keyboard_markup(keyboard: Keyboard) -> Result<InlineKeyboardMarkup, GatewayError> {
    let rows = keyboard
        .into_iter()
        .map(|row| {
            row.into_iter()
                .map(|button| match button.action {
                    ButtonAction::Url(url) => reqwest::Url::parse(&url)
                        .map(|url| InlineKeyboardButton::url(button.text, url))
                        .map_err(|e| {
                            GatewayError::Transport(format!("invalid button url '{url}': {e}"))
                        }),
                    ButtonAction::Callback(tag) => {
                        Ok(InlineKeyboardButton::callback(button.text, tag))
                    }
                })
                .collect::<Result<Vec<_>, _>>()
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(InlineKeyboardMarkup::new(rows))
}

#[async_trait]
impl MessagingGateway for TelegramGateway {
    async fn send_text(&self, chat_id: i64, text: &str) -> Result<i32, GatewayError> {
        let msg = self
            .bot
            .send_message(ChatId(chat_id), text)
            .await
            .map_err(gateway_error)?;
        Ok(msg.id.0)
    }

    async fn send_with_buttons(
        &self,
        chat_id: i64,
        text: &str,
        keyboard: Keyboard,
    ) -> Result<i32, GatewayError> {
        let markup = keyboard_markup(keyboard)?;
        let msg = self
            .bot
            .send_message(ChatId(chat_id), text)
            .reply_markup(markup)
            .await
            .map_err(gateway_error)?;
        Ok(msg.id.0)
    }

    async fn edit_text(
        &self,
        chat_id: i64,
        message_id: i32,
        text: &str,
    ) -> Result<(), GatewayError> {
        self.bot
            .edit_message_text(ChatId(chat_id), MessageId(message_id), text)
            .await
            .map_err(gateway_error)?;
        Ok(())
    }

    async fn delete_message(&self, chat_id: i64, message_id: i32) -> Result<(), GatewayError> {
        self.bot
            .delete_message(ChatId(chat_id), MessageId(message_id))
            .await
            .map_err(gateway_error)?;
        Ok(())
    }

    async fn member_status(
        &self,
        chat: &ChatRef,
        user_id: i64,
    ) -> Result<MemberStatus, GatewayError> {
        let member = self
            .bot
            .get_chat_member(recipient(chat), UserId(user_id.cast_unsigned()))
            .await
            .map_err(gateway_error)?;
        Ok(member_status(member.kind.status()))
    }

    async fn forward_message(
        &self,
        to_chat_id: i64,
        from: &ChatRef,
        message_id: i32,
    ) -> Result<ForwardedMessage, GatewayError> {
        let msg = self
            .bot
            .forward_message(ChatId(to_chat_id), recipient(from), MessageId(message_id))
            .await
            .map_err(gateway_error)?;
        Ok(ForwardedMessage {
            chat_id: msg.chat.id.0,
            message_id: msg.id.0,
        })
    }

    async fn acknowledge(
        &self,
        action_id: &str,
        notice: Option<String>,
        alert: bool,
    ) -> Result<(), GatewayError> {
        self.acknowledge_request(action_id, notice, alert)
            .await
            .map_err(gateway_error)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use linksaver_core::gateway::InlineButton;
    use teloxide::requests::HasPayload;
    use teloxide::types::InlineKeyboardButtonKind;
    use teloxide::ApiError;

    fn gateway() -> TelegramGateway {
        TelegramGateway::new(Bot::new("1234567890:test-token"))
    }

    #[test]
    fn test_acknowledge_targets_button_press() {
        let gateway = gateway();
        let request = gateway.acknowledge_request("4382bfdwdsb323b2d9", None, false);
        let payload = request.payload_ref();

        assert_eq!(
            payload.callback_query_id,
            CallbackQueryId("4382bfdwdsb323b2d9".to_string())
        );
        assert_eq!(payload.text, None);
        assert_eq!(payload.show_alert, None);
    }

    #[test]
    fn test_acknowledge_with_alert_notice() {
        let gateway = gateway();
        let request = gateway.acknowledge_request(
            "cb-7",
            Some("You haven't joined the channel!".to_string()),
            true,
        );
        let payload = request.payload_ref();

        assert_eq!(payload.callback_query_id, CallbackQueryId("cb-7".to_string()));
        assert_eq!(
            payload.text.as_deref(),
            Some("You haven't joined the channel!")
        );
        assert_eq!(payload.show_alert, Some(true));
    }

    #[test]
    fn test_recipient_prefixes_handle() {
        assert_eq!(
            recipient(&ChatRef::Username("whiz_t".to_string())),
            Recipient::ChannelUsername("@whiz_t".to_string())
        );
        assert_eq!(
            recipient(&ChatRef::Id(-100_123)),
            Recipient::Id(ChatId(-100_123))
        );
    }

    #[test]
    fn test_member_status_mapping() {
        assert_eq!(member_status(ChatMemberStatus::Owner), MemberStatus::Owner);
        assert_eq!(member_status(ChatMemberStatus::Left), MemberStatus::Left);
        assert_eq!(member_status(ChatMemberStatus::Banned), MemberStatus::Banned);
        assert!(member_status(ChatMemberStatus::Member).grants_access());
        assert!(!member_status(ChatMemberStatus::Restricted).grants_access());
    }

    #[test]
    fn test_api_error_keeps_description() {
        let err = gateway_error(RequestError::Api(ApiError::BotBlocked));
        assert!(matches!(err, GatewayError::Api { .. }));
        assert!(err.description().is_some_and(|d| !d.is_empty()));
    }

    #[test]
    fn test_keyboard_markup_builds_rows() -> Result<(), GatewayError> {
        let markup = keyboard_markup(vec![vec![
            InlineButton::url("🌟 Join @whiz_t", "https://t.me/whiz_t"),
            InlineButton::callback("✅ Verify Join", "verify_join"),
        ]])?;

        assert_eq!(markup.inline_keyboard.len(), 1);
        let row = &markup.inline_keyboard[0];
        assert_eq!(row.len(), 2);
        assert!(matches!(row[0].kind, InlineKeyboardButtonKind::Url(_)));
        assert_eq!(
            row[1].kind,
            InlineKeyboardButtonKind::CallbackData("verify_join".to_string())
        );
        Ok(())
    }

    #[test]
    fn test_keyboard_markup_rejects_bad_url() {
        let result = keyboard_markup(vec![vec![InlineButton::url("x", "not a url")]]);
        assert!(matches!(result, Err(GatewayError::Transport(_))));
    }
}
