use anyhow::Result;
use linksaver_core::link::MessageLink;
use linksaver_core::{replies, LinkOutcome, RelayController, RelayRequest};
use std::sync::Arc;
use teloxide::{
    prelude::*,
    types::{CallbackQuery, Message},
    utils::command::BotCommands,
};
use tracing::{debug, info};

/// Safely extract the sender's user id (0 for anonymous senders)
#[must_use]
pub fn get_user_id_safe(msg: &Message) -> i64 {
    msg.from.as_ref().map_or(0, |u| u.id.0.cast_signed())
}

/// Commands the bot understands
#[derive(BotCommands, Clone, Debug, PartialEq, Eq)]
#[command(rename_rule = "lowercase", description = "Supported commands:")]
pub enum Command {
    /// Verify channel membership
    #[command(description = "Verify channel membership.")]
    Start,
    /// Explain usage
    #[command(description = "Show how to use the bot.")]
    Help,
    /// Check bot health
    #[command(description = "Check bot health.")]
    Healthcheck,
    /// Show bot statistics
    #[command(description = "Show bot statistics (admin only).")]
    Stats,
}

/// Handler for `/start`
///
/// # Errors
///
/// Returns an error if the reply cannot be sent.
pub async fn start(msg: Message, controller: Arc<RelayController>) -> Result<()> {
    let user_id = get_user_id_safe(&msg);
    let outcome = controller.start(user_id, msg.chat.id.0).await?;
    debug!(user_id, ?outcome, "Handled /start");
    Ok(())
}

/// Handler for `/help`
///
/// # Errors
///
/// Returns an error if the reply cannot be sent.
pub async fn help(bot: Bot, msg: Message, controller: Arc<RelayController>) -> Result<()> {
    let text = replies::help(controller.channel(), controller.quota(), controller.window());
    bot.send_message(msg.chat.id, text).await?;
    Ok(())
}

/// Healthcheck handler
///
/// # Errors
///
/// Returns an error if the response cannot be sent.
pub async fn healthcheck(bot: Bot, msg: Message) -> Result<()> {
    let user_id = get_user_id_safe(&msg);
    info!("Healthcheck command received from user {user_id}.");
    bot.send_message(msg.chat.id, "OK").await?;
    info!("Responded 'OK' to healthcheck from user {user_id}.");
    Ok(())
}

/// Stats handler, answered for the admin only
///
/// # Errors
///
/// Returns an error if the response cannot be sent.
pub async fn stats(bot: Bot, msg: Message, controller: Arc<RelayController>) -> Result<()> {
    let user_id = get_user_id_safe(&msg);
    info!("Stats command received from user {user_id}.");

    if !controller.is_admin(user_id) {
        bot.send_message(msg.chat.id, "⛔️ Access denied").await?;
        return Ok(());
    }

    let stats = controller.stats();
    let text = replies::stats(
        stats.verified_users,
        stats.tracked_windows,
        controller.quota(),
        controller.window(),
    );
    bot.send_message(msg.chat.id, text).await?;
    Ok(())
}

/// Handler for a text message containing a channel message link
///
/// # Errors
///
/// Returns an error if a reply the user must see cannot be sent.
pub async fn handle_link(
    msg: Message,
    link: MessageLink,
    controller: Arc<RelayController>,
) -> Result<()> {
    let user_id = get_user_id_safe(&msg);
    info!(
        user_id,
        channel = %link.channel,
        message_id = link.message_id,
        "Link received"
    );

    let request = RelayRequest::from_link(msg.chat.id.0, user_id, link);
    match controller.handle_link(request).await? {
        LinkOutcome::Saved => debug!(user_id, "Link saved"),
        other => debug!(user_id, outcome = ?other, "Link not saved"),
    }
    Ok(())
}

/// Handler for text that carries no link
///
/// # Errors
///
/// Returns an error if the hint cannot be sent.
pub async fn handle_text(bot: Bot, msg: Message) -> Result<()> {
    debug!(user_id = get_user_id_safe(&msg), "Text without a link");
    bot.send_message(msg.chat.id, replies::link_hint()).await?;
    Ok(())
}

/// Handler for inline button presses
///
/// # Errors
///
/// Returns an error if the acknowledgement or reply cannot be sent.
pub async fn handle_callback(q: CallbackQuery, controller: Arc<RelayController>) -> Result<()> {
    let user_id = q.from.id.0.cast_signed();
    // Private chats share the user's id
    let chat_id = q
        .message
        .as_ref()
        .map_or(user_id, |msg| msg.chat().id.0);
    let tag = q.data.as_deref().unwrap_or_default();

    let outcome = controller
        .handle_action(&q.id.to_string(), tag, user_id, chat_id)
        .await?;
    debug!(user_id, tag, ?outcome, "Handled button press");
    Ok(())
}
