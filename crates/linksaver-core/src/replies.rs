//! User-facing reply texts and keyboards.
//!
//! All texts are plain (no parse mode) so channel handles with underscores
//! never break formatting.

use crate::gateway::{ChatRef, InlineButton, Keyboard};
use std::time::Duration;

/// Action tag carried by the "Verify Join" button.
pub const VERIFY_JOIN_ACTION: &str = "verify_join";

/// Reason shown when a relay fails without a platform description.
pub const RELAY_FALLBACK_REASON: &str =
    "Failed to save. The bot may need admin rights in that channel.";

const BAR_CELLS: usize = 10;

fn window_minutes(window: Duration) -> u64 {
    window.as_secs().div_ceil(60).max(1)
}

fn rate_notice(quota: usize, window: Duration) -> String {
    format!(
        "⚠️ Rate limit: {quota} saves per {} minutes",
        window_minutes(window)
    )
}

/// Reply to `/start` from the admin.
#[must_use]
pub fn admin_granted() -> String {
    "👑 Admin access granted!".to_string()
}

/// Reply to `/start` from a verified member.
#[must_use]
pub fn access_granted(quota: usize, window: Duration) -> String {
    format!(
        "✅ Access granted! Send me Telegram links.\n\n{}",
        rate_notice(quota, window)
    )
}

/// Usage message after a successful "Verify Join".
#[must_use]
pub fn ready_to_use(quota: usize, window: Duration) -> String {
    format!(
        "🎉 You can now use the bot!\n\nSimply send any Telegram message link.\n\n{}",
        rate_notice(quota, window)
    )
}

/// Join prompt shown to non-members.
#[must_use]
pub fn join_prompt(channel: &ChatRef) -> String {
    format!(
        "🔒 Access Required\n\nJoin {channel} and press \"Verify Join\" to start saving content."
    )
}

/// Buttons under the join prompt: a link to the channel (when public) and the verify action.
#[must_use]
pub fn join_keyboard(channel: &ChatRef) -> Keyboard {
    let mut row = Vec::with_capacity(2);
    if let Some(url) = channel.public_url() {
        row.push(InlineButton::url(format!("🌟 Join {channel}"), url));
    }
    row.push(InlineButton::callback("✅ Verify Join", VERIFY_JOIN_ACTION));
    vec![row]
}

/// Button acknowledgement after successful verification.
#[must_use]
pub fn verify_acknowledged() -> String {
    "Access granted!".to_string()
}

/// Alert shown when verification fails.
#[must_use]
pub fn verify_rejected() -> String {
    "You haven't joined the channel!".to_string()
}

/// Reply to a link from an unverified user.
#[must_use]
pub fn access_denied(channel: &ChatRef) -> String {
    format!("❌ Please join {channel} first and verify with /start")
}

/// Reply to a link when the quota is used up.
#[must_use]
pub fn rate_limited(wait_minutes: u64) -> String {
    format!(
        "⚠️ Rate Limit Exceeded\n\nPlease wait {wait_minutes} minute(s) before saving more content."
    )
}

/// Progress bar text at `percent`.
///
/// # Examples
///
/// ```
/// use linksaver_core::replies::progress;
///
/// assert_eq!(progress(0), "⏳ Processing link...\n0% ▱▱▱▱▱▱▱▱▱▱");
/// assert_eq!(progress(30), "⏳ Processing link...\n30% ▰▰▰▱▱▱▱▱▱▱");
/// ```
#[must_use]
pub fn progress(percent: u8) -> String {
    let percent = percent.min(100);
    let filled = usize::from(percent) * BAR_CELLS / 100;
    format!(
        "⏳ Processing link...\n{percent}% {}{}",
        "▰".repeat(filled),
        "▱".repeat(BAR_CELLS - filled)
    )
}

/// Final message after a successful relay.
#[must_use]
pub fn saved(channel: &ChatRef) -> String {
    format!("✅ Content saved from {channel}")
}

/// Final message after a failed relay.
#[must_use]
pub fn failed(reason: &str) -> String {
    format!("❌ Failed to save content:\n{reason}")
}

/// Replacement for the progress message when the bot shuts down mid-request.
#[must_use]
pub fn cancelled() -> String {
    "⏹ Request cancelled, the bot is restarting. Please send the link again later.".to_string()
}

/// Reply to text that contains no message link.
#[must_use]
pub fn link_hint() -> String {
    "🔗 Send me a Telegram message link, e.g. https://t.me/channel/123".to_string()
}

/// Reply to `/help`.
#[must_use]
pub fn help(channel: &ChatRef, quota: usize, window: Duration) -> String {
    format!(
        "ℹ️ How it works\n\n\
         1. Join {channel} and press /start to verify.\n\
         2. Send a link like https://t.me/channel/123 or https://t.me/c/123456/789.\n\
         3. The message is forwarded to you.\n\n{}",
        rate_notice(quota, window)
    )
}

/// Reply to `/stats`.
#[must_use]
pub fn stats(
    verified_users: usize,
    tracked_windows: u64,
    quota: usize,
    window: Duration,
) -> String {
    format!(
        "📊 Bot Statistics\n\n\
         • Verified users: {verified_users}\n\
         • Active rate windows: {tracked_windows}\n\
         • Quota: {quota} saves per {} minutes",
        window_minutes(window)
    )
}
