//! Telegram message link parsing
//!
//! Recognises `https://t.me/<handle>/<id>` and `https://t.me/c/<internal>/<id>`
//! anywhere in a message text.

use crate::gateway::ChatRef;
use lazy_regex::regex_captures;

/// A channel message addressed by a `t.me` link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageLink {
    /// Channel the message lives in.
    pub channel: ChatRef,
    /// Message id within the channel.
    pub message_id: i32,
}

/// Extract the first channel message link from `text`.
///
/// Private `c/` links carry the channel's internal id, which the Bot API
/// addresses as `-100<internal>`.
///
/// # Examples
///
/// ```
/// use linksaver_core::gateway::ChatRef;
/// use linksaver_core::link::parse_message_link;
///
/// let link = parse_message_link("look https://t.me/whiz_t/42").unwrap();
/// assert_eq!(link.channel, ChatRef::Username("whiz_t".into()));
/// assert_eq!(link.message_id, 42);
/// ```
#[must_use]
pub fn parse_message_link(text: &str) -> Option<MessageLink> {
    let (_, private, handle, id) =
        regex_captures!(r"https?://t\.me/(c/)?([^/\s]+)/(\d+)"i, text)?;
    let message_id = id.parse::<i32>().ok()?;

    let channel = if private.is_empty() {
        ChatRef::Username(handle.to_string())
    } else {
        if !handle.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        ChatRef::Id(format!("-100{handle}").parse().ok()?)
    };

    Some(MessageLink {
        channel,
        message_id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_link() {
        let link = parse_message_link("https://t.me/whiz_t/1234");
        assert_eq!(
            link,
            Some(MessageLink {
                channel: ChatRef::Username("whiz_t".to_string()),
                message_id: 1234,
            })
        );
    }

    #[test]
    fn test_private_link_maps_to_channel_id() {
        let link = parse_message_link("http://t.me/c/1987654321/7");
        assert_eq!(
            link,
            Some(MessageLink {
                channel: ChatRef::Id(-1_001_987_654_321),
                message_id: 7,
            })
        );
    }

    #[test]
    fn test_link_inside_text_and_case_insensitive() {
        let link = parse_message_link("save this please: HTTPS://T.ME/News_Feed/99?single thanks");
        assert_eq!(
            link.map(|l| (l.channel.to_string(), l.message_id)),
            Some(("@News_Feed".to_string(), 99))
        );
    }

    #[test]
    fn test_rejects_non_links() {
        assert_eq!(parse_message_link("hello"), None);
        assert_eq!(parse_message_link("https://t.me/whiz_t"), None);
        assert_eq!(parse_message_link("https://t.me/whiz_t/abc"), None);
        assert_eq!(parse_message_link("https://example.com/whiz_t/12"), None);
        assert_eq!(parse_message_link("https://t.me/c/notnumeric/12"), None);
    }

    #[test]
    fn test_rejects_overflowing_message_id() {
        assert_eq!(parse_message_link("https://t.me/whiz_t/99999999999"), None);
    }
}
