//! Channel membership verification

use crate::gateway::{ChatRef, MessagingGateway};
use std::sync::Arc;
use tracing::{debug, warn};

/// Decides whether a user belongs to the required channel.
pub struct MembershipVerifier {
    gateway: Arc<dyn MessagingGateway>,
    channel: ChatRef,
}

impl MembershipVerifier {
    /// Create a verifier for `channel`
    #[must_use]
    pub fn new(gateway: Arc<dyn MessagingGateway>, channel: ChatRef) -> Self {
        Self { gateway, channel }
    }

    /// The channel users must join
    #[must_use]
    pub const fn channel(&self) -> &ChatRef {
        &self.channel
    }

    /// Returns `true` iff the user is a member, administrator or creator.
    ///
    /// Lookup failures never propagate: the bot may be missing from the
    /// channel, the user may be unknown, or the network may be down, and in
    /// every case the user is simply treated as not a member.
    pub async fn is_member(&self, user_id: i64) -> bool {
        match self.gateway.member_status(&self.channel, user_id).await {
            Ok(status) => {
                debug!(user_id, channel = %self.channel, ?status, "Membership lookup");
                status.grants_access()
            }
            Err(e) => {
                warn!(
                    user_id,
                    channel = %self.channel,
                    error = %e,
                    "Membership lookup failed; make sure the bot is in the channel"
                );
                false
            }
        }
    }
}
