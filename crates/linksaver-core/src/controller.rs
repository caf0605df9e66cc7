//! Access and relay orchestration
//!
//! [`RelayController`] owns the whole user-facing workflow: `/start`
//! verification, the "Verify Join" button, and the gated two-hop relay of a
//! linked channel message through the admin chat.

use crate::config::RelaySettings;
use crate::gateway::{ChatRef, ForwardedMessage, GatewayError, MessagingGateway};
use crate::link::MessageLink;
use crate::progress::{ProgressOutcome, ProgressReporter};
use crate::rate_limit::{Permit, RateLimited, RateLimiter};
use crate::replies;
use crate::store::{AccessStore, StoreStats};
use crate::verifier::MembershipVerifier;
use config::ConfigError;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// One inbound request to relay a channel message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayRequest {
    /// Chat the request came from; the copy is delivered here
    pub chat_id: i64,
    /// User who sent the link
    pub user_id: i64,
    /// Channel holding the message
    pub channel: ChatRef,
    /// Message id within the channel
    pub message_id: i32,
}

impl RelayRequest {
    /// Build a request from a parsed link
    #[must_use]
    pub fn from_link(chat_id: i64, user_id: i64, link: MessageLink) -> Self {
        Self {
            chat_id,
            user_id,
            channel: link.channel,
            message_id: link.message_id,
        }
    }
}

/// Result of `/start`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// The admin identified itself
    Admin,
    /// Membership confirmed, user verified
    Verified,
    /// Not a member; join prompt sent
    JoinRequired,
}

/// Result of a button press
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionOutcome {
    /// "Verify Join" succeeded
    Granted,
    /// "Verify Join" failed
    Rejected,
    /// Unknown action tag
    Ignored,
}

/// Admission decision for a relay request
#[derive(Debug)]
pub enum Admission {
    /// The request may proceed; the permit holds its rate-window slot
    Granted(Permit),
    /// The user is not verified
    AccessDenied,
    /// The user's quota is used up
    RateLimited {
        /// Whole minutes until a slot frees up
        wait_minutes: u64,
    },
}

/// Result of the two-hop forward
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayOutcome {
    /// Both hops succeeded and the timestamp was recorded
    Delivered {
        /// The copy delivered to the requesting chat
        copy: ForwardedMessage,
    },
    /// A hop failed; nothing was recorded
    Failed {
        /// User-facing reason
        reason: String,
    },
}

/// Final result of handling a link message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkOutcome {
    /// The user is not verified
    AccessDenied,
    /// The user's quota is used up
    RateLimited {
        /// Whole minutes until a slot frees up
        wait_minutes: u64,
    },
    /// The message was relayed
    Saved,
    /// The relay failed
    Failed {
        /// User-facing reason
        reason: String,
    },
    /// Shutdown interrupted the request before the relay started
    Cancelled,
}

/// Membership-gated, rate-limited relay of channel messages
pub struct RelayController {
    gateway: Arc<dyn MessagingGateway>,
    store: Arc<dyn AccessStore>,
    verifier: MembershipVerifier,
    limiter: RateLimiter,
    progress: ProgressReporter,
    admin_id: i64,
    shutdown: CancellationToken,
}

impl RelayController {
    /// Wire a controller from settings.
    ///
    /// `shutdown` cancels requests that are still animating their progress bar.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the settings are invalid.
    pub fn new(
        settings: &RelaySettings,
        gateway: Arc<dyn MessagingGateway>,
        store: Arc<dyn AccessStore>,
        shutdown: CancellationToken,
    ) -> Result<Self, ConfigError> {
        settings.validate()?;
        let channel = settings.channel().ok_or_else(|| {
            ConfigError::Message(format!(
                "invalid required channel '{}'",
                settings.required_channel
            ))
        })?;

        Ok(Self {
            verifier: MembershipVerifier::new(Arc::clone(&gateway), channel),
            limiter: RateLimiter::new(
                Arc::clone(&store),
                settings.rate_limit_count,
                settings.rate_window(),
                settings.admin_id,
            ),
            progress: ProgressReporter::new(settings.progress_step, settings.progress_tick()),
            admin_id: settings.admin_id,
            gateway,
            store,
            shutdown,
        })
    }

    /// The channel users must join
    #[must_use]
    pub const fn channel(&self) -> &ChatRef {
        self.verifier.channel()
    }

    /// Whether `user_id` is the administrator identity
    #[must_use]
    pub const fn is_admin(&self, user_id: i64) -> bool {
        user_id == self.admin_id
    }

    /// Configured quota
    #[must_use]
    pub const fn quota(&self) -> usize {
        self.limiter.quota()
    }

    /// Configured window
    #[must_use]
    pub const fn window(&self) -> Duration {
        self.limiter.window()
    }

    /// Store counters
    #[must_use]
    pub fn stats(&self) -> StoreStats {
        self.store.stats()
    }

    /// Handle `/start`: verify the admin or a channel member, otherwise prompt to join.
    ///
    /// # Errors
    ///
    /// Returns an error if the reply cannot be sent.
    pub async fn start(&self, user_id: i64, chat_id: i64) -> Result<StartOutcome, GatewayError> {
        if self.is_admin(user_id) {
            self.store.mark_verified(user_id);
            info!(user_id, "Admin started the bot");
            self.gateway
                .send_text(chat_id, &replies::admin_granted())
                .await?;
            return Ok(StartOutcome::Admin);
        }

        if self.verifier.is_member(user_id).await {
            self.store.mark_verified(user_id);
            info!(user_id, "User verified on /start");
            self.gateway
                .send_text(
                    chat_id,
                    &replies::access_granted(self.quota(), self.window()),
                )
                .await?;
            return Ok(StartOutcome::Verified);
        }

        info!(user_id, channel = %self.channel(), "User is not a member; sending join prompt");
        self.gateway
            .send_with_buttons(
                chat_id,
                &replies::join_prompt(self.channel()),
                replies::join_keyboard(self.channel()),
            )
            .await?;
        Ok(StartOutcome::JoinRequired)
    }

    /// Handle a button press carrying `tag`.
    ///
    /// # Errors
    ///
    /// Returns an error if the acknowledgement or reply cannot be sent.
    pub async fn handle_action(
        &self,
        action_id: &str,
        tag: &str,
        user_id: i64,
        chat_id: i64,
    ) -> Result<ActionOutcome, GatewayError> {
        if tag != replies::VERIFY_JOIN_ACTION {
            debug!(user_id, tag, "Ignoring unknown button action");
            self.gateway.acknowledge(action_id, None, false).await?;
            return Ok(ActionOutcome::Ignored);
        }

        let granted = self.is_admin(user_id) || self.verifier.is_member(user_id).await;
        if !granted {
            info!(user_id, "Verify Join rejected");
            self.gateway
                .acknowledge(action_id, Some(replies::verify_rejected()), true)
                .await?;
            return Ok(ActionOutcome::Rejected);
        }

        self.store.mark_verified(user_id);
        info!(user_id, "Verify Join accepted");
        self.gateway
            .acknowledge(action_id, Some(replies::verify_acknowledged()), false)
            .await?;
        self.gateway
            .send_text(
                chat_id,
                &replies::ready_to_use(self.quota(), self.window()),
            )
            .await?;
        Ok(ActionOutcome::Granted)
    }

    /// Decide whether `request` may be relayed now.
    ///
    /// A granted admission reserves a slot in the user's rate window until the
    /// returned permit is committed or dropped.
    #[must_use]
    pub fn admit(&self, request: &RelayRequest) -> Admission {
        if !self.store.is_verified(request.user_id) {
            return Admission::AccessDenied;
        }
        match self.limiter.admit(request.user_id, Instant::now()) {
            Ok(permit) => Admission::Granted(permit),
            Err(RateLimited { wait_minutes }) => Admission::RateLimited { wait_minutes },
        }
    }

    /// Forward the requested message to the admin chat, then forward that copy
    /// to the requesting chat. The timestamp is recorded only if both hops succeed.
    pub async fn relay(&self, request: &RelayRequest, permit: Permit) -> RelayOutcome {
        let first = match self
            .gateway
            .forward_message(self.admin_id, &request.channel, request.message_id)
            .await
        {
            Ok(first) => first,
            Err(e) => return Self::relay_failed(request, "admin", &e),
        };

        let copy = match self
            .gateway
            .forward_message(
                request.chat_id,
                &ChatRef::Id(first.chat_id),
                first.message_id,
            )
            .await
        {
            Ok(copy) => copy,
            Err(e) => return Self::relay_failed(request, "user", &e),
        };

        permit.commit(Instant::now());
        info!(
            user_id = request.user_id,
            channel = %request.channel,
            message_id = request.message_id,
            "Relay delivered"
        );
        RelayOutcome::Delivered { copy }
    }

    fn relay_failed(request: &RelayRequest, hop: &str, error: &GatewayError) -> RelayOutcome {
        warn!(
            user_id = request.user_id,
            channel = %request.channel,
            message_id = request.message_id,
            hop,
            error = %error,
            "Relay failed"
        );
        RelayOutcome::Failed {
            reason: error
                .description()
                .unwrap_or(replies::RELAY_FALLBACK_REASON)
                .to_string(),
        }
    }

    /// Handle a message containing a channel link: admission, progress bar, relay
    /// and the final reply.
    ///
    /// # Errors
    ///
    /// Returns an error if a reply the user must see cannot be sent.
    pub async fn handle_link(&self, request: RelayRequest) -> Result<LinkOutcome, GatewayError> {
        let chat_id = request.chat_id;
        let permit = match self.admit(&request) {
            Admission::Granted(permit) => permit,
            Admission::AccessDenied => {
                info!(user_id = request.user_id, "Link from unverified user");
                self.gateway
                    .send_text(chat_id, &replies::access_denied(self.channel()))
                    .await?;
                return Ok(LinkOutcome::AccessDenied);
            }
            Admission::RateLimited { wait_minutes } => {
                info!(user_id = request.user_id, wait_minutes, "Link rate limited");
                self.gateway
                    .send_text(chat_id, &replies::rate_limited(wait_minutes))
                    .await?;
                return Ok(LinkOutcome::RateLimited { wait_minutes });
            }
        };

        let progress_id = self
            .gateway
            .send_text(chat_id, &replies::progress(0))
            .await?;

        let outcome = self
            .progress
            .run(
                self.gateway.as_ref(),
                chat_id,
                progress_id,
                &self.shutdown,
                || self.relay(&request, permit),
            )
            .await;

        match outcome {
            ProgressOutcome::Completed(RelayOutcome::Delivered { .. }) => {
                if let Err(e) = self.gateway.delete_message(chat_id, progress_id).await {
                    debug!(chat_id, error = %e, "Could not delete progress message");
                }
                self.gateway
                    .send_text(chat_id, &replies::saved(&request.channel))
                    .await?;
                Ok(LinkOutcome::Saved)
            }
            ProgressOutcome::Completed(RelayOutcome::Failed { reason }) => {
                let text = replies::failed(&reason);
                if let Err(e) = self.gateway.edit_text(chat_id, progress_id, &text).await {
                    debug!(chat_id, error = %e, "Could not edit progress message; sending instead");
                    self.gateway.send_text(chat_id, &text).await?;
                }
                Ok(LinkOutcome::Failed { reason })
            }
            ProgressOutcome::Cancelled => {
                if let Err(e) = self
                    .gateway
                    .edit_text(chat_id, progress_id, &replies::cancelled())
                    .await
                {
                    debug!(chat_id, error = %e, "Could not mark progress message as cancelled");
                }
                Ok(LinkOutcome::Cancelled)
            }
        }
    }
}
