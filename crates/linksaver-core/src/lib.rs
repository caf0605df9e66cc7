#![deny(missing_docs)]
//! Linksaver core library.
//!
//! Transport-agnostic access control and relay logic: membership gating,
//! per-user rate windows and the two-hop forward through the admin chat.

/// Configuration management.
pub mod config;
/// Access and relay orchestration.
pub mod controller;
/// Messaging gateway abstraction.
pub mod gateway;
/// Telegram message link parsing.
pub mod link;
/// Cosmetic progress indicator.
pub mod progress;
/// Sliding-window rate limiting.
pub mod rate_limit;
/// User-facing reply texts.
pub mod replies;
/// Per-user verification and rate-window state.
pub mod store;
/// Channel membership verification.
pub mod verifier;

pub use controller::{
    ActionOutcome, LinkOutcome, RelayController, RelayOutcome, RelayRequest, StartOutcome,
};
pub use gateway::{ChatRef, GatewayError, MessagingGateway};
pub use store::{AccessStore, InMemoryStore};
