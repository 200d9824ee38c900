//! Discord REST access for the collector: a rate-limit aware client, the
//! paginated fetchers built on it, and the [`CommunitySource`] implementation.
//!
//! [`CommunitySource`]: guildpulse_core::source::CommunitySource

pub mod client;
pub mod error;
pub mod fetch;
pub mod source;
mod wire;

pub use client::{DiscordClient, Forbidden, RetryPolicy, Sleeper, TokioSleeper};
pub use error::DiscordError;
pub use source::DiscordSource;
