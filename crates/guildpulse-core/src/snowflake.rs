//! Discord snowflake identifiers.
//!
//! A snowflake's upper 42 bits hold milliseconds since [`DISCORD_EPOCH_MS`], so
//! any id can be turned into its creation time and any instant into the
//! smallest id created at or after it (useful as a pagination cursor).

use chrono::{DateTime, Utc};

use crate::error::CoreError;

/// 2015-01-01T00:00:00Z in Unix milliseconds.
pub const DISCORD_EPOCH_MS: i64 = 1_420_070_400_000;

const TIMESTAMP_SHIFT: u32 = 22;

pub fn parse_snowflake(raw: &str) -> Result<u64, CoreError> {
    raw.trim()
        .parse::<u64>()
        .map_err(|_| CoreError::InvalidSnowflake(raw.to_string()))
}

/// Creation time encoded in `id`.
pub fn snowflake_timestamp(id: u64) -> DateTime<Utc> {
    let millis = (id >> TIMESTAMP_SHIFT) as i64 + DISCORD_EPOCH_MS;
    // 42 bits of milliseconds always fit chrono's range.
    DateTime::from_timestamp_millis(millis).unwrap_or_default()
}

/// Creation time of a snowflake given as a decimal string.
pub fn timestamp_of(raw: &str) -> Result<DateTime<Utc>, CoreError> {
    parse_snowflake(raw).map(snowflake_timestamp)
}

/// Smallest snowflake whose timestamp is `at`. Instants before the epoch clamp to 0.
pub fn snowflake_at(at: DateTime<Utc>) -> u64 {
    let since_epoch = (at.timestamp_millis() - DISCORD_EPOCH_MS).max(0) as u64;
    since_epoch << TIMESTAMP_SHIFT
}
