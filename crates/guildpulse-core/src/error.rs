use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid week range {label:?}: {reason}")]
    InvalidWindow { label: String, reason: String },

    #[error("invalid snowflake {0:?}")]
    InvalidSnowflake(String),
}
