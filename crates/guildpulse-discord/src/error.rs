use thiserror::Error;

#[derive(Debug, Error)]
pub enum DiscordError {
    #[error("discord API {path} responded with status {status}: {body}")]
    RemoteApi {
        status: u16,
        path: String,
        body: String,
    },

    #[error("discord API {path} still rate limited after {attempts} attempts")]
    RateLimited { path: String, attempts: u32 },

    #[error("discord request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("unexpected discord payload from {path}: {source}")]
    Decode {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

impl DiscordError {
    /// HTTP status returned by Discord, when there was one.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::RemoteApi { status, .. } => Some(*status),
            Self::RateLimited { .. } => Some(429),
            Self::Transport(e) => e.status().map(|s| s.as_u16()),
            Self::Decode { .. } => None,
        }
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }
}
