use thiserror::Error;

#[derive(Debug, Error)]
pub enum SheetsError {
    #[error("invalid service account credentials: {0}")]
    Credentials(String),

    #[error("failed to sign token assertion: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),

    #[error("token exchange responded with status {status}: {body}")]
    TokenExchange { status: u16, body: String },

    #[error("sheets API {path} responded with status {status}: {body}")]
    RemoteApi {
        status: u16,
        path: String,
        body: String,
    },

    #[error("sheets request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("invalid sheets URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("sheets API base {0:?} cannot carry a path")]
    BaseUrl(String),

    #[error("sheet {0:?} not found in spreadsheet")]
    SheetNotFound(String),

    #[error("unexpected sheets payload: {0}")]
    Decode(String),
}

impl SheetsError {
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::TokenExchange { status, .. } | Self::RemoteApi { status, .. } => Some(*status),
            Self::Transport(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}
