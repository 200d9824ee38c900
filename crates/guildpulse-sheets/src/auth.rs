//! Service-account authentication for the Sheets API.
//!
//! A signed RS256 assertion is exchanged at the key's `token_uri` for an
//! access token, which is cached until shortly before it expires.

use std::fmt;
use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::SheetsError;

pub const SHEETS_SCOPE: &str = "https://www.googleapis.com/auth/spreadsheets";
pub const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME_SECS: i64 = 3600;
/// Tokens are refreshed this long before Google says they expire.
const REFRESH_MARGIN_SECS: i64 = 60;

#[derive(Deserialize)]
struct RawKey {
    client_email: String,
    private_key: String,
    #[serde(default)]
    token_uri: Option<String>,
}

/// The parts of a Google service-account key file the sink needs.
#[derive(Clone)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub token_uri: String,
    signing_key: EncodingKey,
}

impl fmt::Debug for ServiceAccountKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceAccountKey")
            .field("client_email", &self.client_email)
            .field("token_uri", &self.token_uri)
            .field("private_key", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Serialize)]
struct Claims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

impl ServiceAccountKey {
    pub fn from_json(raw: &str) -> Result<Self, SheetsError> {
        let key: RawKey = serde_json::from_str(raw)
            .map_err(|e| SheetsError::Credentials(format!("not a service account key: {e}")))?;
        if key.client_email.trim().is_empty() {
            return Err(SheetsError::Credentials("client_email is empty".to_string()));
        }
        let signing_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())
            .map_err(|e| SheetsError::Credentials(format!("private_key: {e}")))?;
        Ok(Self {
            client_email: key.client_email,
            token_uri: key
                .token_uri
                .filter(|uri| !uri.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_TOKEN_URI.to_string()),
            signing_key,
        })
    }

    /// Accepts the key JSON inline or a path to the key file.
    pub fn load(value: &str) -> Result<Self, SheetsError> {
        let value = value.trim();
        if value.starts_with('{') {
            return Self::from_json(value);
        }
        let raw = std::fs::read_to_string(Path::new(value))
            .map_err(|e| SheetsError::Credentials(format!("cannot read {value}: {e}")))?;
        Self::from_json(&raw)
    }

    pub fn with_token_uri(mut self, token_uri: &str) -> Self {
        self.token_uri = token_uri.to_string();
        self
    }

    /// RS256 assertion requesting the spreadsheets scope, valid for one hour from `now`.
    pub fn signed_assertion(&self, now: DateTime<Utc>) -> Result<String, SheetsError> {
        let claims = Claims {
            iss: &self.client_email,
            scope: SHEETS_SCOPE,
            aud: &self.token_uri,
            iat: now.timestamp(),
            exp: now.timestamp() + ASSERTION_LIFETIME_SECS,
        };
        Ok(encode(
            &Header::new(Algorithm::RS256),
            &claims,
            &self.signing_key,
        )?)
    }
}

/// Supplies bearer tokens for Sheets requests.
#[async_trait]
pub trait AccessTokenSource: Send + Sync + 'static {
    async fn access_token(&self) -> Result<String, SheetsError>;
}

/// Fixed token, for tests and tokens minted outside the process.
#[derive(Debug, Clone)]
pub struct StaticToken(pub String);

#[async_trait]
impl AccessTokenSource for StaticToken {
    async fn access_token(&self) -> Result<String, SheetsError> {
        Ok(self.0.clone())
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: i64,
}

fn default_expires_in() -> i64 {
    ASSERTION_LIFETIME_SECS
}

struct CachedToken {
    token: String,
    refresh_at: DateTime<Utc>,
}

/// Access tokens minted from a service-account key and cached until near expiry.
pub struct ServiceAccountTokens {
    http: reqwest::Client,
    key: ServiceAccountKey,
    cached: Mutex<Option<CachedToken>>,
}

impl ServiceAccountTokens {
    pub fn new(key: ServiceAccountKey) -> Result<Self, SheetsError> {
        let http = reqwest::Client::builder()
            .connect_timeout(std::time::Duration::from_secs(10))
            .timeout(std::time::Duration::from_secs(30))
            .build()?;
        Ok(Self {
            http,
            key,
            cached: Mutex::new(None),
        })
    }

    async fn exchange(&self) -> Result<CachedToken, SheetsError> {
        let now = Utc::now();
        let assertion = self.key.signed_assertion(now)?;
        let response = self
            .http
            .post(&self.key.token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SheetsError::TokenExchange {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }
        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| SheetsError::Decode(format!("token response: {e}")))?;
        let lifetime = (body.expires_in - REFRESH_MARGIN_SECS).max(0);
        info!(
            client_email = %self.key.client_email,
            expires_in = body.expires_in,
            "Obtained Sheets access token"
        );
        Ok(CachedToken {
            token: body.access_token,
            refresh_at: now + Duration::seconds(lifetime),
        })
    }
}

#[async_trait]
impl AccessTokenSource for ServiceAccountTokens {
    async fn access_token(&self) -> Result<String, SheetsError> {
        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref() {
            if Utc::now() < token.refresh_at {
                return Ok(token.token.clone());
            }
            debug!("Sheets access token near expiry, refreshing");
        }
        let fresh = self.exchange().await?;
        let token = fresh.token.clone();
        *cached = Some(fresh);
        Ok(token)
    }
}
