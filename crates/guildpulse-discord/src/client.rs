use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use reqwest::{
    header::{HeaderMap, AUTHORIZATION, RETRY_AFTER, USER_AGENT},
    Method, StatusCode,
};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::DiscordError;

/// Longest server-requested wait we are willing to honour for one retry.
const MAX_SERVER_DELAY_SECS: f64 = 3600.0;

/// Error bodies are truncated to this many characters.
const MAX_ERROR_BODY: usize = 512;

/// Cooperative wait used between retries and pages.
#[async_trait]
pub trait Sleeper: Send + Sync + 'static {
    async fn sleep(&self, duration: Duration);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Bounded retry policy for 429 responses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt; `0` fails on the first 429.
    pub max_retries: u32,
    /// Delay used when Discord does not say how long to wait, doubled per retry.
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 8,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    pub fn with_max_retries(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Self::default()
        }
    }

    /// Exponential backoff for the zero-based `retry`, capped at `max_backoff`.
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.min(31));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

/// What a 403 response means to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Forbidden {
    /// Treat it like any other error status.
    Fail,
    /// The resource is off-limits to the bot; return `Ok(None)`.
    Skip,
}

#[derive(Deserialize)]
struct RateLimitBody {
    retry_after: Option<f64>,
}

fn seconds(raw: f64) -> Option<Duration> {
    if !raw.is_finite() {
        return None;
    }
    Duration::try_from_secs_f64(raw.clamp(0.0, MAX_SERVER_DELAY_SECS)).ok()
}

fn retry_after_header(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<f64>().ok())
        .and_then(seconds)
}

fn truncate(mut body: String) -> String {
    if let Some((index, _)) = body.char_indices().nth(MAX_ERROR_BODY) {
        body.truncate(index);
    }
    body
}

/// Thin Discord REST client authenticated with a bot token.
///
/// Every call goes through [`DiscordClient::request`], which transparently
/// waits out 429 responses (server-specified delay first, exponential backoff
/// otherwise) up to [`RetryPolicy::max_retries`] times.
#[derive(Clone)]
pub struct DiscordClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
    retry: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
}

impl DiscordClient {
    pub fn new(base_url: &str, token: &str, retry: RetryPolicy) -> Result<Self, DiscordError> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            retry,
            sleeper: Arc::new(TokioSleeper),
        })
    }

    /// Replace the sleeper, e.g. with one that records waits in tests.
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    pub(crate) async fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            self.sleeper.sleep(duration).await;
        }
    }

    pub async fn get_json(
        &self,
        path: &str,
        query: &[(&str, String)],
        forbidden: Forbidden,
    ) -> Result<Option<Value>, DiscordError> {
        self.request(Method::GET, path, query, None, forbidden).await
    }

    pub async fn post_json(
        &self,
        path: &str,
        body: &Value,
        forbidden: Forbidden,
    ) -> Result<Option<Value>, DiscordError> {
        self.request(Method::POST, path, &[], Some(body), forbidden)
            .await
    }

    /// Issue one logical request, retrying on 429.
    ///
    /// Returns `Ok(None)` only for a 403 when `forbidden` is [`Forbidden::Skip`].
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&Value>,
        forbidden: Forbidden,
    ) -> Result<Option<Value>, DiscordError> {
        let url = format!("{}{}", self.base_url, path);
        let mut retries = 0u32;
        loop {
            let mut builder = self
                .http
                .request(method.clone(), &url)
                .header(AUTHORIZATION, format!("Bot {}", self.token))
                .header(
                    USER_AGENT,
                    concat!("DiscordBot (guildpulse, ", env!("CARGO_PKG_VERSION"), ")"),
                )
                .query(query);
            if let Some(body) = body {
                builder = builder.json(body);
            }
            let response = builder.send().await?;
            let status = response.status();

            if status == StatusCode::TOO_MANY_REQUESTS {
                if retries >= self.retry.max_retries {
                    return Err(DiscordError::RateLimited {
                        path: path.to_string(),
                        attempts: retries + 1,
                    });
                }
                let header_delay = retry_after_header(response.headers());
                let body_delay = response
                    .json::<RateLimitBody>()
                    .await
                    .ok()
                    .and_then(|b| b.retry_after)
                    .and_then(seconds);
                let delay = body_delay
                    .or(header_delay)
                    .unwrap_or_else(|| self.retry.backoff(retries));
                warn!(
                    path,
                    retry = retries + 1,
                    delay_ms = delay.as_millis() as u64,
                    "Discord rate limit hit, waiting before retry"
                );
                self.sleeper.sleep(delay).await;
                retries += 1;
                continue;
            }

            if status == StatusCode::FORBIDDEN && forbidden == Forbidden::Skip {
                debug!(path, "Discord resource forbidden, skipping");
                return Ok(None);
            }

            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(DiscordError::RemoteApi {
                    status: status.as_u16(),
                    path: path.to_string(),
                    body: truncate(body),
                });
            }

            return Ok(Some(response.json::<Value>().await?));
        }
    }
}
