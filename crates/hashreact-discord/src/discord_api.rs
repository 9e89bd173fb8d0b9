//! Minimal Discord REST client used for identity checks, channel discovery
//! and message polling.
//!
//! Reads are retried with linear backoff on transport errors, 429 and 5xx.
//! On 429 the delay is at least the `retry_after` window Discord returns.
//! Auth failures are reported immediately so startup can fail fast on a bad
//! token.

use std::time::Duration;

use hashreact_core::Snowflake;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

pub const DEFAULT_DISCORD_API_BASE: &str = "https://discord.com/api/v10";
pub const MAX_POLL_BATCH_SIZE: usize = 50;
const MAX_RETRY_AFTER_MS: u64 = 60_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscordApiErrorCode {
    MissingConfig,
    AuthFailed,
    NotFound,
    RateLimited,
    ProviderUnavailable,
    TransportError,
    ParseFailed,
}

impl DiscordApiErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::MissingConfig => "missing_config",
            Self::AuthFailed => "auth_failed",
            Self::NotFound => "not_found",
            Self::RateLimited => "rate_limited",
            Self::ProviderUnavailable => "provider_unavailable",
            Self::TransportError => "transport_error",
            Self::ParseFailed => "parse_failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("discord {} error: {message}", .code.as_str())]
pub struct DiscordApiError {
    pub code: DiscordApiErrorCode,
    pub message: String,
    pub retryable: bool,
    pub http_status: Option<u16>,
}

impl DiscordApiError {
    fn new(code: DiscordApiErrorCode, message: impl Into<String>, retryable: bool) -> Self {
        Self {
            code,
            message: message.into(),
            retryable,
            http_status: None,
        }
    }

    fn with_status(mut self, status: StatusCode) -> Self {
        self.http_status = Some(status.as_u16());
        self
    }
}

#[derive(Debug, Clone)]
pub struct DiscordApiConfig {
    pub api_base: String,
    pub bot_token: String,
    pub http_timeout_ms: u64,
    pub retry_max_attempts: usize,
    pub retry_base_delay_ms: u64,
}

impl Default for DiscordApiConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_DISCORD_API_BASE.to_string(),
            bot_token: String::new(),
            http_timeout_ms: 5_000,
            retry_max_attempts: 3,
            retry_base_delay_ms: 500,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscordUser {
    pub id: Snowflake,
    pub username: String,
    #[serde(default)]
    pub global_name: Option<String>,
    #[serde(default)]
    pub bot: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscordChannel {
    pub id: Snowflake,
    #[serde(rename = "type")]
    pub kind: u8,
    #[serde(default)]
    pub guild_id: Option<Snowflake>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub parent_id: Option<Snowflake>,
}

impl DiscordChannel {
    /// Text, voice (text-in-voice), announcement and thread channels carry
    /// messages.
    pub fn carries_messages(&self) -> bool {
        matches!(self.kind, 0 | 2 | 5) || self.is_thread()
    }

    /// Announcement, public and private threads.
    pub fn is_thread(&self) -> bool {
        matches!(self.kind, 10..=12)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
struct ActiveThreadsResponse {
    #[serde(default)]
    threads: Vec<DiscordChannel>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscordMessage {
    pub id: Snowflake,
    pub channel_id: Snowflake,
    pub author: DiscordUser,
    #[serde(default)]
    pub guild_id: Option<Snowflake>,
}

#[derive(Debug, Clone)]
pub struct DiscordClient {
    config: DiscordApiConfig,
    http: reqwest::Client,
    auth_header: String,
}

impl DiscordClient {
    pub fn new(config: DiscordApiConfig) -> Result<Self, DiscordApiError> {
        let token = config.bot_token.trim();
        if token.is_empty() {
            return Err(DiscordApiError::new(
                DiscordApiErrorCode::MissingConfig,
                "discord bot token must not be empty",
                false,
            ));
        }
        if config.api_base.trim().trim_end_matches('/').is_empty() {
            return Err(DiscordApiError::new(
                DiscordApiErrorCode::MissingConfig,
                "discord api base cannot be empty",
                false,
            ));
        }
        if config.http_timeout_ms == 0 {
            return Err(DiscordApiError::new(
                DiscordApiErrorCode::MissingConfig,
                "discord http timeout must be greater than 0",
                false,
            ));
        }
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.http_timeout_ms))
            .build()
            .map_err(|error| {
                DiscordApiError::new(
                    DiscordApiErrorCode::MissingConfig,
                    format!("failed to build discord http client: {error}"),
                    false,
                )
            })?;
        let auth_header = format!("Bot {token}");
        Ok(Self {
            config,
            http,
            auth_header,
        })
    }

    pub fn api_base(&self) -> &str {
        self.config.api_base.trim().trim_end_matches('/')
    }

    /// `GET /users/@me`; the cheapest call that proves the token works.
    pub async fn current_user(&self) -> Result<DiscordUser, DiscordApiError> {
        self.get_json("/users/@me", &[]).await
    }

    pub async fn guild_channels(
        &self,
        guild_id: Snowflake,
    ) -> Result<Vec<DiscordChannel>, DiscordApiError> {
        self.get_json(&format!("/guilds/{guild_id}/channels"), &[])
            .await
    }

    /// Active threads of a guild. `GET /guilds/{id}/channels` never lists
    /// threads.
    pub async fn active_guild_threads(
        &self,
        guild_id: Snowflake,
    ) -> Result<Vec<DiscordChannel>, DiscordApiError> {
        self.get_json::<ActiveThreadsResponse>(&format!("/guilds/{guild_id}/threads/active"), &[])
            .await
            .map(|response| response.threads)
    }

    pub async fn channel(&self, channel_id: Snowflake) -> Result<DiscordChannel, DiscordApiError> {
        self.get_json(&format!("/channels/{channel_id}"), &[]).await
    }

    /// Messages of a channel, optionally only those newer than `after`.
    /// Discord returns them newest first; callers sort as needed.
    pub async fn channel_messages(
        &self,
        channel_id: Snowflake,
        after: Option<Snowflake>,
        limit: usize,
    ) -> Result<Vec<DiscordMessage>, DiscordApiError> {
        let mut query = vec![("limit", limit.clamp(1, MAX_POLL_BATCH_SIZE).to_string())];
        if let Some(after) = after {
            query.push(("after", after.to_string()));
        }
        self.get_json(&format!("/channels/{channel_id}/messages"), &query)
            .await
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, DiscordApiError> {
        let url = format!("{}{}", self.api_base(), path);
        let value = self
            .request_json_with_retry(path, || {
                self.http
                    .get(url.as_str())
                    .query(query)
                    .header("authorization", self.auth_header.as_str())
            })
            .await?;
        serde_json::from_value::<T>(value).map_err(|error| {
            DiscordApiError::new(
                DiscordApiErrorCode::ParseFailed,
                format!("{path} response did not match the expected shape: {error}"),
                false,
            )
        })
    }

    async fn request_json_with_retry<F>(
        &self,
        path: &str,
        build_request: F,
    ) -> Result<Value, DiscordApiError>
    where
        F: Fn() -> reqwest::RequestBuilder,
    {
        let max_attempts = self.config.retry_max_attempts.max(1);
        let mut attempt = 0usize;
        loop {
            attempt = attempt.saturating_add(1);
            let response = match build_request().send().await {
                Ok(response) => response,
                Err(error) => {
                    if attempt < max_attempts {
                        debug!(path, attempt, error = %error, "retrying discord request");
                        sleep_retry_backoff(self.config.retry_base_delay_ms, attempt, None).await;
                        continue;
                    }
                    return Err(DiscordApiError::new(
                        DiscordApiErrorCode::TransportError,
                        format!("{path} transport error: {error}"),
                        true,
                    ));
                }
            };

            let status = response.status();
            if status.is_success() {
                return response.json::<Value>().await.map_err(|error| {
                    DiscordApiError::new(
                        DiscordApiErrorCode::ParseFailed,
                        format!("{path} response parse error: {error}"),
                        false,
                    )
                    .with_status(status)
                });
            }

            let code = classify_status(status);
            let retryable = matches!(
                code,
                DiscordApiErrorCode::RateLimited | DiscordApiErrorCode::ProviderUnavailable
            );
            if retryable && attempt < max_attempts {
                let retry_after_ms = if code == DiscordApiErrorCode::RateLimited {
                    rate_limit_retry_after_ms(response).await
                } else {
                    None
                };
                debug!(
                    path,
                    attempt,
                    status = status.as_u16(),
                    retry_after_ms = retry_after_ms.unwrap_or_default(),
                    "retrying discord request"
                );
                sleep_retry_backoff(self.config.retry_base_delay_ms, attempt, retry_after_ms)
                    .await;
                continue;
            }
            return Err(DiscordApiError::new(
                code,
                format!("{path} request failed with status {}", status.as_u16()),
                retryable,
            )
            .with_status(status));
        }
    }
}

fn classify_status(status: StatusCode) -> DiscordApiErrorCode {
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        DiscordApiErrorCode::AuthFailed
    } else if status == StatusCode::NOT_FOUND {
        DiscordApiErrorCode::NotFound
    } else if status == StatusCode::TOO_MANY_REQUESTS {
        DiscordApiErrorCode::RateLimited
    } else {
        DiscordApiErrorCode::ProviderUnavailable
    }
}

/// Discord reports the rate-limit window in the `Retry-After` header and in
/// the JSON body's `retry_after`, both as (possibly fractional) seconds.
async fn rate_limit_retry_after_ms(response: reqwest::Response) -> Option<u64> {
    if let Some(delay_ms) = response
        .headers()
        .get("retry-after")
        .and_then(|value| value.to_str().ok())
        .and_then(parse_retry_after_seconds_ms)
    {
        return Some(delay_ms);
    }
    let body = response.text().await.ok()?;
    let seconds = serde_json::from_str::<Value>(&body)
        .ok()?
        .get("retry_after")?
        .as_f64()?;
    seconds_to_ms(seconds)
}

fn parse_retry_after_seconds_ms(raw: &str) -> Option<u64> {
    seconds_to_ms(raw.trim().parse::<f64>().ok()?)
}

fn seconds_to_ms(seconds: f64) -> Option<u64> {
    if !seconds.is_finite() || seconds < 0.0 {
        return None;
    }
    let millis = (seconds * 1_000.0).ceil();
    Some(if millis >= MAX_RETRY_AFTER_MS as f64 {
        MAX_RETRY_AFTER_MS
    } else {
        millis as u64
    })
}

/// Linear backoff, never shorter than the server-provided `retry_after`.
fn retry_delay_ms(retry_base_delay_ms: u64, attempt: usize, retry_after_ms: Option<u64>) -> u64 {
    let backoff_ms = retry_base_delay_ms.saturating_mul(u64::try_from(attempt).unwrap_or(1));
    backoff_ms.max(retry_after_ms.unwrap_or_default())
}

async fn sleep_retry_backoff(retry_base_delay_ms: u64, attempt: usize, retry_after_ms: Option<u64>) {
    let delay_ms = retry_delay_ms(retry_base_delay_ms, attempt, retry_after_ms);
    if delay_ms == 0 {
        return;
    }
    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
}
