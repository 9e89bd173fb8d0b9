//! Reaction outbound for Discord.
//!
//! Builds `PUT /channels/{channel}/messages/{message}/reactions/{emoji}/@me`
//! requests and classifies provider responses into stable reason codes. Each
//! call is a single attempt; the dispatcher owns failure handling.

use std::time::Duration;

use async_trait::async_trait;
use hashreact_core::{ReactionAttachReceipt, ReactionDeliveryError, ReactionTransport, Snowflake};
use reqwest::{redirect::Policy, StatusCode};
use tracing::info;

use crate::discord_api::DEFAULT_DISCORD_API_BASE;

const REACTION_REASON_MISSING_EMOJI: &str = "reaction_missing_emoji";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReactionOutboundMode {
    DryRun,
    Provider,
}

impl ReactionOutboundMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::DryRun => "dry_run",
            Self::Provider => "provider",
        }
    }
}

#[derive(Debug, Clone)]
pub struct DiscordReactionOutboundConfig {
    pub mode: ReactionOutboundMode,
    pub api_base: String,
    pub bot_token: Option<String>,
    pub http_timeout_ms: u64,
}

impl Default for DiscordReactionOutboundConfig {
    fn default() -> Self {
        Self {
            mode: ReactionOutboundMode::Provider,
            api_base: DEFAULT_DISCORD_API_BASE.to_string(),
            bot_token: None,
            http_timeout_ms: 5_000,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DiscordReactionOutbound {
    config: DiscordReactionOutboundConfig,
    client: Option<reqwest::Client>,
}

impl DiscordReactionOutbound {
    pub fn new(config: DiscordReactionOutboundConfig) -> Result<Self, ReactionDeliveryError> {
        if config.mode == ReactionOutboundMode::Provider && config.http_timeout_ms == 0 {
            return Err(ReactionDeliveryError::new(
                "delivery_invalid_config",
                "discord reaction provider mode requires http timeout > 0",
            ));
        }
        let client = if config.mode == ReactionOutboundMode::Provider {
            Some(
                reqwest::Client::builder()
                    .timeout(Duration::from_millis(config.http_timeout_ms))
                    .redirect(Policy::none())
                    .build()
                    .map_err(|error| {
                        ReactionDeliveryError::new(
                            "delivery_provider_client_unavailable",
                            format!("failed to build discord reaction http client: {error}"),
                        )
                    })?,
            )
        } else {
            None
        };
        Ok(Self { config, client })
    }

    pub fn mode(&self) -> ReactionOutboundMode {
        self.config.mode
    }

    /// Endpoint for attaching `symbol` to a message as the current user.
    pub fn reaction_endpoint(
        &self,
        channel_id: Snowflake,
        message_id: Snowflake,
        symbol: &str,
    ) -> Result<String, ReactionDeliveryError> {
        let route_emoji = normalize_emoji_route_segment(symbol);
        if route_emoji.is_empty() {
            return Err(ReactionDeliveryError::new(
                REACTION_REASON_MISSING_EMOJI,
                "reaction emoji must not be empty",
            ));
        }
        Ok(format!(
            "{}/channels/{}/messages/{}/reactions/{}/@me",
            self.config.api_base.trim().trim_end_matches('/'),
            channel_id,
            message_id,
            percent_encode_path_segment(route_emoji)
        ))
    }

    async fn send_reaction(
        &self,
        endpoint: String,
    ) -> Result<ReactionAttachReceipt, ReactionDeliveryError> {
        let token = self
            .config
            .bot_token
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .ok_or_else(|| ReactionDeliveryError {
                reason_code: "delivery_missing_discord_bot_token".to_string(),
                detail: "discord reaction delivery requires a bot token".to_string(),
                retryable: false,
                endpoint: endpoint.clone(),
                http_status: None,
            })?;
        let client = self.client.as_ref().ok_or_else(|| ReactionDeliveryError {
            reason_code: "delivery_provider_client_unavailable".to_string(),
            detail: "provider mode requested without initialized HTTP client".to_string(),
            retryable: false,
            endpoint: endpoint.clone(),
            http_status: None,
        })?;
        let response = client
            .put(endpoint.as_str())
            .header("Authorization", format!("Bot {token}"))
            .body(Vec::<u8>::new())
            .send()
            .await
            .map_err(|error| ReactionDeliveryError {
                reason_code: if error.is_timeout() {
                    "delivery_timeout".to_string()
                } else {
                    "delivery_transport_error".to_string()
                },
                detail: error.to_string(),
                retryable: true,
                endpoint: endpoint.clone(),
                http_status: None,
            })?;
        let status = response.status();
        if status.is_success() {
            return Ok(ReactionAttachReceipt {
                mode: self.config.mode.as_str().to_string(),
                endpoint,
                http_status: Some(status.as_u16()),
            });
        }
        let body_raw = response.text().await.unwrap_or_default();
        let (reason_code, retryable) = classify_provider_status(status, &body_raw);
        Err(ReactionDeliveryError {
            reason_code: reason_code.to_string(),
            detail: truncate_detail(&body_raw),
            retryable,
            endpoint,
            http_status: Some(status.as_u16()),
        })
    }
}

#[async_trait]
impl ReactionTransport for DiscordReactionOutbound {
    async fn attach_reaction(
        &self,
        channel_id: Snowflake,
        message_id: Snowflake,
        symbol: &str,
    ) -> Result<ReactionAttachReceipt, ReactionDeliveryError> {
        let endpoint = self.reaction_endpoint(channel_id, message_id, symbol)?;
        match self.config.mode {
            ReactionOutboundMode::DryRun => {
                info!(
                    channel_id = %channel_id,
                    message_id = %message_id,
                    symbol,
                    endpoint = endpoint.as_str(),
                    "dry run: reaction not sent"
                );
                Ok(ReactionAttachReceipt {
                    mode: self.config.mode.as_str().to_string(),
                    endpoint,
                    http_status: None,
                })
            }
            ReactionOutboundMode::Provider => self.send_reaction(endpoint).await,
        }
    }
}

/// Accepts unicode emoji, `name:id`, `<:name:id>` and `<a:name:id>`; custom
/// emoji are reduced to the `name:id` form the reactions route expects.
pub fn normalize_emoji_route_segment(symbol: &str) -> &str {
    let trimmed = symbol.trim();
    let Some(inner) = trimmed
        .strip_prefix('<')
        .and_then(|value| value.strip_suffix('>'))
    else {
        return trimmed;
    };
    let inner = inner.strip_prefix("a:").unwrap_or(inner);
    inner.trim_start_matches(':')
}

// Discord error code 10014 is "Unknown Emoji".
fn classify_provider_status(status: StatusCode, body: &str) -> (&'static str, bool) {
    if status == StatusCode::TOO_MANY_REQUESTS {
        return ("delivery_rate_limited", true);
    }
    if status.is_server_error() {
        return ("delivery_provider_unavailable", true);
    }
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return ("delivery_permission_denied", false);
    }
    if status.is_client_error() {
        let unknown_emoji = serde_json::from_str::<serde_json::Value>(body)
            .ok()
            .and_then(|value| value.get("code").and_then(serde_json::Value::as_u64))
            == Some(10014);
        if unknown_emoji {
            return ("delivery_unknown_emoji", false);
        }
        return ("delivery_request_rejected", false);
    }
    ("delivery_unknown_http_failure", true)
}

fn percent_encode_path_segment(value: &str) -> String {
    const HEX: &[u8; 16] = b"0123456789ABCDEF";
    let mut encoded = String::with_capacity(value.len());
    for byte in value.as_bytes() {
        let is_unreserved = matches!(
            byte,
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~'
        );
        if is_unreserved {
            encoded.push(*byte as char);
        } else {
            encoded.push('%');
            encoded.push(HEX[(byte >> 4) as usize] as char);
            encoded.push(HEX[(byte & 0x0F) as usize] as char);
        }
    }
    encoded
}

fn truncate_detail(raw: &str) -> String {
    const LIMIT: usize = 512;
    let trimmed = raw.trim();
    if trimmed.chars().count() <= LIMIT {
        return trimmed.to_string();
    }
    let mut output: String = trimmed.chars().take(LIMIT).collect();
    output.push_str("...");
    output
}
