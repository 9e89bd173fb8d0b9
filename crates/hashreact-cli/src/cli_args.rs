use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use hashreact_core::Snowflake;
use hashreact_discord::{
    ReactionOutboundMode, DEFAULT_CHANNEL_REFRESH_INTERVAL_MS, DEFAULT_DISCORD_API_BASE,
    DEFAULT_POLL_INTERVAL_MS,
};
use hashreact_reactions::{
    ReactionSource, DEFAULT_REACTIONS_FETCH_TIMEOUT_MS, DEFAULT_REACTIONS_FILE_NAME,
};

fn parse_positive_usize(value: &str) -> Result<usize, String> {
    let parsed = value
        .parse::<usize>()
        .map_err(|error| format!("failed to parse integer: {error}"))?;
    if parsed == 0 {
        return Err("value must be greater than 0".to_string());
    }
    Ok(parsed)
}

fn parse_positive_u64(value: &str) -> Result<u64, String> {
    let parsed = value
        .parse::<u64>()
        .map_err(|error| format!("failed to parse integer: {error}"))?;
    if parsed == 0 {
        return Err("value must be greater than 0".to_string());
    }
    Ok(parsed)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CliReactionOutboundMode {
    DryRun,
    Provider,
}

impl From<CliReactionOutboundMode> for ReactionOutboundMode {
    fn from(value: CliReactionOutboundMode) -> Self {
        match value {
            CliReactionOutboundMode::DryRun => ReactionOutboundMode::DryRun,
            CliReactionOutboundMode::Provider => ReactionOutboundMode::Provider,
        }
    }
}

#[derive(Debug, Parser)]
#[command(
    name = "hashreact",
    about = "Discord bot that annotates messages with a hash-selected reaction set",
    version
)]
pub(crate) struct Cli {
    #[arg(
        long = "discord-bot-token",
        env = "HASHREACT_DISCORD_BOT_TOKEN",
        hide_env_values = true,
        help = "Discord bot token; prompted for interactively when absent"
    )]
    pub(crate) discord_bot_token: Option<String>,

    #[arg(
        long = "policy-file",
        env = "HASHREACT_POLICY_FILE",
        conflicts_with = "guild_id",
        help = "Monitoring policy JSON; defaults to ./config.json when it exists and no --guild-id is given"
    )]
    pub(crate) policy_file: Option<PathBuf>,

    #[arg(
        long = "guild-id",
        env = "HASHREACT_GUILD_ID",
        help = "Monitor every channel of a single guild instead of loading a policy file"
    )]
    pub(crate) guild_id: Option<Snowflake>,

    #[arg(
        long = "reactions-source",
        env = "HASHREACT_REACTIONS_SOURCE",
        default_value = DEFAULT_REACTIONS_FILE_NAME,
        help = "Reaction pool document: local path or http(s) URL"
    )]
    pub(crate) reactions_source: ReactionSource,

    #[arg(
        long = "reactions-fetch-timeout-ms",
        env = "HASHREACT_REACTIONS_FETCH_TIMEOUT_MS",
        default_value_t = DEFAULT_REACTIONS_FETCH_TIMEOUT_MS,
        value_parser = parse_positive_u64,
        help = "Timeout for fetching a remote reaction pool document"
    )]
    pub(crate) reactions_fetch_timeout_ms: u64,

    #[arg(
        long = "discord-api-base",
        env = "HASHREACT_DISCORD_API_BASE",
        default_value = DEFAULT_DISCORD_API_BASE,
        help = "Discord REST API base URL"
    )]
    pub(crate) discord_api_base: String,

    #[arg(
        long = "outbound-mode",
        env = "HASHREACT_OUTBOUND_MODE",
        value_enum,
        default_value_t = CliReactionOutboundMode::Provider,
        help = "Reaction delivery mode (provider, dry-run)"
    )]
    pub(crate) outbound_mode: CliReactionOutboundMode,

    #[arg(
        long = "poll-interval-ms",
        env = "HASHREACT_POLL_INTERVAL_MS",
        default_value_t = DEFAULT_POLL_INTERVAL_MS,
        value_parser = parse_positive_u64,
        help = "Delay between polls of the watched channels"
    )]
    pub(crate) poll_interval_ms: u64,

    #[arg(
        long = "channel-refresh-interval-ms",
        env = "HASHREACT_CHANNEL_REFRESH_INTERVAL_MS",
        default_value_t = DEFAULT_CHANNEL_REFRESH_INTERVAL_MS,
        value_parser = parse_positive_u64,
        help = "Delay between rediscoveries of guild channels and active threads"
    )]
    pub(crate) channel_refresh_interval_ms: u64,

    #[arg(
        long = "http-timeout-ms",
        env = "HASHREACT_HTTP_TIMEOUT_MS",
        default_value_t = 5_000,
        value_parser = parse_positive_u64,
        help = "Per-request timeout for Discord API calls"
    )]
    pub(crate) http_timeout_ms: u64,

    #[arg(
        long = "retry-max-attempts",
        env = "HASHREACT_RETRY_MAX_ATTEMPTS",
        default_value_t = 3,
        value_parser = parse_positive_usize,
        help = "Maximum attempts for retryable Discord read requests"
    )]
    pub(crate) retry_max_attempts: usize,

    #[arg(
        long = "retry-base-delay-ms",
        env = "HASHREACT_RETRY_BASE_DELAY_MS",
        default_value_t = 500,
        value_parser = parse_positive_u64,
        help = "Base delay for linear retry backoff on Discord read requests"
    )]
    pub(crate) retry_base_delay_ms: u64,
}
