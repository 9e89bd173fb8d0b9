use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use hashreact_discord::{
    discover_watched_channels, run_discord_ingress, DiscordApiConfig, DiscordApiErrorCode,
    DiscordClient, DiscordPoller, DiscordReactionOutbound, DiscordReactionOutboundConfig,
    DiscordUser,
};
use hashreact_policy::MONITORING_POLICY_FILE_NAME;
use hashreact_runtime::{initialize, PolicySource, StartupConfig, StartupError};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::cli_args::Cli;
use crate::prompt::{
    parse_bot_token_input, parse_guild_id_input, prompt_line, BOT_TOKEN_PROMPT, GUILD_ID_PROMPT,
};

const EVENT_QUEUE_CAPACITY: usize = 256;

pub(crate) async fn run_cli(cli: Cli) -> Result<()> {
    let bot_token = match cli.discord_bot_token.as_deref() {
        Some(token) => parse_bot_token_input(token)?,
        None => parse_bot_token_input(&prompt_blocking(BOT_TOKEN_PROMPT)?)?,
    };
    let default_policy_file = Path::new(MONITORING_POLICY_FILE_NAME);
    let policy_source = match resolve_policy_source(&cli, default_policy_file) {
        Some(source) => source,
        None => PolicySource::SingleScope(parse_guild_id_input(&prompt_blocking(
            GUILD_ID_PROMPT,
        )?)?),
    };
    if let PolicySource::SingleScope(guild_id) = &policy_source {
        info!(guild_id = %guild_id, "starting for a single guild");
    }

    let client = DiscordClient::new(DiscordApiConfig {
        api_base: cli.discord_api_base.clone(),
        bot_token: bot_token.clone(),
        http_timeout_ms: cli.http_timeout_ms,
        retry_max_attempts: cli.retry_max_attempts,
        retry_base_delay_ms: cli.retry_base_delay_ms,
    })
    .context("invalid discord api configuration")?;
    let identity = verify_bot_identity(&client).await?;
    info!(
        username = identity.username.as_str(),
        user_id = %identity.id,
        bot = identity.bot,
        "logged in as {} (ID: {})",
        identity.username,
        identity.id
    );

    let outbound = DiscordReactionOutbound::new(DiscordReactionOutboundConfig {
        mode: cli.outbound_mode.into(),
        api_base: cli.discord_api_base.clone(),
        bot_token: Some(bot_token),
        http_timeout_ms: cli.http_timeout_ms,
    })
    .context("failed to configure discord reaction outbound")?;
    info!(outbound_mode = outbound.mode().as_str(), "reaction outbound ready");

    let ready = initialize(
        &StartupConfig {
            policy: policy_source,
            reactions: cli.reactions_source.clone(),
            reactions_fetch_timeout: Duration::from_millis(cli.reactions_fetch_timeout_ms),
        },
        Arc::new(outbound),
    )
    .await?;

    let watches = discover_watched_channels(&client, ready.policy()).await;
    if watches.is_empty() {
        warn!("no watched channels discovered yet; channels are rediscovered periodically");
    } else {
        info!(watched_channels = watches.len(), "discovered discord channels");
    }
    let poller = DiscordPoller::new(client, watches).with_policy(ready.policy().clone());
    let (sender, receiver) = mpsc::channel(EVENT_QUEUE_CAPACITY);
    let ingress = tokio::spawn(run_discord_ingress(
        poller,
        sender,
        Duration::from_millis(cli.poll_interval_ms),
        Duration::from_millis(cli.channel_refresh_interval_ms),
        shutdown_signal(),
    ));

    let summary = ready.run(receiver).await;
    ingress.await.context("discord ingress task failed")?;
    info!(
        events_received = summary.events_received,
        reactions_attached = summary.reactions_attached,
        "hashreact stopped"
    );
    Ok(())
}

/// Picks the policy source from the arguments. Without `--policy-file` or
/// `--guild-id`, `default_policy_file` is used when it exists; `None` means the
/// guild id has to be prompted for.
pub(crate) fn resolve_policy_source(
    cli: &Cli,
    default_policy_file: &Path,
) -> Option<PolicySource> {
    if let Some(path) = &cli.policy_file {
        return Some(PolicySource::File(path.clone()));
    }
    if let Some(guild_id) = cli.guild_id {
        return Some(PolicySource::SingleScope(guild_id));
    }
    if default_policy_file.is_file() {
        info!(
            path = %default_policy_file.display(),
            "using monitoring policy found in the working directory"
        );
        return Some(PolicySource::File(default_policy_file.to_path_buf()));
    }
    None
}

/// Proves the token works before anything else touches Discord. A rejected
/// token is a `StartupError::InvalidCredentials`.
pub(crate) async fn verify_bot_identity(client: &DiscordClient) -> Result<DiscordUser> {
    match client.current_user().await {
        Ok(user) => Ok(user),
        Err(error) if error.code == DiscordApiErrorCode::AuthFailed => {
            Err(StartupError::InvalidCredentials(error.message).into())
        }
        Err(error) => Err(error).context("failed to verify discord bot identity"),
    }
}

fn prompt_blocking(prompt: &str) -> Result<String> {
    tokio::task::block_in_place(|| prompt_line(prompt))
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("received ctrl-c; shutting down"),
        Err(error) => {
            warn!(error = %error, "failed to listen for ctrl-c; running until the stream closes");
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use clap::Parser;
    use hashreact_core::Snowflake;
    use hashreact_discord::{DiscordApiConfig, DiscordClient};
    use hashreact_policy::MONITORING_POLICY_FILE_NAME;
    use hashreact_runtime::{PolicySource, StartupError};
    use httpmock::prelude::*;
    use tempfile::tempdir;

    use super::{resolve_policy_source, verify_bot_identity};
    use crate::cli_args::Cli;

    fn client(server: &MockServer) -> DiscordClient {
        DiscordClient::new(DiscordApiConfig {
            api_base: server.base_url(),
            bot_token: "test-token".to_string(),
            http_timeout_ms: 2_000,
            retry_max_attempts: 1,
            retry_base_delay_ms: 0,
        })
        .expect("client")
    }

    #[tokio::test]
    async fn functional_identity_check_returns_bot_user() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET)
                .path("/users/@me")
                .header("authorization", "Bot test-token");
            then.status(200)
                .header("content-type", "application/json")
                .body(r#"{"id": "42", "username": "hashreact", "bot": true}"#);
        });
        let user = verify_bot_identity(&client(&server))
            .await
            .expect("identity");
        assert_eq!(user.id, Snowflake::new(42));
        assert_eq!(user.username, "hashreact");
        assert!(user.bot);
        mock.assert();
    }

    #[tokio::test]
    async fn regression_rejected_token_is_invalid_credentials() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/users/@me");
            then.status(401)
                .header("content-type", "application/json")
                .body(r#"{"message": "401: Unauthorized", "code": 0}"#);
        });
        let error = verify_bot_identity(&client(&server))
            .await
            .expect_err("rejected token");
        assert!(matches!(
            error.downcast_ref::<StartupError>(),
            Some(StartupError::InvalidCredentials(_))
        ));
    }

    #[tokio::test]
    async fn regression_provider_outage_is_not_reported_as_bad_token() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/users/@me");
            then.status(503).body("unavailable");
        });
        let error = verify_bot_identity(&client(&server))
            .await
            .expect_err("outage");
        assert!(error.downcast_ref::<StartupError>().is_none());
    }

    #[test]
    fn unit_policy_source_prefers_explicit_arguments() {
        let temp = tempdir().expect("tempdir");
        let missing_default = temp.path().join("config.json");
        let with_file = Cli::try_parse_from(["hashreact", "--policy-file", "policy.json"])
            .expect("parse");
        assert_eq!(
            resolve_policy_source(&with_file, &missing_default),
            Some(PolicySource::File(PathBuf::from("policy.json")))
        );
        let with_guild =
            Cli::try_parse_from(["hashreact", "--guild-id", "7"]).expect("parse");
        assert_eq!(
            resolve_policy_source(&with_guild, &missing_default),
            Some(PolicySource::SingleScope(Snowflake::new(7)))
        );
        let neither = Cli::try_parse_from(["hashreact"]).expect("parse");
        assert_eq!(resolve_policy_source(&neither, &missing_default), None);
    }

    #[test]
    fn functional_existing_default_policy_file_is_used_without_arguments() {
        let temp = tempdir().expect("tempdir");
        let default_policy = temp.path().join(MONITORING_POLICY_FILE_NAME);
        std::fs::write(&default_policy, r#"{"guilds": [{"guild_id": 1}]}"#).expect("write");
        let neither = Cli::try_parse_from(["hashreact"]).expect("parse");
        assert_eq!(
            resolve_policy_source(&neither, &default_policy),
            Some(PolicySource::File(default_policy.clone()))
        );
    }

    #[test]
    fn regression_guild_id_keeps_single_guild_mode_when_default_policy_exists() {
        let temp = tempdir().expect("tempdir");
        let default_policy = temp.path().join(MONITORING_POLICY_FILE_NAME);
        std::fs::write(&default_policy, r#"{"channels": [100]}"#).expect("write");
        let with_guild =
            Cli::try_parse_from(["hashreact", "--guild-id", "7"]).expect("parse");
        assert_eq!(
            resolve_policy_source(&with_guild, &default_policy),
            Some(PolicySource::SingleScope(Snowflake::new(7)))
        );
    }
}
