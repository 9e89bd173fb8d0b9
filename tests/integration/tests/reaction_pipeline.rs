use std::{path::Path, sync::Arc, time::Duration};

use async_trait::async_trait;
use hashreact_core::{
    MessageEvent, ReactionAttachReceipt, ReactionDeliveryError, ReactionTransport, Snowflake,
};
use hashreact_discord::{
    discover_watched_channels, run_discord_ingress, ChannelWatch, DiscordApiConfig, DiscordClient,
    DiscordPoller, DiscordReactionOutbound, DiscordReactionOutboundConfig, ReactionOutboundMode,
};
use hashreact_reactions::{reaction_index, ReactionSource};
use hashreact_runtime::{initialize, PolicySource, RunSummary, StartupConfig};
use httpmock::prelude::*;
use tempfile::TempDir;
use tokio::sync::{mpsc, oneshot, Mutex as AsyncMutex};

struct ScriptedTransport {
    failing_symbol: Option<&'static str>,
    attachments: AsyncMutex<Vec<(u64, u64, String)>>,
}

impl ScriptedTransport {
    fn new(failing_symbol: Option<&'static str>) -> Self {
        Self {
            failing_symbol,
            attachments: AsyncMutex::new(Vec::new()),
        }
    }

    async fn attachments(&self) -> Vec<(u64, u64, String)> {
        self.attachments.lock().await.clone()
    }
}

#[async_trait]
impl ReactionTransport for ScriptedTransport {
    async fn attach_reaction(
        &self,
        channel_id: Snowflake,
        message_id: Snowflake,
        symbol: &str,
    ) -> Result<ReactionAttachReceipt, ReactionDeliveryError> {
        self.attachments
            .lock()
            .await
            .push((channel_id.get(), message_id.get(), symbol.to_string()));
        if self.failing_symbol == Some(symbol) {
            return Err(ReactionDeliveryError::new(
                "delivery_request_rejected",
                "scripted rejection",
            ));
        }
        Ok(ReactionAttachReceipt {
            mode: "scripted".to_string(),
            endpoint: String::new(),
            http_status: None,
        })
    }
}

struct Workspace {
    dir: TempDir,
}

impl Workspace {
    fn new(policy: &str, reactions: &str) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("config.json"), policy).expect("write policy");
        std::fs::write(dir.path().join("reactions.json"), reactions).expect("write reactions");
        Self { dir }
    }

    fn path(&self, name: &str) -> std::path::PathBuf {
        self.dir.path().join(name)
    }

    fn startup_config(&self) -> StartupConfig {
        startup_config(&self.path("config.json"), &self.path("reactions.json"))
    }
}

fn startup_config(policy: &Path, reactions: &Path) -> StartupConfig {
    StartupConfig {
        policy: PolicySource::File(policy.to_path_buf()),
        reactions: ReactionSource::File(reactions.to_path_buf()),
        reactions_fetch_timeout: Duration::from_secs(1),
    }
}

fn event(scope: Option<u64>, channel: u64, actor: u64, message: u64) -> MessageEvent {
    MessageEvent {
        message_id: Snowflake::new(message),
        scope_id: scope.map(Snowflake::new),
        channel_id: Snowflake::new(channel),
        actor_id: Snowflake::new(actor),
    }
}

const POLICY: &str = r#"{
    "channels": ["100"],
    "guilds": [{"guild_id": 1, "blacklist": ["200"]}],
    "ignored_users": [9]
}"#;

const REACTIONS: &str = r#"{"reactions": [["A", "B", "C"], ["D"], ["E", "F"]]}"#;

#[tokio::test]
async fn integration_policy_and_selection_drive_attachments() {
    let workspace = Workspace::new(POLICY, REACTIONS);
    let transport = Arc::new(ScriptedTransport::new(Some("B")));
    let ready = initialize(&workspace.startup_config(), transport.clone())
        .await
        .expect("initialize");

    let monitored = [
        event(Some(1), 300, 5, 175_928_847_299_117_063),
        event(Some(2), 100, 5, 42),
        event(None, 100, 6, 1),
    ];
    let skipped = [
        event(Some(1), 100, 9, 7),
        event(Some(1), 200, 5, 8),
        event(Some(2), 300, 5, 9),
        event(None, 300, 5, 10),
    ];
    let (sender, receiver) = mpsc::channel(16);
    for candidate in monitored.iter().chain(skipped.iter()) {
        sender.send(*candidate).await.expect("send");
    }
    drop(sender);
    let summary = ready.run(receiver).await;

    let pool_len = std::num::NonZeroUsize::new(3).expect("non-zero");
    let sets: [&[&str]; 3] = [&["A", "B", "C"], &["D"], &["E", "F"]];
    let mut expected_attempts = 0usize;
    let mut expected_failures = 0usize;
    for candidate in &monitored {
        let set = sets[reaction_index(candidate.message_id, pool_len)];
        expected_attempts += set.len();
        expected_failures += set.iter().filter(|symbol| **symbol == "B").count();
    }
    assert_eq!(
        summary,
        RunSummary {
            events_received: 7,
            processed: 3,
            skipped: 4,
            reactions_attached: expected_attempts - expected_failures,
            reactions_failed: expected_failures,
            task_failures: 0,
        }
    );

    let attachments = transport.attachments().await;
    assert_eq!(attachments.len(), expected_attempts);
    for candidate in &monitored {
        let set = sets[reaction_index(candidate.message_id, pool_len)];
        let attached: Vec<&str> = attachments
            .iter()
            .filter(|(_, message, _)| *message == candidate.message_id.get())
            .map(|(channel, _, symbol)| {
                assert_eq!(*channel, candidate.channel_id.get());
                symbol.as_str()
            })
            .collect();
        assert_eq!(attached, set);
    }
}

#[tokio::test]
async fn integration_missing_reactions_file_suppresses_all_attachments() {
    let workspace = Workspace::new(POLICY, REACTIONS);
    let transport = Arc::new(ScriptedTransport::new(None));
    let ready = initialize(
        &startup_config(
            &workspace.path("config.json"),
            &workspace.path("missing-reactions.json"),
        ),
        transport.clone(),
    )
    .await
    .expect("missing reactions are not fatal");
    assert!(!ready.pool_state().is_available());

    let (sender, receiver) = mpsc::channel(4);
    sender
        .send(event(Some(1), 300, 5, 11))
        .await
        .expect("send");
    sender.send(event(Some(2), 100, 5, 12)).await.expect("send");
    drop(sender);
    let summary = ready.run(receiver).await;
    assert_eq!(summary.events_received, 2);
    assert_eq!(summary.skipped, 2);
    assert!(transport.attachments().await.is_empty());
}

#[tokio::test]
async fn integration_unparseable_policy_is_fatal() {
    let workspace = Workspace::new(r#"{"channels": "not-a-list"}"#, REACTIONS);
    let transport = Arc::new(ScriptedTransport::new(None));
    let result = initialize(&workspace.startup_config(), transport).await;
    assert!(result.is_err());
}

fn discord_client(server: &MockServer) -> DiscordClient {
    DiscordClient::new(DiscordApiConfig {
        api_base: server.base_url(),
        bot_token: "integration-token".to_string(),
        http_timeout_ms: 2_000,
        retry_max_attempts: 1,
        retry_base_delay_ms: 0,
    })
    .expect("discord client")
}

#[tokio::test]
async fn integration_discord_poll_to_reaction_put() {
    let server = MockServer::start();
    let channels = server.mock(|when, then| {
        when.method(GET).path("/guilds/1/channels");
        then.status(200).header("content-type", "application/json").body(
            r#"[
                {"id": "10", "type": 0, "guild_id": "1", "name": "general"},
                {"id": "11", "type": 4, "guild_id": "1", "name": "category"},
                {"id": "12", "type": 0, "guild_id": "1", "name": "muted"}
            ]"#,
        );
    });
    let baseline = server.mock(|when, then| {
        when.method(GET)
            .path("/channels/10/messages")
            .query_param("limit", "1");
        then.status(200).header("content-type", "application/json").body(
            r#"[{"id": "500", "channel_id": "10", "author": {"id": "7", "username": "old"}}]"#,
        );
    });
    let fresh = server.mock(|when, then| {
        when.method(GET)
            .path("/channels/10/messages")
            .query_param("after", "500");
        then.status(200).header("content-type", "application/json").body(
            r#"[
                {"id": "502", "channel_id": "10", "author": {"id": "9", "username": "ignored"}},
                {"id": "501", "channel_id": "10", "author": {"id": "7", "username": "member"}}
            ]"#,
        );
    });
    let alpha = server.mock(|when, then| {
        when.method(PUT)
            .path("/channels/10/messages/501/reactions/alpha/@me")
            .header("authorization", "Bot integration-token");
        then.status(204);
    });
    let beta = server.mock(|when, then| {
        when.method(PUT)
            .path("/channels/10/messages/501/reactions/beta/@me");
        then.status(403)
            .header("content-type", "application/json")
            .body(r#"{"message": "Missing Permissions", "code": 50013}"#);
    });

    let workspace = Workspace::new(
        r#"{"guilds": [{"guild_id": "1", "blacklist": ["12"]}], "ignored_users": ["9"]}"#,
        r#"{"reactions": [["alpha", "beta"]]}"#,
    );
    let outbound = DiscordReactionOutbound::new(DiscordReactionOutboundConfig {
        mode: ReactionOutboundMode::Provider,
        api_base: server.base_url(),
        bot_token: Some("integration-token".to_string()),
        http_timeout_ms: 2_000,
    })
    .expect("outbound");
    let ready = initialize(&workspace.startup_config(), Arc::new(outbound))
        .await
        .expect("initialize");

    let client = discord_client(&server);
    let watches = discover_watched_channels(&client, ready.policy()).await;
    assert_eq!(
        watches,
        vec![ChannelWatch {
            channel_id: Snowflake::new(10),
            guild_id: Some(Snowflake::new(1)),
        }]
    );
    channels.assert();

    let mut poller = DiscordPoller::new(client, watches);
    let (sender, receiver) = mpsc::channel(8);
    let first = poller.poll_cycle(&sender).await.expect("baseline cycle");
    assert_eq!(first.baselines_recorded, 1);
    assert_eq!(first.events_emitted, 0);
    let second = poller.poll_cycle(&sender).await.expect("second cycle");
    assert_eq!(second.events_emitted, 2);
    drop(sender);
    drop(poller);

    let summary = ready.run(receiver).await;
    assert_eq!(summary.events_received, 2);
    assert_eq!(summary.processed, 1);
    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.reactions_attached, 1);
    assert_eq!(summary.reactions_failed, 1);
    baseline.assert();
    fresh.assert();
    alpha.assert();
    beta.assert();
}

#[tokio::test]
async fn integration_shutdown_closes_stream_and_ends_run() {
    let server = MockServer::start();
    let workspace = Workspace::new(POLICY, REACTIONS);
    let transport = Arc::new(ScriptedTransport::new(None));
    let ready = initialize(&workspace.startup_config(), transport.clone())
        .await
        .expect("initialize");

    let poller = DiscordPoller::new(discord_client(&server), Vec::new());
    let (sender, receiver) = mpsc::channel(4);
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let ingress = tokio::spawn(run_discord_ingress(
        poller,
        sender,
        Duration::from_millis(10),
        Duration::from_secs(60),
        async move {
            let _ = shutdown_rx.await;
        },
    ));
    shutdown_tx.send(()).expect("signal shutdown");

    let summary = tokio::time::timeout(Duration::from_secs(5), ready.run(receiver))
        .await
        .expect("run finishes after shutdown");
    ingress.await.expect("ingress task");
    assert_eq!(summary, RunSummary::default());
    assert!(transport.attachments().await.is_empty());
}
