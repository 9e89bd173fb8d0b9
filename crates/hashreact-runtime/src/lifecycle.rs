use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use hashreact_core::{MessageEvent, ReactionTransport, Snowflake};
use hashreact_policy::{
    collect_overridden_blacklist_entries, load_monitoring_policy_file, MonitoringPolicy,
    PolicyLoadError,
};
use hashreact_reactions::{load_reaction_pool, PoolState, ReactionSource};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinSet};
use tracing::{info, warn};

use crate::dispatcher::{DispatchOutcome, MessageDispatcher};

/// Where the monitoring policy comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicySource {
    File(PathBuf),
    SingleScope(Snowflake),
}

#[derive(Debug, Clone)]
pub struct StartupConfig {
    pub policy: PolicySource,
    pub reactions: ReactionSource,
    pub reactions_fetch_timeout: Duration,
}

#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Policy(#[from] PolicyLoadError),
    #[error("monitoring policy {path} configures no channels and no guilds")]
    EmptyPolicy { path: PathBuf },
    #[error("discord rejected the bot token: {0}")]
    InvalidCredentials(String),
}

/// Loads the policy (fatal on failure) and the reaction pool (degrades to
/// unavailable), returning the only state from which events can be run.
pub async fn initialize(
    config: &StartupConfig,
    transport: Arc<dyn ReactionTransport>,
) -> Result<ReadyState, StartupError> {
    let policy = match &config.policy {
        PolicySource::File(path) => {
            let policy = load_monitoring_policy_file(path)?;
            if policy.is_empty() {
                return Err(StartupError::EmptyPolicy { path: path.clone() });
            }
            policy
        }
        PolicySource::SingleScope(scope_id) => MonitoringPolicy::single_scope(*scope_id),
    };
    for (scope_id, channel_id) in collect_overridden_blacklist_entries(&policy) {
        warn!(
            guild_id = %scope_id,
            channel_id = %channel_id,
            "blacklist entry has no effect; channel is globally monitored"
        );
    }
    info!(
        global_channels = policy.global_channels().count(),
        guilds = policy.scope_ids().count(),
        ignored_users = policy.ignored_actor_count(),
        "loaded monitoring policy"
    );

    let pool = load_reaction_pool(&config.reactions, config.reactions_fetch_timeout).await;
    Ok(ReadyState {
        dispatcher: MessageDispatcher::new(pool, policy, transport),
    })
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub events_received: usize,
    pub processed: usize,
    pub skipped: usize,
    pub reactions_attached: usize,
    pub reactions_failed: usize,
    pub task_failures: usize,
}

impl RunSummary {
    fn record(&mut self, result: Result<DispatchOutcome, JoinError>) {
        match result {
            Ok(DispatchOutcome::Processed {
                attached, failed, ..
            }) => {
                self.processed = self.processed.saturating_add(1);
                self.reactions_attached = self.reactions_attached.saturating_add(attached);
                self.reactions_failed = self.reactions_failed.saturating_add(failed);
            }
            Ok(DispatchOutcome::SkippedPoolUnavailable | DispatchOutcome::SkippedByPolicy { .. }) => {
                self.skipped = self.skipped.saturating_add(1);
            }
            Err(join_error) => {
                self.task_failures = self.task_failures.saturating_add(1);
                warn!(error = %join_error, "dispatch task failed");
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReadyState {
    dispatcher: MessageDispatcher,
}

impl ReadyState {
    pub fn dispatcher(&self) -> &MessageDispatcher {
        &self.dispatcher
    }

    pub fn policy(&self) -> &MonitoringPolicy {
        self.dispatcher.policy()
    }

    pub fn pool_state(&self) -> &PoolState {
        self.dispatcher.pool_state()
    }

    /// Dispatches every event on its own task until the stream closes, then
    /// waits for the in-flight tasks.
    pub async fn run(self, mut events: mpsc::Receiver<MessageEvent>) -> RunSummary {
        let mut summary = RunSummary::default();
        let mut tasks = JoinSet::new();
        while let Some(event) = events.recv().await {
            summary.events_received = summary.events_received.saturating_add(1);
            let dispatcher = self.dispatcher.clone();
            tasks.spawn(async move { dispatcher.on_message(event).await });
            while let Some(result) = tasks.try_join_next() {
                summary.record(result);
            }
        }
        while let Some(result) = tasks.join_next().await {
            summary.record(result);
        }
        info!(
            events_received = summary.events_received,
            processed = summary.processed,
            skipped = summary.skipped,
            reactions_attached = summary.reactions_attached,
            reactions_failed = summary.reactions_failed,
            task_failures = summary.task_failures,
            "event stream closed"
        );
        summary
    }
}
