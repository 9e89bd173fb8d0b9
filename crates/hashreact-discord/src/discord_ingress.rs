//! Polling ingress: turns new Discord channel messages into `MessageEvent`s.
//!
//! Channels to watch are derived from the monitoring policy and rediscovered
//! periodically, so channels and threads created after startup are picked up.
//! The first poll of each channel only records the newest message id, so
//! history that predates the channel being watched is never annotated. Later
//! polls request messages `after` that cursor and emit them in ascending id
//! order.

use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;

use hashreact_core::{MessageEvent, Snowflake};
use hashreact_policy::MonitoringPolicy;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::discord_api::{
    DiscordApiErrorCode, DiscordChannel, DiscordClient, DiscordMessage, MAX_POLL_BATCH_SIZE,
};

pub const DEFAULT_POLL_INTERVAL_MS: u64 = 2_000;
pub const DEFAULT_CHANNEL_REFRESH_INTERVAL_MS: u64 = 60_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ChannelWatch {
    pub channel_id: Snowflake,
    pub guild_id: Option<Snowflake>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollCycleSummary {
    pub channels_polled: usize,
    pub baselines_recorded: usize,
    pub events_emitted: usize,
    pub channel_failures: usize,
    pub channels_dropped: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WatchRefreshSummary {
    pub discovered: usize,
    pub added: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("message event stream closed")]
pub struct IngressClosed;

#[derive(Debug, Clone, Copy, Default)]
struct ChannelCursor {
    primed: bool,
    last_seen: Option<Snowflake>,
}

/// Resolves the channels worth polling: message-bearing guild channels and
/// active threads the policy would monitor, plus the global channels (looked
/// up individually to learn their guild). Lookup failures are logged and the
/// affected guild or channel is skipped.
pub async fn discover_watched_channels(
    client: &DiscordClient,
    policy: &MonitoringPolicy,
) -> Vec<ChannelWatch> {
    let mut watches: BTreeMap<Snowflake, ChannelWatch> = BTreeMap::new();
    for guild_id in policy.scope_ids() {
        match client.guild_channels(guild_id).await {
            Ok(channels) => insert_guild_watches(&mut watches, policy, guild_id, channels),
            Err(error) => {
                warn!(
                    guild_id = %guild_id,
                    error = %error,
                    "failed to list guild channels; guild will not be watched"
                );
                continue;
            }
        }
        match client.active_guild_threads(guild_id).await {
            Ok(threads) => insert_guild_watches(&mut watches, policy, guild_id, threads),
            Err(error) => {
                warn!(
                    guild_id = %guild_id,
                    error = %error,
                    "failed to list active threads; threads of this guild will not be watched"
                );
            }
        }
    }
    for channel_id in policy.global_channels() {
        if watches.contains_key(&channel_id) {
            continue;
        }
        match client.channel(channel_id).await {
            Ok(channel) => {
                watches.insert(
                    channel_id,
                    ChannelWatch {
                        channel_id,
                        guild_id: channel.guild_id,
                    },
                );
            }
            Err(error) => {
                warn!(
                    channel_id = %channel_id,
                    error = %error,
                    "failed to resolve global channel; channel will not be watched"
                );
            }
        }
    }
    debug!(watched_channels = watches.len(), "discord channel discovery finished");
    watches.into_values().collect()
}

fn insert_guild_watches(
    watches: &mut BTreeMap<Snowflake, ChannelWatch>,
    policy: &MonitoringPolicy,
    guild_id: Snowflake,
    channels: Vec<DiscordChannel>,
) {
    for channel in channels {
        if !channel.carries_messages() {
            continue;
        }
        if !policy
            .evaluate(Some(guild_id), channel.id, None)
            .is_monitored()
        {
            continue;
        }
        watches.insert(
            channel.id,
            ChannelWatch {
                channel_id: channel.id,
                guild_id: Some(guild_id),
            },
        );
    }
}

#[derive(Debug)]
pub struct DiscordPoller {
    client: DiscordClient,
    watches: Vec<ChannelWatch>,
    cursors: BTreeMap<Snowflake, ChannelCursor>,
    policy: Option<MonitoringPolicy>,
}

impl DiscordPoller {
    pub fn new(client: DiscordClient, mut watches: Vec<ChannelWatch>) -> Self {
        watches.sort();
        watches.dedup_by_key(|watch| watch.channel_id);
        Self {
            client,
            watches,
            cursors: BTreeMap::new(),
            policy: None,
        }
    }

    /// Enables `refresh_watches`, which rediscovers channels from `policy`.
    pub fn with_policy(mut self, policy: MonitoringPolicy) -> Self {
        self.policy = Some(policy);
        self
    }

    pub fn watches(&self) -> &[ChannelWatch] {
        &self.watches
    }

    /// Reruns discovery and starts watching channels that were not watched
    /// yet. Existing watches and their cursors are untouched; a new channel
    /// gets a baseline on its first poll like any other.
    pub async fn refresh_watches(&mut self) -> WatchRefreshSummary {
        let Some(policy) = self.policy.as_ref() else {
            return WatchRefreshSummary::default();
        };
        let discovered = discover_watched_channels(&self.client, policy).await;
        let summary = WatchRefreshSummary {
            discovered: discovered.len(),
            added: self.merge_watches(discovered),
        };
        if summary.added > 0 {
            info!(
                added = summary.added,
                watched_channels = self.watches.len(),
                "watching newly discovered discord channels"
            );
        }
        summary
    }

    /// Adds watches for unknown channel ids and returns how many were added.
    pub fn merge_watches(&mut self, discovered: Vec<ChannelWatch>) -> usize {
        let mut added = 0usize;
        for watch in discovered {
            if self
                .watches
                .iter()
                .any(|existing| existing.channel_id == watch.channel_id)
            {
                continue;
            }
            debug!(channel_id = %watch.channel_id, "watching discord channel");
            self.watches.push(watch);
            added = added.saturating_add(1);
        }
        self.watches.sort();
        added
    }

    fn drop_watch(&mut self, channel_id: Snowflake) {
        self.watches.retain(|watch| watch.channel_id != channel_id);
        self.cursors.remove(&channel_id);
    }

    /// Polls every watched channel once. Fails only when the event receiver
    /// has gone away. A channel that no longer exists is dropped; a later
    /// refresh re-adds it if discovery still lists it.
    pub async fn poll_cycle(
        &mut self,
        events: &mpsc::Sender<MessageEvent>,
    ) -> Result<PollCycleSummary, IngressClosed> {
        let mut summary = PollCycleSummary::default();
        for watch in self.watches.clone() {
            summary.channels_polled = summary.channels_polled.saturating_add(1);
            let cursor = self
                .cursors
                .get(&watch.channel_id)
                .copied()
                .unwrap_or_default();
            let limit = if cursor.primed { MAX_POLL_BATCH_SIZE } else { 1 };
            let after = if cursor.primed { cursor.last_seen } else { None };
            let mut messages = match self
                .client
                .channel_messages(watch.channel_id, after, limit)
                .await
            {
                Ok(messages) => messages,
                Err(error) => {
                    summary.channel_failures = summary.channel_failures.saturating_add(1);
                    if error.code == DiscordApiErrorCode::NotFound {
                        warn!(
                            channel_id = %watch.channel_id,
                            error = %error,
                            "discord channel no longer exists; no longer watching it"
                        );
                        self.drop_watch(watch.channel_id);
                        summary.channels_dropped = summary.channels_dropped.saturating_add(1);
                    } else {
                        warn!(
                            channel_id = %watch.channel_id,
                            error = %error,
                            "discord channel poll failed"
                        );
                    }
                    continue;
                }
            };
            messages.sort_by_key(|message| message.id);

            if !cursor.primed {
                let last_seen = messages.last().map(|message| message.id);
                self.cursors.insert(
                    watch.channel_id,
                    ChannelCursor {
                        primed: true,
                        last_seen,
                    },
                );
                summary.baselines_recorded = summary.baselines_recorded.saturating_add(1);
                continue;
            }

            let mut last_seen = cursor.last_seen;
            for message in messages {
                if last_seen.is_some_and(|seen| message.id <= seen) {
                    continue;
                }
                let event = message_event_for(&watch, &message);
                events.send(event).await.map_err(|_| IngressClosed)?;
                last_seen = Some(message.id);
                summary.events_emitted = summary.events_emitted.saturating_add(1);
            }
            self.cursors.insert(
                watch.channel_id,
                ChannelCursor {
                    primed: true,
                    last_seen,
                },
            );
        }
        Ok(summary)
    }
}

fn message_event_for(watch: &ChannelWatch, message: &DiscordMessage) -> MessageEvent {
    MessageEvent {
        message_id: message.id,
        scope_id: watch.guild_id.or(message.guild_id),
        channel_id: watch.channel_id,
        actor_id: message.author.id,
    }
}

/// Polls every `poll_interval` and rediscovers channels every
/// `channel_refresh_interval` until `shutdown` resolves or the event receiver
/// is dropped. Dropping the poller on return closes the event stream for the
/// dispatcher.
pub async fn run_discord_ingress<F>(
    mut poller: DiscordPoller,
    events: mpsc::Sender<MessageEvent>,
    poll_interval: Duration,
    channel_refresh_interval: Duration,
    shutdown: F,
) where
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);
    let mut ticker = tokio::time::interval(poll_interval.max(Duration::from_millis(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let refresh_period = channel_refresh_interval.max(Duration::from_millis(1));
    let mut refresh = tokio::time::interval_at(Instant::now() + refresh_period, refresh_period);
    refresh.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!(
        watched_channels = poller.watches().len(),
        poll_interval_ms = u64::try_from(poll_interval.as_millis()).unwrap_or(u64::MAX),
        channel_refresh_interval_ms =
            u64::try_from(channel_refresh_interval.as_millis()).unwrap_or(u64::MAX),
        "discord ingress started"
    );
    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("discord ingress stopping on shutdown signal");
                return;
            }
            _ = refresh.tick() => {
                let summary = poller.refresh_watches().await;
                debug!(
                    discovered = summary.discovered,
                    added = summary.added,
                    "discord channel refresh finished"
                );
            }
            _ = ticker.tick() => {
                match poller.poll_cycle(&events).await {
                    Ok(summary) => {
                        if summary.events_emitted > 0 || summary.channel_failures > 0 {
                            debug!(
                                channels_polled = summary.channels_polled,
                                events_emitted = summary.events_emitted,
                                channel_failures = summary.channel_failures,
                                channels_dropped = summary.channels_dropped,
                                "discord poll cycle finished"
                            );
                        }
                    }
                    Err(IngressClosed) => {
                        info!("discord ingress stopping; event stream closed");
                        return;
                    }
                }
            }
        }
    }
}
