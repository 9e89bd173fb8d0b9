use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use hashreact_core::{MessageEvent, Snowflake};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const MONITORING_POLICY_FILE_NAME: &str = "config.json";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
/// One `guilds[]` entry of the policy document.
pub struct GuildRuleDocument {
    pub guild_id: Snowflake,
    #[serde(default)]
    pub blacklist: Vec<Snowflake>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
/// On-disk policy document. Every field is optional and defaults to empty.
pub struct MonitoringPolicyDocument {
    #[serde(default)]
    pub channels: Vec<Snowflake>,
    #[serde(default)]
    pub guilds: Vec<GuildRuleDocument>,
    #[serde(default)]
    pub ignored_users: Vec<Snowflake>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ScopeRule {
    pub blacklist: BTreeSet<Snowflake>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
/// Immutable monitoring policy. An empty policy monitors nothing.
pub struct MonitoringPolicy {
    global_channels: BTreeSet<Snowflake>,
    scopes: BTreeMap<Snowflake, ScopeRule>,
    ignored_actors: BTreeSet<Snowflake>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyReason {
    IgnoredActor,
    GlobalChannel,
    ScopeBlacklist,
    KnownScope,
    UnknownScope,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PolicyDecision {
    Monitored { reason: PolicyReason },
    Skipped { reason: PolicyReason },
}

impl PolicyDecision {
    pub fn is_monitored(self) -> bool {
        matches!(self, Self::Monitored { .. })
    }

    pub fn reason(self) -> PolicyReason {
        match self {
            Self::Monitored { reason } | Self::Skipped { reason } => reason,
        }
    }

    pub fn as_str(self) -> &'static str {
        if self.is_monitored() {
            "monitored"
        } else {
            "skipped"
        }
    }

    /// Stable reason code for structured logs.
    pub fn reason_code(self) -> &'static str {
        match self {
            Self::Skipped {
                reason: PolicyReason::IgnoredActor,
            } => "skip_ignored_actor",
            Self::Monitored {
                reason: PolicyReason::GlobalChannel,
            } => "monitor_global_channel",
            Self::Skipped {
                reason: PolicyReason::ScopeBlacklist,
            } => "skip_scope_blacklist",
            Self::Monitored {
                reason: PolicyReason::KnownScope,
            } => "monitor_known_scope",
            Self::Skipped {
                reason: PolicyReason::UnknownScope,
            } => "skip_unknown_scope",
            Self::Monitored { .. } => "monitor_other",
            Self::Skipped { .. } => "skip_other",
        }
    }
}

#[derive(Debug, Error)]
pub enum PolicyLoadError {
    #[error("failed to read monitoring policy {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse monitoring policy {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl From<MonitoringPolicyDocument> for MonitoringPolicy {
    fn from(document: MonitoringPolicyDocument) -> Self {
        let mut scopes: BTreeMap<Snowflake, ScopeRule> = BTreeMap::new();
        for guild in document.guilds {
            scopes
                .entry(guild.guild_id)
                .or_default()
                .blacklist
                .extend(guild.blacklist);
        }
        Self {
            global_channels: document.channels.into_iter().collect(),
            scopes,
            ignored_actors: document.ignored_users.into_iter().collect(),
        }
    }
}

impl MonitoringPolicy {
    /// Policy restricted to one guild with no channel or user rules. Through
    /// the regular evaluation it monitors exactly the messages of `scope_id`.
    pub fn single_scope(scope_id: Snowflake) -> Self {
        Self {
            scopes: BTreeMap::from([(scope_id, ScopeRule::default())]),
            ..Self::default()
        }
    }

    pub fn global_channels(&self) -> impl Iterator<Item = Snowflake> + '_ {
        self.global_channels.iter().copied()
    }

    pub fn scope_ids(&self) -> impl Iterator<Item = Snowflake> + '_ {
        self.scopes.keys().copied()
    }

    pub fn scope_rule(&self, scope_id: Snowflake) -> Option<&ScopeRule> {
        self.scopes.get(&scope_id)
    }

    pub fn ignored_actor_count(&self) -> usize {
        self.ignored_actors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.global_channels.is_empty() && self.scopes.is_empty()
    }

    /// Decides whether a message is processed. Precedence is fixed: ignored
    /// actor, then global channel, then scope blacklist, then default deny for
    /// unknown scopes.
    pub fn evaluate(
        &self,
        scope_id: Option<Snowflake>,
        channel_id: Snowflake,
        actor_id: Option<Snowflake>,
    ) -> PolicyDecision {
        if actor_id.is_some_and(|actor| self.ignored_actors.contains(&actor)) {
            return PolicyDecision::Skipped {
                reason: PolicyReason::IgnoredActor,
            };
        }
        if self.global_channels.contains(&channel_id) {
            return PolicyDecision::Monitored {
                reason: PolicyReason::GlobalChannel,
            };
        }
        match scope_id.and_then(|scope| self.scopes.get(&scope)) {
            Some(rule) if rule.blacklist.contains(&channel_id) => PolicyDecision::Skipped {
                reason: PolicyReason::ScopeBlacklist,
            },
            Some(_) => PolicyDecision::Monitored {
                reason: PolicyReason::KnownScope,
            },
            None => PolicyDecision::Skipped {
                reason: PolicyReason::UnknownScope,
            },
        }
    }

    pub fn evaluate_event(&self, event: &MessageEvent) -> PolicyDecision {
        self.evaluate(event.scope_id, event.channel_id, Some(event.actor_id))
    }
}

pub fn parse_monitoring_policy(raw: &str) -> Result<MonitoringPolicy, serde_json::Error> {
    serde_json::from_str::<MonitoringPolicyDocument>(raw).map(MonitoringPolicy::from)
}

pub fn load_monitoring_policy_file(path: &Path) -> Result<MonitoringPolicy, PolicyLoadError> {
    let raw = std::fs::read_to_string(path).map_err(|source| PolicyLoadError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_monitoring_policy(&raw).map_err(|source| PolicyLoadError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Lists `(guild, channel)` blacklist entries that a global channel entry
/// overrides. Such entries never take effect.
pub fn collect_overridden_blacklist_entries(
    policy: &MonitoringPolicy,
) -> Vec<(Snowflake, Snowflake)> {
    let mut overridden = Vec::new();
    for (scope_id, rule) in &policy.scopes {
        for channel_id in rule.blacklist.intersection(&policy.global_channels) {
            overridden.push((*scope_id, *channel_id));
        }
    }
    overridden
}
