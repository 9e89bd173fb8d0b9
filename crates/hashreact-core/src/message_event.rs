use serde::{Deserialize, Serialize};

use crate::snowflake::Snowflake;

/// A message-arrived notification, reduced to the identifiers the agent
/// needs. `scope_id` is `None` for direct messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageEvent {
    pub message_id: Snowflake,
    #[serde(default)]
    pub scope_id: Option<Snowflake>,
    pub channel_id: Snowflake,
    pub actor_id: Snowflake,
}

impl MessageEvent {
    /// Milliseconds between the message's creation and `now_unix_ms`.
    pub fn age_ms(&self, now_unix_ms: u64) -> u64 {
        now_unix_ms.saturating_sub(self.message_id.timestamp_ms())
    }
}
