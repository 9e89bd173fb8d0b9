use std::sync::Arc;

use hashreact_core::{current_unix_timestamp_ms, MessageEvent, ReactionTransport};
use hashreact_policy::MonitoringPolicy;
use hashreact_reactions::{select_reaction, PoolState};
use tracing::{debug, error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    SkippedPoolUnavailable,
    SkippedByPolicy {
        reason_code: &'static str,
    },
    Processed {
        set_index: usize,
        attempted: usize,
        attached: usize,
        failed: usize,
    },
}

/// Per-message orchestration: pool check, policy gate, selection, then one
/// attachment per symbol in order. Cheap to clone; all state is shared and
/// read-only.
#[derive(Clone)]
pub struct MessageDispatcher {
    pool: Arc<PoolState>,
    policy: Arc<MonitoringPolicy>,
    transport: Arc<dyn ReactionTransport>,
}

impl std::fmt::Debug for MessageDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageDispatcher")
            .field("pool", &self.pool.as_str())
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl MessageDispatcher {
    pub fn new(
        pool: PoolState,
        policy: MonitoringPolicy,
        transport: Arc<dyn ReactionTransport>,
    ) -> Self {
        Self {
            pool: Arc::new(pool),
            policy: Arc::new(policy),
            transport,
        }
    }

    pub fn pool_state(&self) -> &PoolState {
        &self.pool
    }

    pub fn policy(&self) -> &MonitoringPolicy {
        &self.policy
    }

    pub async fn on_message(&self, event: MessageEvent) -> DispatchOutcome {
        let Some(pool) = self.pool.pool() else {
            debug!(
                message_id = %event.message_id,
                "skipping message; reaction pool unavailable"
            );
            return DispatchOutcome::SkippedPoolUnavailable;
        };

        let decision = self.policy.evaluate_event(&event);
        if !decision.is_monitored() {
            debug!(
                message_id = %event.message_id,
                channel_id = %event.channel_id,
                actor_id = %event.actor_id,
                reason_code = decision.reason_code(),
                "skipping message"
            );
            return DispatchOutcome::SkippedByPolicy {
                reason_code: decision.reason_code(),
            };
        }

        let selection = select_reaction(event.message_id, pool);
        info!(
            message_id = %event.message_id,
            channel_id = %event.channel_id,
            scope_id = ?event.scope_id,
            actor_id = %event.actor_id,
            reason_code = decision.reason_code(),
            reaction_set_index = selection.index,
            symbols = selection.set.len(),
            message_age_ms = event.age_ms(current_unix_timestamp_ms()),
            "processing message"
        );

        let mut attached = 0usize;
        let mut failed = 0usize;
        for symbol in selection.set.symbols() {
            match self
                .transport
                .attach_reaction(event.channel_id, event.message_id, symbol)
                .await
            {
                Ok(receipt) => {
                    attached = attached.saturating_add(1);
                    debug!(
                        message_id = %event.message_id,
                        symbol = symbol.as_str(),
                        mode = receipt.mode.as_str(),
                        http_status = receipt.http_status.unwrap_or_default(),
                        "added reaction"
                    );
                }
                Err(delivery_error) => {
                    failed = failed.saturating_add(1);
                    error!(
                        message_id = %event.message_id,
                        channel_id = %event.channel_id,
                        symbol = symbol.as_str(),
                        reason_code = delivery_error.reason_code.as_str(),
                        http_status = delivery_error.http_status.unwrap_or_default(),
                        detail = delivery_error.detail.as_str(),
                        "failed to add reaction"
                    );
                }
            }
        }

        DispatchOutcome::Processed {
            set_index: selection.index,
            attempted: selection.set.len(),
            attached,
            failed,
        }
    }
}
