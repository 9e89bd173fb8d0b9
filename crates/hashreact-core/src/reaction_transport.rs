//! The outbound seam between the dispatcher and a messaging platform.

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::snowflake::Snowflake;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReactionAttachReceipt {
    pub mode: String,
    pub endpoint: String,
    pub http_status: Option<u16>,
}

/// Failure of a single reaction attachment. `reason_code` is stable and meant
/// for logs; `retryable` is informational only, attachments are never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("reason_code={reason_code} retryable={retryable} endpoint={endpoint} detail={detail}")]
pub struct ReactionDeliveryError {
    pub reason_code: String,
    pub detail: String,
    pub retryable: bool,
    pub endpoint: String,
    pub http_status: Option<u16>,
}

impl ReactionDeliveryError {
    pub fn new(reason_code: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            reason_code: reason_code.into(),
            detail: detail.into(),
            retryable: false,
            endpoint: String::new(),
            http_status: None,
        }
    }
}

#[async_trait]
pub trait ReactionTransport: Send + Sync {
    /// Attaches one reaction symbol to one message. Implementations apply their
    /// own request timeout; a timeout is reported as an error.
    async fn attach_reaction(
        &self,
        channel_id: Snowflake,
        message_id: Snowflake,
        symbol: &str,
    ) -> Result<ReactionAttachReceipt, ReactionDeliveryError>;
}
