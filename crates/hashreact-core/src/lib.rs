//! Foundational types shared across hashreact crates.
//!
//! Provides the `Snowflake` identifier used for every Discord entity, the
//! transport-neutral `MessageEvent`, the `ReactionTransport` seam, and small
//! time helpers used for latency logging.

pub mod message_event;
pub mod reaction_transport;
pub mod snowflake;
pub mod time_utils;

pub use message_event::MessageEvent;
pub use reaction_transport::{ReactionAttachReceipt, ReactionDeliveryError, ReactionTransport};
pub use snowflake::{Snowflake, SnowflakeParseError, DISCORD_EPOCH_MS};
pub use time_utils::current_unix_timestamp_ms;
