//! Discord REST transport for hashreact.
//!
//! Provides the token/identity check, channel discovery driven by the
//! monitoring policy, a polling ingress that turns new channel messages into
//! `MessageEvent`s, and the reaction outbound used by the dispatcher.

pub mod discord_api;
pub mod discord_ingress;
pub mod discord_outbound;

pub use discord_api::*;
pub use discord_ingress::*;
pub use discord_outbound::*;
