//! Monitoring policy for hashreact.
//!
//! Decides whether a message is annotated at all, from a flat two-level
//! configuration: platform-wide channels, per-guild blacklists, and ignored
//! users. The evaluation is pure; loading happens once at startup.

pub mod monitoring_policy;

pub use monitoring_policy::*;
