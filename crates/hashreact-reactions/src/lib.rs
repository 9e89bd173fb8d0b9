//! Reaction pool loading and deterministic reaction selection.
//!
//! A `ReactionPool` is loaded once from a local JSON file or an HTTP(S)
//! endpoint and never mutated afterwards. Any load failure degrades to
//! `PoolState::Unavailable` instead of an error so the caller can keep the
//! dispatch loop alive. `select_reaction_set` maps a message id onto the pool
//! through SHA-256, which keeps the assignment stable across restarts.

pub mod reaction_pool;
pub mod reaction_selector;
pub mod reaction_source;

pub use reaction_pool::*;
pub use reaction_selector::*;
pub use reaction_source::*;
