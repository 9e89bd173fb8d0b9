//! Dispatch runtime for hashreact.
//!
//! `initialize` loads the monitoring policy (fatal on failure) and the reaction
//! pool (degrades to unavailable) and returns a `ReadyState`. Only a
//! `ReadyState` can `run`, so events are never dispatched before both loads
//! have completed.

pub mod dispatcher;
pub mod lifecycle;

pub use dispatcher::*;
pub use lifecycle::*;
