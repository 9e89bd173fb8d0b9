use std::num::NonZeroUsize;

use serde::{Deserialize, Serialize};

/// Ordered reaction symbols attached together to one message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReactionSet(Vec<String>);

impl ReactionSet {
    pub fn new(symbols: Vec<String>) -> Self {
        Self(symbols)
    }

    pub fn symbols(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for ReactionSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

/// Non-empty, immutable sequence of reaction sets.
///
/// The only constructor refuses an empty list, so selection never has to deal
/// with a zero modulus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReactionPool {
    sets: Vec<ReactionSet>,
}

impl ReactionPool {
    pub fn new(sets: Vec<ReactionSet>) -> Option<Self> {
        if sets.is_empty() {
            return None;
        }
        Some(Self { sets })
    }

    pub fn len(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.sets.len()).unwrap_or(NonZeroUsize::MIN)
    }

    pub fn get(&self, index: usize) -> Option<&ReactionSet> {
        self.sets.get(index)
    }

    pub fn sets(&self) -> &[ReactionSet] {
        &self.sets
    }
}

/// Result of loading the pool at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PoolState {
    Loaded(ReactionPool),
    Unavailable { reason: String },
}

impl PoolState {
    pub fn pool(&self) -> Option<&ReactionPool> {
        match self {
            Self::Loaded(pool) => Some(pool),
            Self::Unavailable { .. } => None,
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, Self::Loaded(_))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Loaded(_) => "loaded",
            Self::Unavailable { .. } => "unavailable",
        }
    }
}

/// Top-level shape of a reactions document. A missing `reactions` field reads
/// as an empty list.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReactionsDocument {
    #[serde(default)]
    pub reactions: Vec<ReactionSet>,
}

impl ReactionsDocument {
    pub fn into_pool(self) -> Option<ReactionPool> {
        ReactionPool::new(self.reactions)
    }
}
