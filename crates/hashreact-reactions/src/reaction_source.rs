//! Reaction pool sources: a local JSON file or an HTTP(S) document.

use std::convert::Infallible;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;
use tracing::{info, warn};

use crate::reaction_pool::{PoolState, ReactionPool, ReactionsDocument};

pub const DEFAULT_REACTIONS_FILE_NAME: &str = "reactions.json";
pub const DEFAULT_REACTIONS_FETCH_TIMEOUT_MS: u64 = 10_000;

/// Where the reaction document lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReactionSource {
    File(PathBuf),
    Url(String),
}

impl ReactionSource {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::File(_) => "file",
            Self::Url(_) => "url",
        }
    }
}

impl fmt::Display for ReactionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File(path) => write!(f, "{}", path.display()),
            Self::Url(url) => f.write_str(url),
        }
    }
}

impl FromStr for ReactionSource {
    type Err = Infallible;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let trimmed = raw.trim();
        let lowered = trimmed.to_ascii_lowercase();
        if lowered.starts_with("http://") || lowered.starts_with("https://") {
            Ok(Self::Url(trimmed.to_string()))
        } else {
            Ok(Self::File(PathBuf::from(trimmed)))
        }
    }
}

impl Default for ReactionSource {
    fn default() -> Self {
        Self::File(PathBuf::from(DEFAULT_REACTIONS_FILE_NAME))
    }
}

#[derive(Debug, Error)]
pub enum ReactionSourceError {
    #[error("failed to read reactions file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to build reactions http client: {0}")]
    Client(#[source] reqwest::Error),
    #[error("failed to fetch reactions from {url}: {source}")]
    Fetch {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("reactions endpoint {url} returned status {status}")]
    Status { url: String, status: u16 },
    #[error("failed to parse reactions document from {origin}: {source}")]
    Parse {
        origin: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("reactions document from {origin} contains no reaction sets")]
    Empty { origin: String },
}

impl ReactionSourceError {
    pub fn reason_code(&self) -> &'static str {
        match self {
            Self::Read { .. } => "reactions_read_failed",
            Self::Client(_) => "reactions_client_unavailable",
            Self::Fetch { .. } => "reactions_fetch_failed",
            Self::Status { .. } => "reactions_http_status",
            Self::Parse { .. } => "reactions_parse_failed",
            Self::Empty { .. } => "reactions_empty",
        }
    }
}

/// Parses a reactions document, rejecting one that yields no sets.
pub fn parse_reaction_pool(raw: &str, origin: &str) -> Result<ReactionPool, ReactionSourceError> {
    let document = serde_json::from_str::<ReactionsDocument>(raw).map_err(|source| {
        ReactionSourceError::Parse {
            origin: origin.to_string(),
            source,
        }
    })?;
    document.into_pool().ok_or_else(|| ReactionSourceError::Empty {
        origin: origin.to_string(),
    })
}

/// Reads and parses the pool, propagating the precise failure.
pub async fn try_load_reaction_pool(
    source: &ReactionSource,
    fetch_timeout: Duration,
) -> Result<ReactionPool, ReactionSourceError> {
    let origin = source.to_string();
    let raw = match source {
        ReactionSource::File(path) => {
            tokio::fs::read_to_string(path)
                .await
                .map_err(|source| ReactionSourceError::Read {
                    path: path.clone(),
                    source,
                })?
        }
        ReactionSource::Url(url) => fetch_reactions_document(url, fetch_timeout).await?,
    };
    parse_reaction_pool(&raw, &origin)
}

/// Loads the pool once, degrading every failure to `PoolState::Unavailable`.
pub async fn load_reaction_pool(source: &ReactionSource, fetch_timeout: Duration) -> PoolState {
    match try_load_reaction_pool(source, fetch_timeout).await {
        Ok(pool) => {
            info!(
                source = %source,
                source_kind = source.kind(),
                reaction_sets = pool.len().get(),
                "loaded reaction pool"
            );
            PoolState::Loaded(pool)
        }
        Err(error) => {
            warn!(
                source = %source,
                source_kind = source.kind(),
                reason_code = error.reason_code(),
                error = %error,
                "reaction pool unavailable; messages will not be annotated"
            );
            PoolState::Unavailable {
                reason: error.to_string(),
            }
        }
    }
}

async fn fetch_reactions_document(
    url: &str,
    fetch_timeout: Duration,
) -> Result<String, ReactionSourceError> {
    let client = reqwest::Client::builder()
        .timeout(fetch_timeout)
        .build()
        .map_err(ReactionSourceError::Client)?;
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|source| ReactionSourceError::Fetch {
            url: url.to_string(),
            source,
        })?;
    let status = response.status();
    if !status.is_success() {
        return Err(ReactionSourceError::Status {
            url: url.to_string(),
            status: status.as_u16(),
        });
    }
    response
        .text()
        .await
        .map_err(|source| ReactionSourceError::Fetch {
            url: url.to_string(),
            source,
        })
}
