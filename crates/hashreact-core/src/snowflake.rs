//! Discord snowflake identifiers.
//!
//! Every id the agent handles (guilds, channels, users, messages) is a 64-bit
//! snowflake. Discord serializes them as decimal strings while hand-written
//! configuration usually carries plain integers, so deserialization accepts
//! both forms. `Display` always yields the canonical decimal string, which is
//! also the exact input hashed by reaction selection.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Unix milliseconds of the first second of 2015, the Discord id epoch.
pub const DISCORD_EPOCH_MS: u64 = 1_420_070_400_000;

const TIMESTAMP_SHIFT: u32 = 22;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SnowflakeParseError {
    #[error("snowflake must not be empty")]
    Empty,
    #[error("snowflake '{0}' is not an unsigned 64-bit decimal integer")]
    Invalid(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Snowflake(u64);

impl Snowflake {
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    pub const fn get(self) -> u64 {
        self.0
    }

    /// Builds the smallest snowflake minted at `unix_ms`.
    pub fn from_timestamp_ms(unix_ms: u64) -> Self {
        Self(unix_ms.saturating_sub(DISCORD_EPOCH_MS) << TIMESTAMP_SHIFT)
    }

    /// Creation time encoded in the high bits, as Unix milliseconds.
    pub fn timestamp_ms(self) -> u64 {
        (self.0 >> TIMESTAMP_SHIFT).saturating_add(DISCORD_EPOCH_MS)
    }
}

impl From<u64> for Snowflake {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl fmt::Display for Snowflake {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Snowflake {
    type Err = SnowflakeParseError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(SnowflakeParseError::Empty);
        }
        if !trimmed.bytes().all(|byte| byte.is_ascii_digit()) {
            return Err(SnowflakeParseError::Invalid(trimmed.to_string()));
        }
        trimmed
            .parse::<u64>()
            .map(Self)
            .map_err(|_| SnowflakeParseError::Invalid(trimmed.to_string()))
    }
}

impl Serialize for Snowflake {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SnowflakeRepr {
    Number(u64),
    Text(String),
}

impl<'de> Deserialize<'de> for Snowflake {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match SnowflakeRepr::deserialize(deserializer)? {
            SnowflakeRepr::Number(value) => Ok(Self(value)),
            SnowflakeRepr::Text(raw) => raw.parse().map_err(serde::de::Error::custom),
        }
    }
}
