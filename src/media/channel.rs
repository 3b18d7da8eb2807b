//! Channel identity.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Error, Result};

/// Normalized identity of a source channel.
///
/// Derived from the configured identifier (numeric id such as `-1001234567890`
/// or a handle such as `@jazzmusic`) by stripping leading sign and prefix
/// characters. Two raw identifiers that normalize to the same string are the
/// same channel. A channel that changes its handle gets a new identity.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChannelId(String);

impl ChannelId {
    /// Normalize a raw configured identifier.
    pub fn parse(raw: &str) -> Result<Self> {
        let normalized = raw.trim().trim_start_matches(['-', '@']).trim();

        if normalized.is_empty() {
            return Err(Error::InvalidChannel {
                raw: raw.to_string(),
                reason: "identifier is empty after normalization".to_string(),
            });
        }

        if normalized.chars().all(|c| c == '.') {
            return Err(Error::InvalidChannel {
                raw: raw.to_string(),
                reason: "identifier names the current directory".to_string(),
            });
        }

        if normalized.contains("..") {
            return Err(Error::InvalidChannel {
                raw: raw.to_string(),
                reason: "path traversal detected".to_string(),
            });
        }

        if let Some(bad) = normalized
            .chars()
            .find(|c| matches!(c, '/' | '\\' | '\0') || c.is_control() || c.is_whitespace())
        {
            return Err(Error::InvalidChannel {
                raw: raw.to_string(),
                reason: format!("contains forbidden character {:?}", bad),
            });
        }

        Ok(Self(normalized.to_string()))
    }

    /// The normalized identity string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for ChannelId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl Serialize for ChannelId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for ChannelId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        ChannelId::parse(&raw).map_err(serde::de::Error::custom)
    }
}
