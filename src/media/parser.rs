//! Manifest parsing.
//!
//! The manifest is the hand-off from the source client: one entry per
//! channel, each listing candidate items with their sequence numbers.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::media::channel::ChannelId;
use crate::media::item::ItemMetadata;

/// Items discovered across all channels.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub channels: Vec<ChannelEntry>,
}

/// Items discovered in one channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelEntry {
    /// Raw configured identifier.
    pub id: String,

    /// Human-readable channel title.
    #[serde(default)]
    pub title: Option<String>,

    #[serde(default)]
    pub items: Vec<ManifestItem>,
}

/// One candidate item with its channel sequence number.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestItem {
    pub sequence: u64,

    #[serde(flatten)]
    pub metadata: ItemMetadata,
}

impl ChannelEntry {
    /// Normalized channel identity.
    pub fn channel_id(&self) -> Result<ChannelId> {
        ChannelId::parse(&self.id)
    }

    /// Items in ascending sequence order, first occurrence wins on duplicates.
    pub fn ordered_items(&self) -> Vec<(u64, ItemMetadata)> {
        let mut seen = HashSet::new();
        let mut items: Vec<(u64, ItemMetadata)> = self
            .items
            .iter()
            .filter(|item| seen.insert(item.sequence))
            .map(|item| (item.sequence, item.metadata.clone()))
            .collect();
        items.sort_by_key(|(sequence, _)| *sequence);
        items
    }
}

/// Load a manifest from a JSON file.
pub fn load_manifest(path: &Path) -> Result<Manifest> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            Error::Config(format!("Manifest file not found: {}", path.display()))
        } else {
            Error::Io(e)
        }
    })?;

    parse_manifest(&content)
}

/// Parse a manifest from JSON text.
pub fn parse_manifest(content: &str) -> Result<Manifest> {
    let manifest: Manifest = serde_json::from_str(content)?;

    for entry in &manifest.channels {
        entry.channel_id()?;
    }

    Ok(manifest)
}
