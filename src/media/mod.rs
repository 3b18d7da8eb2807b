//! Media module for channel identity, item metadata and manifest parsing.

pub mod channel;
pub mod item;
pub mod parser;

pub use channel::ChannelId;
pub use item::ItemMetadata;
pub use parser::{load_manifest, parse_manifest, ChannelEntry, Manifest, ManifestItem};
