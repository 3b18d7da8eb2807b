//! Per-channel directory layout.
//!
//! ```text
//! <download_dir>/
//!   <channel identity>/
//!     message_tracker.json
//!     file_tracker.json
//!     downloads/
//! ```

use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::media::ChannelId;

/// File name of the processed-message tracker document.
pub const MESSAGE_TRACKER_FILE: &str = "message_tracker.json";

/// File name of the downloaded-file tracker document.
pub const FILE_TRACKER_FILE: &str = "file_tracker.json";

/// Subdirectory holding downloaded content.
pub const DOWNLOADS_DIR: &str = "downloads";

/// Root directory of a channel.
pub fn channel_dir(base_dir: &Path, channel: &ChannelId) -> PathBuf {
    base_dir.join(channel.as_str())
}

/// Directory downloaded content for a channel lands in.
pub fn downloads_dir(base_dir: &Path, channel: &ChannelId) -> PathBuf {
    channel_dir(base_dir, channel).join(DOWNLOADS_DIR)
}

/// Path to a channel's message tracker document.
pub fn message_tracker_path(base_dir: &Path, channel: &ChannelId) -> PathBuf {
    channel_dir(base_dir, channel).join(MESSAGE_TRACKER_FILE)
}

/// Path to a channel's file tracker document.
pub fn file_tracker_path(base_dir: &Path, channel: &ChannelId) -> PathBuf {
    channel_dir(base_dir, channel).join(FILE_TRACKER_FILE)
}

/// Ensure a directory exists, creating it if necessary.
pub async fn ensure_dir(path: &Path) -> Result<()> {
    tokio::fs::create_dir_all(path).await?;
    Ok(())
}
