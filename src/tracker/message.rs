//! Processed-message tracking for one channel.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::error::Result;
use crate::media::ChannelId;
use crate::tracker::document::{load_document, save_document};

/// Persisted form of the processed-message record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageDocument {
    #[serde(default)]
    pub channel_id: Option<ChannelId>,

    /// Sequence numbers already handed to a worker, ascending.
    #[serde(default)]
    pub processed: BTreeSet<u64>,

    #[serde(default)]
    pub last_processed_id: Option<u64>,

    #[serde(default)]
    pub total_messages_processed: u64,

    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
}

/// Statistics for a message tracker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageTrackerStats {
    pub channel: ChannelId,
    pub total_messages_processed: u64,
    pub last_processed_id: Option<u64>,
    pub tracker_file_path: PathBuf,
    pub tracker_file_exists: bool,
}

/// Tracks which source sequence numbers of a channel have been processed.
///
/// Every mutation is written to disk before the call returns.
#[derive(Debug)]
pub struct MessageTracker {
    channel: ChannelId,
    path: PathBuf,
    state: Mutex<MessageDocument>,
}

impl MessageTracker {
    /// Open the tracker document at `path`, starting fresh if it does not exist.
    pub async fn open(channel: ChannelId, path: PathBuf) -> Result<Self> {
        let document = match load_document::<MessageDocument>(&path).await? {
            Some(document) => {
                tracing::info!(
                    channel = %channel,
                    tracked = document.processed.len(),
                    last_id = ?document.last_processed_id,
                    "Loaded message tracker"
                );
                document
            }
            None => {
                tracing::info!(channel = %channel, "Message tracker not found, starting fresh");
                MessageDocument {
                    channel_id: Some(channel.clone()),
                    ..Default::default()
                }
            }
        };

        if let Some(stored) = &document.channel_id {
            if stored != &channel {
                tracing::warn!(
                    channel = %channel,
                    stored = %stored,
                    "Message tracker belongs to a different channel identity"
                );
            }
        }

        Ok(Self {
            channel,
            path,
            state: Mutex::new(document),
        })
    }

    pub fn channel(&self) -> &ChannelId {
        &self.channel
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Check if a sequence number was already processed.
    pub async fn has_processed(&self, sequence: u64) -> bool {
        self.state.lock().await.processed.contains(&sequence)
    }

    /// Mark a sequence number as processed.
    ///
    /// Returns `true` if the sequence was newly recorded. Marking an already
    /// processed sequence is a no-op and does not touch the disk.
    pub async fn mark_processed(&self, sequence: u64) -> Result<bool> {
        let mut state = self.state.lock().await;

        if !state.processed.insert(sequence) {
            return Ok(false);
        }

        let previous_last = state.last_processed_id;
        let previous_updated = state.last_updated;
        state.total_messages_processed += 1;
        if previous_last.map_or(true, |last| sequence > last) {
            state.last_processed_id = Some(sequence);
        }
        state.last_updated = Some(Utc::now());

        if let Err(e) = save_document(&self.path, &*state).await {
            state.processed.remove(&sequence);
            state.total_messages_processed -= 1;
            state.last_processed_id = previous_last;
            state.last_updated = previous_updated;
            return Err(e);
        }

        tracing::debug!(
            channel = %self.channel,
            sequence,
            total = state.total_messages_processed,
            "Message marked as processed"
        );

        Ok(true)
    }

    /// Highest processed sequence number.
    pub async fn last_processed_id(&self) -> Option<u64> {
        self.state.lock().await.last_processed_id
    }

    /// Snapshot of the processed set.
    pub async fn processed(&self) -> BTreeSet<u64> {
        self.state.lock().await.processed.clone()
    }

    /// Rewrite the document from the in-memory state.
    pub async fn flush(&self) -> Result<()> {
        let state = self.state.lock().await;
        save_document(&self.path, &*state).await
    }

    pub async fn statistics(&self) -> MessageTrackerStats {
        let state = self.state.lock().await;
        MessageTrackerStats {
            channel: self.channel.clone(),
            total_messages_processed: state.total_messages_processed,
            last_processed_id: state.last_processed_id,
            tracker_file_path: self.path.clone(),
            tracker_file_exists: self.path.exists(),
        }
    }
}
