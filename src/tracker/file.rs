//! Downloaded-file tracking and duplicate detection for one channel.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::error::Result;
use crate::media::{ChannelId, ItemMetadata};
use crate::tracker::document::{load_document, save_document};
use crate::tracker::hash::fingerprint_file;

/// One downloaded file, keyed by its fingerprint in [`FileDocument`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadedFileRecord {
    pub message_id: u64,
    pub filename: String,
    pub file_path: PathBuf,
    pub file_size: u64,
    pub mime_type: String,
    pub download_date: DateTime<Utc>,
}

/// Persisted form of the file tracker.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDocument {
    #[serde(default)]
    pub channel_id: Option<ChannelId>,

    #[serde(default)]
    pub downloaded_files: BTreeMap<String, DownloadedFileRecord>,

    #[serde(default)]
    pub blacklisted_files: BTreeSet<u64>,

    #[serde(default)]
    pub total_files: usize,

    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
}

/// Why a pre-fetch check decided to skip an item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    Blacklisted,
    AlreadyDownloaded { path: PathBuf },
    MatchingNameAndSize { path: PathBuf },
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::Blacklisted => write!(f, "blacklisted"),
            SkipReason::AlreadyDownloaded { path } => {
                write!(f, "already downloaded to {}", path.display())
            }
            SkipReason::MatchingNameAndSize { path } => {
                write!(f, "same name and size as {}", path.display())
            }
        }
    }
}

/// Outcome of recording a downloaded file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedFile {
    pub fingerprint: String,
    /// The fingerprint was already recorded for this channel.
    pub duplicate: bool,
    /// Path of the record this one replaced, if any.
    pub previous_path: Option<PathBuf>,
}

/// Statistics for a file tracker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileTrackerStats {
    pub channel: ChannelId,
    pub total_files_tracked: usize,
    pub total_size_bytes: u64,
    pub blacklisted_count: usize,
    pub tracker_file_path: PathBuf,
    pub tracker_file_exists: bool,
}

/// Tracks downloaded files of a channel by content fingerprint.
#[derive(Debug)]
pub struct FileTracker {
    channel: ChannelId,
    path: PathBuf,
    state: Mutex<FileDocument>,
}

impl FileTracker {
    /// Open the tracker document at `path`, starting fresh if it does not exist.
    pub async fn open(channel: ChannelId, path: PathBuf) -> Result<Self> {
        let document = match load_document::<FileDocument>(&path).await? {
            Some(document) => {
                tracing::info!(
                    channel = %channel,
                    files = document.downloaded_files.len(),
                    blacklisted = document.blacklisted_files.len(),
                    "Loaded file tracker"
                );
                document
            }
            None => {
                tracing::info!(channel = %channel, "File tracker not found, starting fresh");
                FileDocument {
                    channel_id: Some(channel.clone()),
                    ..Default::default()
                }
            }
        };

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

    /// Pre-fetch duplicate check from metadata alone.
    ///
    /// Only skips when the recorded file is still on disk, so a missing file
    /// is always fetched again.
    pub async fn should_skip_file(&self, sequence: u64, item: &ItemMetadata) -> Option<SkipReason> {
        let (blacklisted, by_sequence, by_name_and_size) = {
            let state = self.state.lock().await;
            let blacklisted = state.blacklisted_files.contains(&sequence);
            let by_sequence: Vec<PathBuf> = state
                .downloaded_files
                .values()
                .filter(|record| record.message_id == sequence)
                .map(|record| record.file_path.clone())
                .collect();
            let by_name_and_size: Vec<PathBuf> = state
                .downloaded_files
                .values()
                .filter(|record| record.filename == item.name && record.file_size == item.size)
                .map(|record| record.file_path.clone())
                .collect();
            (blacklisted, by_sequence, by_name_and_size)
        };

        if blacklisted {
            return Some(SkipReason::Blacklisted);
        }

        for path in by_sequence {
            if path.exists() {
                return Some(SkipReason::AlreadyDownloaded { path });
            }
            tracing::warn!(
                channel = %self.channel,
                sequence,
                path = %path.display(),
                "Tracked file is missing, allowing re-download"
            );
        }

        by_name_and_size
            .into_iter()
            .find(|path| path.exists())
            .map(|path| SkipReason::MatchingNameAndSize { path })
    }

    /// Fingerprint the file at `path` and record it.
    ///
    /// A fingerprint that is already recorded is overwritten with the new
    /// path, and the result is flagged as a duplicate.
    pub async fn track_downloaded_file(
        &self,
        sequence: u64,
        item: &ItemMetadata,
        path: &Path,
    ) -> Result<TrackedFile> {
        let fingerprint = fingerprint_file(path).await?;
        let file_size = match tokio::fs::metadata(path).await {
            Ok(metadata) => metadata.len(),
            Err(_) => item.size,
        };
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| item.name.clone());

        let record = DownloadedFileRecord {
            message_id: sequence,
            filename,
            file_path: path.to_path_buf(),
            file_size,
            mime_type: item.effective_mime_type(),
            download_date: Utc::now(),
        };

        let mut state = self.state.lock().await;
        let previous_updated = state.last_updated;
        let previous_total = state.total_files;
        let previous = state.downloaded_files.insert(fingerprint.clone(), record);
        state.total_files = state.downloaded_files.len();
        state.last_updated = Some(Utc::now());

        if let Err(e) = save_document(&self.path, &*state).await {
            match &previous {
                Some(old) => {
                    state.downloaded_files.insert(fingerprint.clone(), old.clone());
                }
                None => {
                    state.downloaded_files.remove(&fingerprint);
                }
            }
            state.total_files = previous_total;
            state.last_updated = previous_updated;
            return Err(e);
        }

        let duplicate = previous.is_some();
        if duplicate {
            tracing::info!(
                channel = %self.channel,
                sequence,
                fingerprint = %fingerprint,
                "Content already tracked, record updated"
            );
        } else {
            tracing::debug!(
                channel = %self.channel,
                sequence,
                fingerprint = %fingerprint,
                "File tracked"
            );
        }

        Ok(TrackedFile {
            fingerprint,
            duplicate,
            previous_path: previous.map(|record| record.file_path),
        })
    }

    /// Remove records whose files no longer exist. Returns how many were removed.
    pub async fn reconcile(&self) -> Result<usize> {
        let snapshot: Vec<(String, PathBuf)> = {
            let state = self.state.lock().await;
            state
                .downloaded_files
                .iter()
                .map(|(fingerprint, record)| (fingerprint.clone(), record.file_path.clone()))
                .collect()
        };

        let missing: Vec<(String, PathBuf)> = snapshot
            .into_iter()
            .filter(|(_, path)| !path.exists())
            .collect();

        if missing.is_empty() {
            return Ok(0);
        }

        let mut state = self.state.lock().await;
        let mut removed = Vec::new();
        for (fingerprint, path) in missing {
            // The record may have been replaced with a live path since the snapshot.
            let still_stale = state
                .downloaded_files
                .get(&fingerprint)
                .is_some_and(|record| record.file_path == path);
            if still_stale {
                if let Some(record) = state.downloaded_files.remove(&fingerprint) {
                    removed.push((fingerprint, record));
                }
            }
        }

        if removed.is_empty() {
            return Ok(0);
        }

        let previous_total = state.total_files;
        let previous_updated = state.last_updated;
        state.total_files = state.downloaded_files.len();
        state.last_updated = Some(Utc::now());

        if let Err(e) = save_document(&self.path, &*state).await {
            for (fingerprint, record) in removed {
                state.downloaded_files.insert(fingerprint, record);
            }
            state.total_files = previous_total;
            state.last_updated = previous_updated;
            return Err(e);
        }

        tracing::info!(
            channel = %self.channel,
            removed = removed.len(),
            "Removed records for missing files"
        );

        Ok(removed.len())
    }

    /// Never download this sequence number.
    pub async fn add_blacklisted(&self, sequence: u64, reason: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        if !state.blacklisted_files.insert(sequence) {
            return Ok(());
        }

        if let Err(e) = save_document(&self.path, &*state).await {
            state.blacklisted_files.remove(&sequence);
            return Err(e);
        }

        tracing::info!(channel = %self.channel, sequence, reason, "Blacklisted message");
        Ok(())
    }

    pub async fn remove_blacklisted(&self, sequence: u64) -> Result<bool> {
        let mut state = self.state.lock().await;
        if !state.blacklisted_files.remove(&sequence) {
            return Ok(false);
        }

        if let Err(e) = save_document(&self.path, &*state).await {
            state.blacklisted_files.insert(sequence);
            return Err(e);
        }

        Ok(true)
    }

    pub async fn is_blacklisted(&self, sequence: u64) -> bool {
        self.state.lock().await.blacklisted_files.contains(&sequence)
    }

    /// Record downloaded for a sequence number, if any.
    pub async fn downloaded_file_for(&self, sequence: u64) -> Option<DownloadedFileRecord> {
        self.state
            .lock()
            .await
            .downloaded_files
            .values()
            .find(|record| record.message_id == sequence)
            .cloned()
    }

    /// Snapshot of all records keyed by fingerprint.
    pub async fn records(&self) -> BTreeMap<String, DownloadedFileRecord> {
        self.state.lock().await.downloaded_files.clone()
    }

    pub async fn flush(&self) -> Result<()> {
        let state = self.state.lock().await;
        save_document(&self.path, &*state).await
    }

    pub async fn statistics(&self) -> FileTrackerStats {
        let state = self.state.lock().await;
        FileTrackerStats {
            channel: self.channel.clone(),
            total_files_tracked: state.downloaded_files.len(),
            total_size_bytes: state.downloaded_files.values().map(|r| r.file_size).sum(),
            blacklisted_count: state.blacklisted_files.len(),
            tracker_file_path: self.path.clone(),
            tracker_file_exists: self.path.exists(),
        }
    }
}
