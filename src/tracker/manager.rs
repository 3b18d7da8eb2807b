//! Per-channel tracker registry.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::{Mutex, OnceCell};

use crate::error::{Error, Result};
use crate::fs;
use crate::media::ChannelId;
use crate::tracker::file::{FileTracker, FileTrackerStats};
use crate::tracker::message::{MessageTracker, MessageTrackerStats};

/// Both tracker stores of one channel.
#[derive(Debug)]
pub struct ChannelTrackers {
    pub channel: ChannelId,
    pub messages: MessageTracker,
    pub files: FileTracker,
}

/// Combined statistics for one channel.
#[derive(Debug, Clone)]
pub struct ChannelStats {
    pub messages: MessageTrackerStats,
    pub files: FileTrackerStats,
}

/// Result of running an operation on every cached channel.
#[derive(Debug)]
pub struct FanOutReport<T> {
    pub succeeded: Vec<(ChannelId, T)>,
    pub failed: Vec<(ChannelId, Error)>,
}

impl<T> FanOutReport<T> {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

type Slot = Arc<OnceCell<Arc<ChannelTrackers>>>;

/// Owns the tracker stores of every channel seen during a run.
///
/// Stores are created lazily on first reference and never evicted. Each
/// channel's stores synchronize independently; the registry lock is only
/// held to find or insert a channel's slot.
#[derive(Debug)]
pub struct TrackerManager {
    base_dir: PathBuf,
    slots: Mutex<HashMap<ChannelId, Slot>>,
    created: AtomicUsize,
}

impl TrackerManager {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            slots: Mutex::new(HashMap::new()),
            created: AtomicUsize::new(0),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn channel_dir(&self, channel: &ChannelId) -> PathBuf {
        fs::channel_dir(&self.base_dir, channel)
    }

    pub fn downloads_dir(&self, channel: &ChannelId) -> PathBuf {
        fs::downloads_dir(&self.base_dir, channel)
    }

    /// Return the channel's trackers, opening them on first use.
    ///
    /// Concurrent first calls for the same channel open the stores once;
    /// every caller receives the same instance.
    pub async fn get_or_create(&self, channel: &ChannelId) -> Result<Arc<ChannelTrackers>> {
        let slot = {
            let mut slots = self.slots.lock().await;
            slots.entry(channel.clone()).or_default().clone()
        };

        let trackers = slot
            .get_or_try_init(|| self.open_channel(channel.clone()))
            .await?;

        Ok(trackers.clone())
    }

    /// Cached trackers for a channel, without creating them.
    pub async fn get(&self, channel: &ChannelId) -> Option<Arc<ChannelTrackers>> {
        let slot = self.slots.lock().await.get(channel).cloned()?;
        slot.get().cloned()
    }

    /// Channels with initialized trackers, sorted.
    pub async fn channels(&self) -> Vec<ChannelId> {
        let mut channels: Vec<ChannelId> = self
            .initialized()
            .await
            .into_iter()
            .map(|trackers| trackers.channel.clone())
            .collect();
        channels.sort();
        channels
    }

    /// Number of channel store pairs opened by this manager.
    pub fn created_count(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    /// Channel directories under the base directory that hold a tracker document.
    pub async fn discover_channels(&self) -> Result<Vec<ChannelId>> {
        let mut channels = Vec::new();
        let mut entries = match tokio::fs::read_dir(&self.base_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(channels),
            Err(e) => return Err(e.into()),
        };

        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let dir = entry.path();
            let has_tracker = dir.join(fs::paths::MESSAGE_TRACKER_FILE).exists()
                || dir.join(fs::paths::FILE_TRACKER_FILE).exists();
            if !has_tracker {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            match ChannelId::parse(&name) {
                Ok(channel) if channel.as_str() == name => channels.push(channel),
                _ => tracing::debug!(dir = %dir.display(), "Skipping non-channel directory"),
            }
        }

        channels.sort();
        Ok(channels)
    }

    pub async fn statistics(&self) -> Vec<ChannelStats> {
        let mut stats = Vec::new();
        for trackers in self.initialized().await {
            stats.push(ChannelStats {
                messages: trackers.messages.statistics().await,
                files: trackers.files.statistics().await,
            });
        }
        stats.sort_by(|a, b| a.messages.channel.cmp(&b.messages.channel));
        stats
    }

    /// Rewrite every cached channel's documents.
    pub async fn flush_all(&self) -> FanOutReport<()> {
        let trackers = self.initialized().await;
        let results = join_all(trackers.iter().map(|t| async move {
            let result = match t.messages.flush().await {
                Ok(()) => t.files.flush().await,
                Err(e) => Err(e),
            };
            (t.channel.clone(), result)
        }))
        .await;

        collect_report(results)
    }

    /// Drop file records whose files are gone, in every cached channel.
    pub async fn reconcile_all(&self) -> FanOutReport<usize> {
        let trackers = self.initialized().await;
        let results = join_all(
            trackers
                .iter()
                .map(|t| async move { (t.channel.clone(), t.files.reconcile().await) }),
        )
        .await;

        collect_report(results)
    }

    async fn initialized(&self) -> Vec<Arc<ChannelTrackers>> {
        let slots: Vec<Slot> = self.slots.lock().await.values().cloned().collect();
        slots.iter().filter_map(|slot| slot.get().cloned()).collect()
    }

    async fn open_channel(&self, channel: ChannelId) -> Result<Arc<ChannelTrackers>> {
        let dir = self.channel_dir(&channel);
        fs::ensure_dir(&dir).await.map_err(|e| match e {
            Error::Io(source) => Error::Persistence {
                path: dir.clone(),
                source,
            },
            other => other,
        })?;

        let messages = MessageTracker::open(
            channel.clone(),
            fs::message_tracker_path(&self.base_dir, &channel),
        )
        .await?;
        let files =
            FileTracker::open(channel.clone(), fs::file_tracker_path(&self.base_dir, &channel))
                .await?;

        self.created.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(channel = %channel, dir = %dir.display(), "Opened channel trackers");

        Ok(Arc::new(ChannelTrackers {
            channel,
            messages,
            files,
        }))
    }
}

fn collect_report<T>(results: Vec<(ChannelId, Result<T>)>) -> FanOutReport<T> {
    let mut report = FanOutReport {
        succeeded: Vec::new(),
        failed: Vec::new(),
    };

    for (channel, result) in results {
        match result {
            Ok(value) => report.succeeded.push((channel, value)),
            Err(e) => {
                tracing::warn!(channel = %channel, error = %e, "Tracker operation failed");
                report.failed.push((channel, e));
            }
        }
    }

    report.succeeded.sort_by(|a, b| a.0.cmp(&b.0));
    report.failed.sort_by(|a, b| a.0.cmp(&b.0));
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::ItemMetadata;

    fn channel(raw: &str) -> ChannelId {
        ChannelId::parse(raw).unwrap()
    }

    #[tokio::test]
    async fn test_concurrent_get_or_create_builds_once() {
        let dir = tempfile::tempdir().unwrap();
        let manager = Arc::new(TrackerManager::new(dir.path()));

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let manager = manager.clone();
                tokio::spawn(async move { manager.get_or_create(&channel("@jazz")).await })
            })
            .collect();

        let mut stores = Vec::new();
        for handle in handles {
            stores.push(handle.await.unwrap().unwrap());
        }

        assert_eq!(manager.created_count(), 1);
        assert!(stores.iter().all(|s| Arc::ptr_eq(s, &stores[0])));
        assert!(manager.channel_dir(&channel("jazz")).is_dir());
    }

    #[tokio::test]
    async fn test_normalized_identities_share_stores() {
        let dir = tempfile::tempdir().unwrap();
        let manager = TrackerManager::new(dir.path());

        let a = manager.get_or_create(&channel("-100123")).await.unwrap();
        let b = manager.get_or_create(&channel("100123")).await.unwrap();
        let c = manager.get_or_create(&channel("rock")).await.unwrap();

        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(manager.created_count(), 2);
        assert_eq!(manager.channels().await, vec![channel("100123"), channel("rock")]);
    }

    #[tokio::test]
    async fn test_get_does_not_create() {
        let dir = tempfile::tempdir().unwrap();
        let manager = TrackerManager::new(dir.path());
        assert!(manager.get(&channel("jazz")).await.is_none());
        manager.get_or_create(&channel("jazz")).await.unwrap();
        assert!(manager.get(&channel("jazz")).await.is_some());
        assert_eq!(manager.created_count(), 1);
    }

    #[tokio::test]
    async fn test_corrupt_document_fails_then_retries() {
        let dir = tempfile::tempdir().unwrap();
        let manager = TrackerManager::new(dir.path());
        let id = channel("jazz");
        let channel_dir = manager.channel_dir(&id);
        std::fs::create_dir_all(&channel_dir).unwrap();
        std::fs::write(channel_dir.join("message_tracker.json"), "{oops").unwrap();

        let err = manager.get_or_create(&id).await.unwrap_err();
        assert!(matches!(err, Error::TrackerCorrupt { .. }));
        assert_eq!(manager.created_count(), 0);

        std::fs::remove_file(channel_dir.join("message_tracker.json")).unwrap();
        assert!(manager.get_or_create(&id).await.is_ok());
        assert_eq!(manager.created_count(), 1);
    }

    #[tokio::test]
    async fn test_reconcile_all_reports_per_channel() {
        let dir = tempfile::tempdir().unwrap();
        let manager = TrackerManager::new(dir.path());

        let jazz = manager.get_or_create(&channel("jazz")).await.unwrap();
        let file = dir.path().join("x.mp3");
        std::fs::write(&file, b"x").unwrap();
        jazz.files
            .track_downloaded_file(1, &ItemMetadata::new("x.mp3", 1, "https://x/1"), &file)
            .await
            .unwrap();
        std::fs::remove_file(&file).unwrap();
        manager.get_or_create(&channel("rock")).await.unwrap();

        let report = manager.reconcile_all().await;
        assert!(report.is_success());
        assert_eq!(
            report.succeeded,
            vec![(channel("jazz"), 1), (channel("rock"), 0)]
        );
    }

    #[tokio::test]
    async fn test_flush_all_collects_failures() {
        let dir = tempfile::tempdir().unwrap();
        let manager = TrackerManager::new(dir.path());
        manager.get_or_create(&channel("jazz")).await.unwrap();
        manager.get_or_create(&channel("rock")).await.unwrap();

        std::fs::remove_dir_all(manager.channel_dir(&channel("rock"))).unwrap();

        let report = manager.flush_all().await;
        assert_eq!(report.succeeded.len(), 1);
        assert_eq!(report.succeeded[0].0, channel("jazz"));
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, channel("rock"));
        assert!(matches!(report.failed[0].1, Error::Persistence { .. }));
    }

    #[tokio::test]
    async fn test_discover_channels() {
        let dir = tempfile::tempdir().unwrap();
        {
            let manager = TrackerManager::new(dir.path());
            let jazz = manager.get_or_create(&channel("jazz")).await.unwrap();
            jazz.messages.mark_processed(1).await.unwrap();
        }
        std::fs::create_dir_all(dir.path().join("unrelated")).unwrap();

        let manager = TrackerManager::new(dir.path());
        assert_eq!(manager.discover_channels().await.unwrap(), vec![channel("jazz")]);

        let missing = TrackerManager::new(dir.path().join("nope"));
        assert!(missing.discover_channels().await.unwrap().is_empty());
    }
}
