//! Feeding a channel's items into the coordinator.

use crate::download::coordinator::Coordinator;
use crate::download::task::DownloadTask;
use crate::error::Result;
use crate::media::{ChannelId, ItemMetadata};
use crate::tracker::TrackerManager;

/// What the producer did with one channel's items.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelReport {
    pub channel: Option<ChannelId>,
    /// Distinct items offered.
    pub found: usize,
    pub queued: usize,
    pub already_processed: usize,
    /// Rejected before reaching the queue.
    pub malformed: usize,
    /// Left out because the per-run limit was reached.
    pub deferred: usize,
}

/// Enqueue a channel's items in sequence order.
///
/// Items already processed are skipped. Items with unusable metadata are
/// recorded as failed without a fetch. At most `limit` items are queued when
/// a limit is given; the rest stay unprocessed for a later run.
pub async fn enqueue_channel(
    coordinator: &Coordinator,
    manager: &TrackerManager,
    channel: &ChannelId,
    mut items: Vec<(u64, ItemMetadata)>,
    limit: Option<usize>,
) -> Result<ChannelReport> {
    items.sort_by_key(|(sequence, _)| *sequence);
    items.dedup_by_key(|(sequence, _)| *sequence);

    let trackers = manager.get_or_create(channel).await?;
    let destination = manager.downloads_dir(channel);

    let mut report = ChannelReport {
        channel: Some(channel.clone()),
        found: items.len(),
        ..Default::default()
    };

    for (sequence, item) in items {
        if trackers.messages.has_processed(sequence).await {
            report.already_processed += 1;
            continue;
        }

        if let Err(e) = item.validate() {
            tracing::warn!(channel = %channel, sequence, error = %e, "Rejecting malformed item");
            coordinator.record_rejected(channel, sequence, &e).await;
            if coordinator.mark_failed_as_processed() {
                trackers.messages.mark_processed(sequence).await?;
            }
            report.malformed += 1;
            continue;
        }

        if limit.is_some_and(|limit| report.queued >= limit) {
            report.deferred += 1;
            continue;
        }

        let task = DownloadTask::new(channel.clone(), sequence, item, destination.clone());
        coordinator.submit(task).await?;
        report.queued += 1;
    }

    tracing::info!(
        channel = %channel,
        found = report.found,
        queued = report.queued,
        already_processed = report.already_processed,
        malformed = report.malformed,
        deferred = report.deferred,
        "Channel items queued"
    );

    Ok(report)
}
