//! Download task representation.

use std::cmp::Ordering;
use std::fmt;
use std::path::PathBuf;

use tokio::time::Instant;

use crate::media::{ChannelId, ItemMetadata};

/// One unit of work: fetch one remote item into one directory.
///
/// Tasks refer to their channel's trackers by identity; the stores
/// themselves live in the [`TrackerManager`](crate::tracker::TrackerManager).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadTask {
    pub channel: ChannelId,
    /// Source sequence number, monotonic per channel.
    pub sequence: u64,
    pub item: ItemMetadata,
    pub destination: PathBuf,
}

impl DownloadTask {
    pub fn new(channel: ChannelId, sequence: u64, item: ItemMetadata, destination: PathBuf) -> Self {
        Self {
            channel,
            sequence,
            item,
            destination,
        }
    }

    pub fn key(&self) -> TaskKey {
        TaskKey {
            channel: self.channel.clone(),
            sequence: self.sequence,
        }
    }
}

/// Release order of a task: channel, then sequence number.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskKey {
    pub channel: ChannelId,
    pub sequence: u64,
}

impl fmt::Display for TaskKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.channel, self.sequence)
    }
}

/// Heap entry. `order` is the admission counter, breaking key ties FIFO.
#[derive(Debug)]
pub(crate) struct QueuedTask {
    pub key: TaskKey,
    pub order: u64,
    pub task: DownloadTask,
}

impl PartialEq for QueuedTask {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key && self.order == other.order
    }
}

impl Eq for QueuedTask {}

impl PartialOrd for QueuedTask {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedTask {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key
            .cmp(&other.key)
            .then_with(|| self.order.cmp(&other.order))
    }
}

/// Bounded-retry state carried alongside a task inside a worker.
#[derive(Debug, Clone, Copy, Default)]
pub struct RetryState {
    /// Failed attempts so far.
    pub attempts: u32,
    /// Earliest time the next attempt may start.
    pub next_eligible: Option<Instant>,
}

impl RetryState {
    pub fn record_failure(&mut self, next_eligible: Instant) {
        self.attempts += 1;
        self.next_eligible = Some(next_eligible);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cmp::Reverse;
    use std::collections::BinaryHeap;

    fn queued(channel: &str, sequence: u64, order: u64) -> QueuedTask {
        let channel = ChannelId::parse(channel).unwrap();
        let task = DownloadTask::new(
            channel,
            sequence,
            ItemMetadata::new(format!("{}.mp3", sequence), 1, "https://x/1"),
            PathBuf::from("/tmp"),
        );
        QueuedTask {
            key: task.key(),
            order,
            task,
        }
    }

    #[test]
    fn test_heap_releases_by_channel_then_sequence() {
        let mut heap = BinaryHeap::new();
        heap.push(Reverse(queued("b", 1, 0)));
        heap.push(Reverse(queued("a", 12, 1)));
        heap.push(Reverse(queued("a", 10, 2)));
        heap.push(Reverse(queued("a", 10, 3)));

        let released: Vec<(String, u64, u64)> = std::iter::from_fn(|| heap.pop())
            .map(|Reverse(q)| (q.key.channel.to_string(), q.key.sequence, q.order))
            .collect();

        assert_eq!(
            released,
            vec![
                ("a".into(), 10, 2),
                ("a".into(), 10, 3),
                ("a".into(), 12, 1),
                ("b".into(), 1, 0),
            ]
        );
    }

    #[test]
    fn test_key_display() {
        assert_eq!(queued("@jazz", 42, 0).key.to_string(), "jazz#42");
    }
}
