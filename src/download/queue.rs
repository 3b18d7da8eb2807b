//! Bounded priority queue between the producer and the workers.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::time::Duration;

use tokio::sync::{Mutex, Notify};

use crate::download::task::{DownloadTask, QueuedTask};
use crate::error::{Error, Result};

struct QueueState {
    heap: BinaryHeap<Reverse<QueuedTask>>,
    next_order: u64,
    closed: bool,
}

impl QueueState {
    fn push(&mut self, task: DownloadTask) {
        let order = self.next_order;
        self.next_order += 1;
        self.heap.push(Reverse(QueuedTask {
            key: task.key(),
            order,
            task,
        }));
    }
}

/// Priority queue releasing tasks by (channel, sequence), FIFO on ties.
///
/// `enqueue` applies backpressure once `capacity` tasks are pending.
/// Closing wakes every blocked caller; pending tasks can still be drained.
pub struct DownloadQueue {
    capacity: usize,
    state: Mutex<QueueState>,
    not_empty: Notify,
    not_full: Notify,
}

impl DownloadQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            state: Mutex::new(QueueState {
                heap: BinaryHeap::new(),
                next_order: 0,
                closed: false,
            }),
            not_empty: Notify::new(),
            not_full: Notify::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Add a task, waiting while the queue is full.
    ///
    /// Fails with [`Error::QueueClosed`] if the queue is or becomes closed.
    pub async fn enqueue(&self, task: DownloadTask) -> Result<()> {
        let mut task = Some(task);
        loop {
            let notified = self.not_full.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.state.lock().await;
                if state.closed {
                    return Err(Error::QueueClosed);
                }
                if state.heap.len() < self.capacity {
                    if let Some(task) = task.take() {
                        state.push(task);
                    }
                    drop(state);
                    self.not_empty.notify_one();
                    return Ok(());
                }
            }

            notified.await;
        }
    }

    /// Like [`enqueue`](Self::enqueue), giving up after `timeout` of backpressure.
    pub async fn try_enqueue_for(&self, task: DownloadTask, timeout: Duration) -> Result<()> {
        match tokio::time::timeout(timeout, self.enqueue(task)).await {
            Ok(result) => result,
            Err(_) => Err(Error::CapacityTimeout(timeout)),
        }
    }

    /// Take the next task, waiting while the queue is empty.
    ///
    /// Fails with [`Error::QueueClosed`] once the queue is closed and drained.
    pub async fn dequeue(&self) -> Result<DownloadTask> {
        loop {
            let notified = self.not_empty.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.state.lock().await;
                if let Some(Reverse(queued)) = state.heap.pop() {
                    let more = !state.heap.is_empty();
                    drop(state);
                    self.not_full.notify_one();
                    if more {
                        // Pass the wakeup on in case another consumer consumed ours.
                        self.not_empty.notify_one();
                    }
                    return Ok(queued.task);
                }
                if state.closed {
                    return Err(Error::QueueClosed);
                }
            }

            notified.await;
        }
    }

    /// Refuse further enqueues and wake every waiter. Idempotent.
    pub async fn close(&self) {
        let newly_closed = {
            let mut state = self.state.lock().await;
            !std::mem::replace(&mut state.closed, true)
        };
        if newly_closed {
            tracing::debug!("Download queue closed");
        }
        self.not_empty.notify_waiters();
        self.not_full.notify_waiters();
    }

    pub async fn is_closed(&self) -> bool {
        self.state.lock().await.closed
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.heap.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::{ChannelId, ItemMetadata};
    use std::path::PathBuf;
    use std::sync::Arc;
    use tokio_test::{assert_err, assert_ok};

    fn task(channel: &str, sequence: u64) -> DownloadTask {
        DownloadTask::new(
            ChannelId::parse(channel).unwrap(),
            sequence,
            ItemMetadata::new(format!("{}.mp3", sequence), sequence * 1000, "https://x/1"),
            PathBuf::from("/tmp"),
        )
    }

    #[tokio::test]
    async fn test_releases_in_sequence_order_not_size() {
        let queue = DownloadQueue::new(10);
        for sequence in [12, 10, 11] {
            queue.enqueue(task("a", sequence)).await.unwrap();
        }

        let mut released = Vec::new();
        for _ in 0..3 {
            released.push(queue.dequeue().await.unwrap().sequence);
        }
        assert_eq!(released, vec![10, 11, 12]);
    }

    #[tokio::test]
    async fn test_equal_keys_release_fifo() {
        let queue = DownloadQueue::new(10);
        let mut first = task("a", 5);
        first.item.name = "first.mp3".into();
        let mut second = task("a", 5);
        second.item.name = "second.mp3".into();

        queue.enqueue(first).await.unwrap();
        queue.enqueue(second).await.unwrap();

        assert_eq!(queue.dequeue().await.unwrap().item.name, "first.mp3");
        assert_eq!(queue.dequeue().await.unwrap().item.name, "second.mp3");
    }

    #[tokio::test]
    async fn test_full_queue_blocks_until_closed() {
        let queue = Arc::new(DownloadQueue::new(2));
        queue.enqueue(task("a", 1)).await.unwrap();
        queue.enqueue(task("a", 2)).await.unwrap();

        let blocked = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.enqueue(task("a", 3)).await })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!blocked.is_finished());
        assert_eq!(queue.len().await, 2);

        queue.close().await;
        let outcome = blocked.await.unwrap();
        assert!(matches!(outcome, Err(Error::QueueClosed)));
        assert_eq!(queue.len().await, 2);
    }

    #[tokio::test]
    async fn test_full_queue_unblocks_on_dequeue() {
        let queue = Arc::new(DownloadQueue::new(1));
        queue.enqueue(task("a", 1)).await.unwrap();

        let waiting = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.enqueue(task("a", 2)).await })
        };

        assert_eq!(queue.dequeue().await.unwrap().sequence, 1);
        assert_ok!(waiting.await.unwrap());
        assert_eq!(queue.dequeue().await.unwrap().sequence, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_try_enqueue_for_times_out() {
        let queue = DownloadQueue::new(1);
        queue.enqueue(task("a", 1)).await.unwrap();

        let err = queue
            .try_enqueue_for(task("a", 2), Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::CapacityTimeout(_)));
    }

    #[tokio::test]
    async fn test_close_wakes_dequeuers_and_drains() {
        let queue = Arc::new(DownloadQueue::new(4));
        let waiters: Vec<_> = (0..3)
            .map(|_| {
                let queue = queue.clone();
                tokio::spawn(async move { queue.dequeue().await })
            })
            .collect();

        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.close().await;
        queue.close().await;

        for waiter in waiters {
            assert!(matches!(waiter.await.unwrap(), Err(Error::QueueClosed)));
        }
        assert!(queue.is_closed().await);
        assert_err!(queue.enqueue(task("a", 1)).await);
    }

    #[tokio::test]
    async fn test_pending_tasks_drain_after_close() {
        let queue = DownloadQueue::new(4);
        queue.enqueue(task("a", 2)).await.unwrap();
        queue.enqueue(task("a", 1)).await.unwrap();
        queue.close().await;

        assert_eq!(queue.dequeue().await.unwrap().sequence, 1);
        assert_eq!(queue.dequeue().await.unwrap().sequence, 2);
        assert!(matches!(queue.dequeue().await, Err(Error::QueueClosed)));
    }

    #[tokio::test]
    async fn test_channels_release_in_identity_order() {
        let queue = DownloadQueue::new(10);
        queue.enqueue(task("rock", 1)).await.unwrap();
        queue.enqueue(task("jazz", 9)).await.unwrap();
        queue.enqueue(task("jazz", 3)).await.unwrap();

        let mut released = Vec::new();
        for _ in 0..3 {
            let t = queue.dequeue().await.unwrap();
            released.push((t.channel.to_string(), t.sequence));
        }
        assert_eq!(
            released,
            vec![("jazz".into(), 3), ("jazz".into(), 9), ("rock".into(), 1)]
        );
    }
}
