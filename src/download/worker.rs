//! Download worker.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use tokio::sync::watch;
use tokio::time::Instant;

use crate::download::coordinator::Shared;
use crate::download::task::{DownloadTask, RetryState, TaskKey};
use crate::error::{Error, ErrorKind, Result};
use crate::tracker::ChannelTrackers;

/// Where a worker is in its task cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkerState {
    Idle,
    Dequeuing,
    RateLimiting,
    Fetching,
    Recording,
    ShuttingDown,
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WorkerState::Idle => "idle",
            WorkerState::Dequeuing => "dequeuing",
            WorkerState::RateLimiting => "rate-limiting",
            WorkerState::Fetching => "fetching",
            WorkerState::Recording => "recording",
            WorkerState::ShuttingDown => "shutting down",
        };
        f.write_str(name)
    }
}

/// Observable status of one worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerStatus {
    pub id: usize,
    pub state: WorkerState,
    pub current: Option<TaskKey>,
}

/// How a single task ended, from the worker's point of view.
enum Outcome {
    Done,
    Cancelled,
}

pub(crate) struct Worker {
    id: usize,
    shared: Arc<Shared>,
    status: watch::Sender<WorkerStatus>,
}

impl Worker {
    pub(crate) fn new(id: usize, shared: Arc<Shared>) -> (Self, watch::Receiver<WorkerStatus>) {
        let (status, receiver) = watch::channel(WorkerStatus {
            id,
            state: WorkerState::Idle,
            current: None,
        });
        (Self { id, shared, status }, receiver)
    }

    fn set_state(&self, state: WorkerState) {
        self.status.send_modify(|status| status.state = state);
    }

    fn set_current(&self, current: Option<TaskKey>) {
        self.status.send_modify(|status| status.current = current);
    }

    /// Pull and process tasks until the queue is drained or the run is stopped.
    ///
    /// Returns an error only for fatal failures, after stopping the run.
    pub(crate) async fn run(self) -> Result<()> {
        tracing::debug!(worker_id = self.id, "Worker started");
        let shutdown = self.shared.shutdown.clone();

        let result = loop {
            self.set_state(WorkerState::Dequeuing);
            let next = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break Ok(()),
                next = self.shared.queue.dequeue() => next,
            };

            let task = match next {
                Ok(task) => task,
                Err(Error::QueueClosed) => break Ok(()),
                Err(e) => break Err(e),
            };

            self.set_current(Some(task.key()));
            let processed = self.process(task).await;
            self.set_current(None);
            self.set_state(WorkerState::Idle);

            if let Err(e) = processed {
                tracing::error!(worker_id = self.id, error = %e, "Fatal error, stopping run");
                shutdown.cancel();
                self.shared.queue.close().await;
                break Err(e);
            }
        };

        self.set_state(WorkerState::ShuttingDown);
        tracing::debug!(worker_id = self.id, "Worker stopped");
        result
    }

    async fn process(&self, task: DownloadTask) -> Result<()> {
        let key = task.key();
        self.shared.stats.record_attempt();

        let trackers = self.shared.manager.get_or_create(&task.channel).await?;

        if trackers.messages.has_processed(task.sequence).await {
            tracing::debug!(task = %key, "Already processed, skipping");
            self.shared.stats.record_skip();
            return Ok(());
        }

        if let Some(reason) = trackers.files.should_skip_file(task.sequence, &task.item).await {
            tracing::info!(task = %key, file = %task.item.name, %reason, "Skipping duplicate");
            trackers.messages.mark_processed(task.sequence).await?;
            self.shared.stats.record_skip();
            return Ok(());
        }

        let mut retry = RetryState::default();
        loop {
            self.set_state(WorkerState::RateLimiting);
            match self.admit(&key).await {
                Ok(Outcome::Done) => {}
                Ok(Outcome::Cancelled) => {
                    self.shared.stats.record_cancelled();
                    return Ok(());
                }
                Err(e) => return self.record_failure(&trackers, &task, e).await,
            }

            self.set_state(WorkerState::Fetching);
            tracing::info!(
                worker_id = self.id,
                task = %key,
                file = %task.item.name,
                bytes = task.item.size,
                attempt = retry.attempts + 1,
                "Downloading"
            );

            match self.fetch(&task).await {
                Ok(path) => {
                    self.set_state(WorkerState::Recording);
                    return self.record_success(&trackers, &task, &path, retry).await;
                }
                Err(e) if e.kind() == ErrorKind::Fatal => return Err(e),
                Err(e) if self.shared.policy.should_retry(&e, retry.attempts + 1) => {
                    let delay = self.shared.policy.delay_for(retry.attempts + 1, &e);
                    retry.record_failure(Instant::now() + delay);
                    self.shared.stats.record_retry(&key).await;

                    tracing::warn!(
                        worker_id = self.id,
                        task = %key,
                        error = %e,
                        attempt = retry.attempts,
                        max_retries = self.shared.policy.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        "Fetch failed, retrying"
                    );

                    if let Some(next) = retry.next_eligible {
                        tokio::select! {
                            _ = self.shared.shutdown.cancelled() => {
                                tracing::info!(task = %key, "Stopped during backoff, leaving unprocessed");
                                self.shared.stats.record_cancelled();
                                return Ok(());
                            }
                            _ = tokio::time::sleep_until(next) => {}
                        }
                    }
                }
                Err(e) => return self.record_failure(&trackers, &task, e).await,
            }
        }
    }

    /// Acquire a rate-limiter permit, retrying the admission on deadline.
    async fn admit(&self, key: &TaskKey) -> Result<Outcome> {
        let max_attempts = self.shared.policy.max_retries + 1;
        let mut attempts = 0;

        loop {
            let acquired = tokio::select! {
                _ = self.shared.shutdown.cancelled() => return Ok(Outcome::Cancelled),
                acquired = self.shared.limiter.acquire(self.id) => acquired,
            };

            match acquired {
                Ok(()) => return Ok(Outcome::Done),
                Err(e) => {
                    attempts += 1;
                    if attempts >= max_attempts {
                        return Err(e);
                    }
                    tracing::warn!(
                        worker_id = self.id,
                        task = %key,
                        attempts,
                        "Rate limiter deadline elapsed, retrying admission"
                    );
                }
            }
        }
    }

    async fn fetch(&self, task: &DownloadTask) -> Result<std::path::PathBuf> {
        let timeout = self.shared.settings.fetch_timeout;
        match tokio::time::timeout(
            timeout,
            self.shared.fetcher.fetch(&task.item, &task.destination),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(Error::FetchTimeout(timeout.as_secs())),
        }
    }

    /// Record the file, then the message, in that order.
    async fn record_success(
        &self,
        trackers: &ChannelTrackers,
        task: &DownloadTask,
        path: &Path,
        retry: RetryState,
    ) -> Result<()> {
        let tracked = match trackers
            .files
            .track_downloaded_file(task.sequence, &task.item, path)
            .await
        {
            Ok(tracked) => tracked,
            Err(e) if e.kind() == ErrorKind::Fatal => return Err(e),
            Err(e) => return self.record_failure(trackers, task, e).await,
        };

        trackers.messages.mark_processed(task.sequence).await?;

        let bytes = match tokio::fs::metadata(path).await {
            Ok(metadata) => metadata.len(),
            Err(_) => task.item.size,
        };

        if tracked.duplicate {
            tracing::info!(
                task = %task.key(),
                path = %path.display(),
                "Downloaded content duplicates a tracked file"
            );
            self.shared.stats.record_content_duplicate(bytes);
        } else {
            tracing::info!(
                worker_id = self.id,
                task = %task.key(),
                path = %path.display(),
                retries = retry.attempts,
                "Completed"
            );
            self.shared.stats.record_success(bytes);
        }

        Ok(())
    }

    /// Record a non-fatal failure and apply the processed-on-failure policy.
    async fn record_failure(
        &self,
        trackers: &ChannelTrackers,
        task: &DownloadTask,
        error: Error,
    ) -> Result<()> {
        tracing::warn!(
            worker_id = self.id,
            task = %task.key(),
            kind = %error.kind(),
            error = %error,
            "Task failed"
        );
        self.shared
            .stats
            .record_failure(&task.channel, task.sequence, &error)
            .await;

        if self.shared.settings.mark_failed_as_processed {
            trackers.messages.mark_processed(task.sequence).await?;
        }

        Ok(())
    }
}
