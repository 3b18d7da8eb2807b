//! Worker pool coordination.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::download::fetcher::ContentFetcher;
use crate::download::limiter::RateLimiter;
use crate::download::queue::DownloadQueue;
use crate::download::retry::RetryPolicy;
use crate::download::stats::{RunCounters, RunReport, RunStats};
use crate::download::task::DownloadTask;
use crate::download::worker::{Worker, WorkerStatus};
use crate::error::{Error, Result};
use crate::media::ChannelId;
use crate::tracker::TrackerManager;

/// Runtime parameters of a coordinator.
#[derive(Debug, Clone)]
pub struct CoordinatorSettings {
    pub workers: usize,
    pub queue_capacity: usize,
    pub fetch_timeout: Duration,
    pub requests_per_second: f64,
    pub burst_size: u32,
    pub acquire_timeout: Duration,
    pub retry: RetryPolicy,
    /// Mark permanently failed tasks processed so they are not offered again.
    pub mark_failed_as_processed: bool,
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self {
            workers: 3,
            queue_capacity: 100,
            fetch_timeout: Duration::from_secs(300),
            requests_per_second: 2.0,
            burst_size: 5,
            acquire_timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
            mark_failed_as_processed: true,
        }
    }
}

impl From<&Config> for CoordinatorSettings {
    fn from(config: &Config) -> Self {
        Self {
            workers: config.download.workers,
            queue_capacity: config.download.queue_capacity,
            fetch_timeout: Duration::from_secs(config.download.fetch_timeout_secs),
            requests_per_second: config.rate_limit.requests_per_second,
            burst_size: config.rate_limit.burst_size,
            acquire_timeout: Duration::from_secs(config.rate_limit.acquire_timeout_secs),
            retry: RetryPolicy::from(&config.retry),
            mark_failed_as_processed: config.download.mark_failed_as_processed,
        }
    }
}

/// State shared between the coordinator and its workers.
pub(crate) struct Shared {
    pub queue: DownloadQueue,
    pub limiter: RateLimiter,
    pub manager: Arc<TrackerManager>,
    pub fetcher: Arc<dyn ContentFetcher>,
    pub stats: RunStats,
    pub policy: RetryPolicy,
    pub settings: CoordinatorSettings,
    pub shutdown: CancellationToken,
}

/// Point-in-time view of a running coordinator.
#[derive(Debug, Clone)]
pub struct ProgressSnapshot {
    pub queue_len: usize,
    pub queued_total: u64,
    pub workers: Vec<WorkerStatus>,
    pub counters: RunCounters,
    /// Time since the workers were started.
    pub elapsed: Duration,
}

impl ProgressSnapshot {
    /// Tasks that reached a final outcome.
    pub fn settled(&self) -> u64 {
        let c = &self.counters;
        c.succeeded + c.skipped_duplicate + c.failed + c.cancelled
    }

    /// Tasks submitted but not settled yet.
    pub fn outstanding(&self) -> u64 {
        self.queued_total.saturating_sub(self.settled())
    }

    /// Share of submitted tasks already settled, 0 to 100.
    pub fn percent_complete(&self) -> f64 {
        if self.queued_total == 0 {
            return 0.0;
        }
        self.settled().min(self.queued_total) as f64 * 100.0 / self.queued_total as f64
    }

    /// Average transfer rate since start.
    pub fn bytes_per_second(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs <= 0.0 {
            return 0.0;
        }
        self.counters.bytes_transferred as f64 / secs
    }

    /// Remaining time at the average pace so far.
    ///
    /// `None` until at least one task settled.
    pub fn eta(&self) -> Option<Duration> {
        let settled = self.settled();
        if settled == 0 {
            return None;
        }
        let per_task = self.elapsed.as_secs_f64() / settled as f64;
        Some(Duration::from_secs_f64(per_task * self.outstanding() as f64))
    }
}

/// Owns the queue, the rate limiter and a fixed pool of workers.
///
/// Tasks are submitted with [`submit`](Self::submit) while the workers run.
/// [`finish`](Self::finish) closes the queue, waits for the workers to drain
/// it and returns the run report. [`stop`](Self::stop) ends the run early:
/// workers finish the fetch they hold and leave the rest unprocessed.
pub struct Coordinator {
    shared: Arc<Shared>,
    handles: Mutex<Vec<JoinHandle<Result<()>>>>,
    statuses: Mutex<Vec<watch::Receiver<WorkerStatus>>>,
    started: AtomicBool,
    queued_total: AtomicU64,
    started_at: Mutex<Option<Instant>>,
}

impl Coordinator {
    pub fn new(
        settings: CoordinatorSettings,
        manager: Arc<TrackerManager>,
        fetcher: Arc<dyn ContentFetcher>,
    ) -> Self {
        let shared = Shared {
            queue: DownloadQueue::new(settings.queue_capacity),
            limiter: RateLimiter::new(
                settings.requests_per_second,
                settings.burst_size,
                settings.acquire_timeout,
            ),
            manager,
            fetcher,
            stats: RunStats::new(),
            policy: settings.retry.clone(),
            settings,
            shutdown: CancellationToken::new(),
        };

        Self {
            shared: Arc::new(shared),
            handles: Mutex::new(Vec::new()),
            statuses: Mutex::new(Vec::new()),
            started: AtomicBool::new(false),
            queued_total: AtomicU64::new(0),
            started_at: Mutex::new(None),
        }
    }

    pub fn settings(&self) -> &CoordinatorSettings {
        &self.shared.settings
    }

    pub fn manager(&self) -> &Arc<TrackerManager> {
        &self.shared.manager
    }

    /// Spawn the worker pool. Calling it again has no effect.
    pub async fn start(&self) {
        if self.started.swap(true, Ordering::SeqCst) {
            tracing::warn!("Coordinator already started");
            return;
        }

        let count = self.shared.settings.workers.max(1);
        tracing::info!(
            workers = count,
            queue_capacity = self.shared.queue.capacity(),
            requests_per_second = self.shared.settings.requests_per_second,
            burst = self.shared.settings.burst_size,
            "Starting download workers"
        );

        *self.started_at.lock().await = Some(Instant::now());

        let mut handles = self.handles.lock().await;
        let mut statuses = self.statuses.lock().await;
        for id in 1..=count {
            let (worker, status) = Worker::new(id, self.shared.clone());
            statuses.push(status);
            handles.push(tokio::spawn(worker.run()));
        }
    }

    /// Queue a task, waiting while the queue is full.
    pub async fn submit(&self, task: DownloadTask) -> Result<()> {
        if self.shared.shutdown.is_cancelled() {
            return Err(Error::Cancelled);
        }
        self.shared.queue.enqueue(task).await?;
        self.queued_total.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Queue a task, giving up with [`Error::CapacityTimeout`] after `timeout`.
    pub async fn try_submit_for(&self, task: DownloadTask, timeout: Duration) -> Result<()> {
        if self.shared.shutdown.is_cancelled() {
            return Err(Error::Cancelled);
        }
        self.shared.queue.try_enqueue_for(task, timeout).await?;
        self.queued_total.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Count a task that was rejected before reaching the queue.
    pub(crate) async fn record_rejected(&self, channel: &ChannelId, sequence: u64, error: &Error) {
        self.shared.stats.record_attempt();
        self.shared
            .stats
            .record_failure(channel, sequence, error)
            .await;
    }

    pub fn mark_failed_as_processed(&self) -> bool {
        self.shared.settings.mark_failed_as_processed
    }

    /// Stop the run: close the queue and signal the workers.
    pub async fn stop(&self) {
        tracing::info!("Stopping download workers");
        self.shared.shutdown.cancel();
        self.shared.queue.close().await;
    }

    pub fn is_stopped(&self) -> bool {
        self.shared.shutdown.is_cancelled()
    }

    /// Token cancelled when the run stops, by request or on a fatal error.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shared.shutdown.clone()
    }

    /// Close the queue, wait for the workers and report.
    ///
    /// Returns the first fatal worker error instead of a report if one occurred.
    pub async fn finish(&self) -> Result<RunReport> {
        self.shared.queue.close().await;

        let handles: Vec<_> = self.handles.lock().await.drain(..).collect();
        let mut fatal = None;
        for handle in handles {
            let outcome = match handle.await {
                Ok(outcome) => outcome,
                Err(e) => Err(Error::Io(std::io::Error::other(e))),
            };
            if let Err(e) = outcome {
                if fatal.is_none() {
                    fatal = Some(e);
                }
            }
        }

        let report = self.report().await;
        tracing::info!(
            attempted = report.counters.attempted,
            succeeded = report.counters.succeeded,
            skipped = report.counters.skipped_duplicate,
            failed = report.counters.failed,
            elapsed_secs = report.elapsed.as_secs(),
            "Download run finished"
        );

        match fatal {
            Some(e) => Err(e),
            None => Ok(report),
        }
    }

    /// Report of the run so far.
    pub async fn report(&self) -> RunReport {
        let elapsed = self
            .started_at
            .lock()
            .await
            .map(|start| start.elapsed())
            .unwrap_or_default();
        self.shared.stats.report(elapsed).await
    }

    pub async fn progress(&self) -> ProgressSnapshot {
        let workers = self
            .statuses
            .lock()
            .await
            .iter()
            .map(|status| status.borrow().clone())
            .collect();

        let elapsed = self
            .started_at
            .lock()
            .await
            .map(|start| start.elapsed())
            .unwrap_or_default();

        ProgressSnapshot {
            queue_len: self.shared.queue.len().await,
            queued_total: self.queued_total.load(Ordering::Relaxed),
            workers,
            counters: self.shared.stats.counters(),
            elapsed,
        }
    }
}
