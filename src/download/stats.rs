//! Run statistics.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::Mutex;

use crate::download::task::TaskKey;
use crate::error::{Error, ErrorKind};
use crate::media::ChannelId;

/// Aggregate counters for a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunCounters {
    /// Tasks taken by a worker.
    pub attempted: u64,
    pub succeeded: u64,
    /// Skipped before fetch, or fetched content that was already tracked.
    pub skipped_duplicate: u64,
    pub failed: u64,
    /// Tasks abandoned because the run was stopped.
    pub cancelled: u64,
    pub bytes_transferred: u64,
    /// Fetch retries across all tasks.
    pub retries: u64,
}

/// One failed task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureRecord {
    pub channel: ChannelId,
    pub sequence: u64,
    pub kind: ErrorKind,
    pub message: String,
}

/// Final statistics of a coordinator run.
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub counters: RunCounters,
    pub failures: Vec<FailureRecord>,
    /// Retries per task, only tasks that were retried at least once.
    pub retry_counts: BTreeMap<TaskKey, u32>,
    pub elapsed: Duration,
}

impl RunReport {
    /// Share of attempted tasks that ended without failure, in percent.
    pub fn success_rate(&self) -> f64 {
        let settled = self.counters.succeeded + self.counters.skipped_duplicate;
        if self.counters.attempted == 0 {
            return 100.0;
        }
        settled as f64 / self.counters.attempted as f64 * 100.0
    }

    pub fn has_failures(&self) -> bool {
        self.counters.failed > 0
    }

    pub fn retries_for(&self, channel: &ChannelId, sequence: u64) -> u32 {
        self.retry_counts
            .get(&TaskKey {
                channel: channel.clone(),
                sequence,
            })
            .copied()
            .unwrap_or(0)
    }
}

/// Counters shared by every worker of a run.
#[derive(Debug, Default)]
pub struct RunStats {
    attempted: AtomicU64,
    succeeded: AtomicU64,
    skipped_duplicate: AtomicU64,
    failed: AtomicU64,
    cancelled: AtomicU64,
    bytes_transferred: AtomicU64,
    retries: AtomicU64,
    failures: Mutex<Vec<FailureRecord>>,
    retry_counts: Mutex<BTreeMap<TaskKey, u32>>,
}

impl RunStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_attempt(&self) {
        self.attempted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_success(&self, bytes: u64) {
        self.succeeded.fetch_add(1, Ordering::Relaxed);
        self.bytes_transferred.fetch_add(bytes, Ordering::Relaxed);
    }

    /// A duplicate found before fetching.
    pub fn record_skip(&self) {
        self.skipped_duplicate.fetch_add(1, Ordering::Relaxed);
    }

    /// Content fetched but already tracked under another sequence.
    pub fn record_content_duplicate(&self, bytes: u64) {
        self.skipped_duplicate.fetch_add(1, Ordering::Relaxed);
        self.bytes_transferred.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn record_cancelled(&self) {
        self.cancelled.fetch_add(1, Ordering::Relaxed);
    }

    pub async fn record_retry(&self, key: &TaskKey) {
        self.retries.fetch_add(1, Ordering::Relaxed);
        *self.retry_counts.lock().await.entry(key.clone()).or_insert(0) += 1;
    }

    pub async fn record_failure(&self, channel: &ChannelId, sequence: u64, error: &Error) {
        self.failed.fetch_add(1, Ordering::Relaxed);
        self.failures.lock().await.push(FailureRecord {
            channel: channel.clone(),
            sequence,
            kind: error.kind(),
            message: error.to_string(),
        });
    }

    pub fn counters(&self) -> RunCounters {
        RunCounters {
            attempted: self.attempted.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            skipped_duplicate: self.skipped_duplicate.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            cancelled: self.cancelled.load(Ordering::Relaxed),
            bytes_transferred: self.bytes_transferred.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
        }
    }

    pub async fn report(&self, elapsed: Duration) -> RunReport {
        let mut failures = self.failures.lock().await.clone();
        failures.sort_by(|a, b| (&a.channel, a.sequence).cmp(&(&b.channel, b.sequence)));

        RunReport {
            counters: self.counters(),
            failures,
            retry_counts: self.retry_counts.lock().await.clone(),
            elapsed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel() -> ChannelId {
        ChannelId::parse("jazz").unwrap()
    }

    #[tokio::test]
    async fn test_report_aggregates() {
        let stats = RunStats::new();
        for _ in 0..4 {
            stats.record_attempt();
        }
        stats.record_success(100);
        stats.record_success(50);
        stats.record_skip();
        stats
            .record_failure(&channel(), 9, &Error::NotFound("gone".into()))
            .await;

        let key = TaskKey {
            channel: channel(),
            sequence: 7,
        };
        stats.record_retry(&key).await;
        stats.record_retry(&key).await;

        let report = stats.report(Duration::from_secs(2)).await;
        assert_eq!(report.counters.succeeded, 2);
        assert_eq!(report.counters.bytes_transferred, 150);
        assert_eq!(report.counters.retries, 2);
        assert_eq!(report.retries_for(&channel(), 7), 2);
        assert_eq!(report.retries_for(&channel(), 8), 0);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].kind, ErrorKind::Permanent);
        assert!(report.has_failures());
        assert!((report.success_rate() - 75.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_empty_run_success_rate() {
        assert_eq!(RunReport::default().success_rate(), 100.0);
    }
}
