//! Progress bar utilities.

use std::sync::Arc;
use std::time::Duration;

use indicatif::{HumanBytes, HumanDuration, ProgressBar, ProgressStyle};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::download::{Coordinator, ProgressSnapshot, WorkerState};

const REFRESH_INTERVAL: Duration = Duration::from_millis(250);

/// Create a spinner for long-running operations.
pub fn create_spinner(message: &str) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
        spinner.set_style(style);
    }
    spinner.set_message(message.to_string());
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner
}

/// Create a progress bar for a single transfer.
pub fn create_download_bar(total: u64) -> ProgressBar {
    let bar = ProgressBar::new(total);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("{spinner:.green} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})")
    {
        bar.set_style(style.progress_chars("#>-"));
    }
    bar
}

/// One-line summary of a coordinator snapshot.
pub fn describe_snapshot(snapshot: &ProgressSnapshot) -> String {
    let fetching = snapshot
        .workers
        .iter()
        .filter(|w| w.state == WorkerState::Fetching)
        .count();
    let c = &snapshot.counters;
    let eta = snapshot
        .eta()
        .map(|eta| HumanDuration(eta).to_string())
        .unwrap_or_else(|| "unknown".to_string());

    format!(
        "{:.0}% | {} queued, {} outstanding | {} done, {} skipped, {} failed | {}/{} workers fetching | {} at {}/s | elapsed {}, ETA {}",
        snapshot.percent_complete(),
        snapshot.queue_len,
        snapshot.outstanding(),
        c.succeeded,
        c.skipped_duplicate,
        c.failed,
        fetching,
        snapshot.workers.len(),
        HumanBytes(c.bytes_transferred),
        HumanBytes(snapshot.bytes_per_second() as u64),
        HumanDuration(snapshot.elapsed),
        eta
    )
}

/// Spinner that redraws from [`Coordinator::progress`] until finished.
pub struct ProgressMonitor {
    stop: CancellationToken,
    handle: JoinHandle<()>,
}

impl ProgressMonitor {
    pub fn spawn(coordinator: Arc<Coordinator>) -> Self {
        let stop = CancellationToken::new();
        let token = stop.clone();

        let handle = tokio::spawn(async move {
            let spinner = create_spinner("Starting workers...");
            let mut ticker = tokio::time::interval(REFRESH_INTERVAL);

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        let snapshot = coordinator.progress().await;
                        spinner.set_message(describe_snapshot(&snapshot));
                    }
                }
            }

            spinner.finish_and_clear();
        });

        Self { stop, handle }
    }

    /// Stop redrawing and clear the spinner.
    pub async fn finish(self) {
        self.stop.cancel();
        if let Err(e) = self.handle.await {
            tracing::debug!(error = %e, "Progress monitor ended abnormally");
        }
    }
}
