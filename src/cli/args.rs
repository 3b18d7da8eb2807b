//! Command-line argument definitions using clap.

use clap::Parser;
use std::path::PathBuf;

use crate::config::Config;

/// Channel media fetcher CLI.
#[derive(Parser, Debug)]
#[command(
    name = "channel-fetch",
    version,
    about = "Fetch media items from channels with resumable tracking",
    long_about = "Downloads media items listed in a channel manifest with a bounded worker pool.\n\n\
                  Processed items and downloaded files are tracked per channel, so an \
                  interrupted run resumes where it stopped."
)]
pub struct Args {
    /// Path to configuration file.
    #[arg(short, long, default_value = "config.toml", env = "CHANNEL_FETCH_CONFIG")]
    pub config: PathBuf,

    /// JSON manifest listing the items of each channel.
    #[arg(short, long, env = "CHANNEL_FETCH_MANIFEST")]
    pub manifest: Option<PathBuf>,

    /// Base directory for downloads.
    #[arg(short = 'd', long = "directory", env = "CHANNEL_FETCH_DIR")]
    pub download_directory: Option<PathBuf>,

    /// Number of concurrent workers (1-5).
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Pending tasks held before producers block.
    #[arg(long)]
    pub queue_capacity: Option<usize>,

    /// Sustained fetch starts per second, 0 disables limiting.
    #[arg(long)]
    pub requests_per_second: Option<f64>,

    /// Fetches allowed back to back before the sustained rate applies.
    #[arg(long = "burst")]
    pub burst_size: Option<u32>,

    /// Retries for a transiently failing fetch.
    #[arg(long)]
    pub max_retries: Option<u32>,

    /// Seconds before a single fetch is abandoned.
    #[arg(long = "fetch-timeout")]
    pub fetch_timeout_secs: Option<u64>,

    /// Maximum files queued per channel this run, 0 for unlimited.
    #[arg(long = "max-files")]
    pub max_files: Option<usize>,

    /// Leave permanently failed items unprocessed so the next run retries them.
    #[arg(long)]
    pub retry_failed: bool,

    /// Print tracker statistics for every channel and exit.
    #[arg(long, conflicts_with = "cleanup")]
    pub stats: bool,

    /// Drop tracker records whose files are gone and exit.
    #[arg(long)]
    pub cleanup: bool,

    /// Hide progress output.
    #[arg(long, short)]
    pub quiet: bool,

    /// Enable debug logging.
    #[arg(long)]
    pub debug: bool,
}

impl Args {
    /// Merge CLI arguments into an existing config, overriding where specified.
    pub fn merge_into_config(&self, config: &mut Config) {
        if let Some(dir) = &self.download_directory {
            config.download.directory = Some(dir.clone());
        }

        if let Some(workers) = self.workers {
            config.download.workers = workers;
        }

        if let Some(capacity) = self.queue_capacity {
            config.download.queue_capacity = capacity;
        }

        if let Some(timeout) = self.fetch_timeout_secs {
            config.download.fetch_timeout_secs = timeout;
        }

        if let Some(max_files) = self.max_files {
            config.download.max_files_per_run = max_files;
        }

        // Only override when set, the file may already disable it
        if self.retry_failed {
            config.download.mark_failed_as_processed = false;
        }

        if let Some(rps) = self.requests_per_second {
            config.rate_limit.requests_per_second = rps;
        }

        if let Some(burst) = self.burst_size {
            config.rate_limit.burst_size = burst;
        }

        if let Some(retries) = self.max_retries {
            config.retry.max_retries = retries;
        }
    }

    /// Whether live progress should be drawn.
    pub fn show_progress(&self) -> bool {
        !self.quiet
    }
}
