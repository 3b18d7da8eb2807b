//! channel-fetch - resumable, rate-limited media fetching for channels
//!
//! This library coordinates concurrent downloads of media items discovered
//! across independent channels.
//!
//! # Features
//!
//! - Bounded worker pool fed by a per-channel ordered queue
//! - Token-bucket rate limiting shared by all workers
//! - Bounded retry with exponential backoff for transient failures
//! - Per-channel tracking of processed items and downloaded files
//! - Content deduplication via SHA-256 fingerprints
//! - Resumable runs: processed items are never fetched twice
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use std::sync::Arc;
//! use std::time::Duration;
//! use channel_fetch::{
//!     enqueue_channel, load_manifest, Config, Coordinator, CoordinatorSettings, HttpFetcher,
//!     TrackerManager,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load(Path::new("config.toml"))?;
//!     let manifest = load_manifest(Path::new("manifest.json"))?;
//!
//!     let manager = Arc::new(TrackerManager::new(config.download_directory()));
//!     let fetcher = Arc::new(HttpFetcher::new(Duration::from_secs(30), false)?);
//!     let coordinator =
//!         Coordinator::new(CoordinatorSettings::from(&config), manager.clone(), fetcher);
//!     coordinator.start().await;
//!
//!     for entry in &manifest.channels {
//!         let channel = entry.channel_id()?;
//!         enqueue_channel(&coordinator, &manager, &channel, entry.ordered_items(), None).await?;
//!     }
//!
//!     let report = coordinator.finish().await?;
//!     println!("{} downloaded", report.counters.succeeded);
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod config;
pub mod download;
pub mod error;
pub mod fs;
pub mod media;
pub mod output;
pub mod tracker;

// Re-exports for convenience
pub use config::Config;
pub use download::{
    enqueue_channel, ChannelReport, Coordinator, CoordinatorSettings, DownloadTask, HttpFetcher,
    RunReport,
};
pub use error::{Error, ErrorKind, Result};
pub use media::{load_manifest, ChannelId, ItemMetadata, Manifest};
pub use tracker::TrackerManager;
