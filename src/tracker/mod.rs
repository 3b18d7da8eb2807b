//! Tracking module.
//!
//! Provides:
//! - Processed-message records per channel
//! - Downloaded-file records keyed by SHA-256 fingerprint
//! - Atomic JSON persistence
//! - A registry that opens each channel's stores exactly once

pub mod document;
pub mod file;
pub mod hash;
pub mod manager;
pub mod message;

pub use file::{DownloadedFileRecord, FileTracker, FileTrackerStats, SkipReason, TrackedFile};
pub use hash::{fingerprint_bytes, fingerprint_file};
pub use manager::{ChannelStats, ChannelTrackers, FanOutReport, TrackerManager};
pub use message::{MessageTracker, MessageTrackerStats};
