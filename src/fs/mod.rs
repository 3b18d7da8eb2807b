//! Filesystem module.
//!
//! Provides:
//! - Per-channel directory layout
//! - Filename validation and collision handling

pub mod naming;
pub mod paths;

pub use naming::{partial_path, reserve_unique_path, sanitize_filename};
pub use paths::{channel_dir, downloads_dir, ensure_dir, file_tracker_path, message_tracker_path};
