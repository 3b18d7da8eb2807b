//! Configuration module for channel-fetch.
//!
//! This module handles:
//! - Loading configuration from TOML files
//! - Configuration validation
//!
//! CLI overrides are merged in by [`crate::cli::Args::merge_into_config`].

pub mod loader;
pub mod validation;

pub use loader::{ChannelsConfig, Config, DownloadConfig, RateLimitConfig, RetryConfig};
pub use validation::{validate_channels, validate_config, MAX_WORKERS};
