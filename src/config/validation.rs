//! Configuration validation logic.

use std::sync::OnceLock;

use regex::Regex;

use crate::config::loader::Config;
use crate::error::{Error, Result};
use crate::media::ChannelId;

/// Maximum number of concurrent workers.
pub const MAX_WORKERS: usize = 5;

fn channel_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z0-9_.-]+$").expect("valid channel pattern"))
}

/// Validate the entire configuration.
///
/// `extra_channels` counts channels supplied outside the config file, such
/// as a manifest.
pub fn validate_config(config: &Config, extra_channels: usize) -> Result<()> {
    if config.channels.ids.is_empty() && extra_channels == 0 {
        return Err(Error::MissingConfig(
            "channels.ids (at least one channel required)".to_string(),
        ));
    }
    validate_channels(&config.channels.ids)?;
    validate_download(config)?;
    validate_rate_limit(config)?;
    validate_retry(config)?;
    Ok(())
}

/// Normalize and check every configured channel identifier.
pub fn validate_channels<S: AsRef<str>, I: IntoIterator<Item = S>>(
    ids: I,
) -> Result<Vec<ChannelId>> {
    let mut channels = Vec::new();

    for raw in ids {
        let raw = raw.as_ref();
        let channel = ChannelId::parse(raw).map_err(|e| Error::ConfigValidation {
            field: "channels.ids".to_string(),
            message: e.to_string(),
        })?;

        if !channel_pattern().is_match(channel.as_str()) {
            return Err(Error::ConfigValidation {
                field: "channels.ids".to_string(),
                message: format!(
                    "Channel '{}' contains invalid characters. Only alphanumeric, '.', '-' and '_' allowed.",
                    raw
                ),
            });
        }

        if !channels.contains(&channel) {
            channels.push(channel);
        }
    }

    Ok(channels)
}

fn validate_download(config: &Config) -> Result<()> {
    let download = &config.download;

    if download.workers == 0 || download.workers > MAX_WORKERS {
        return Err(Error::ConfigValidation {
            field: "download.workers".to_string(),
            message: format!(
                "Must be between 1 and {} (got {})",
                MAX_WORKERS, download.workers
            ),
        });
    }

    if download.queue_capacity == 0 {
        return Err(Error::ConfigValidation {
            field: "download.queue_capacity".to_string(),
            message: "Must be at least 1".to_string(),
        });
    }

    if download.fetch_timeout_secs == 0 {
        return Err(Error::ConfigValidation {
            field: "download.fetch_timeout_secs".to_string(),
            message: "Must be at least 1 second".to_string(),
        });
    }

    Ok(())
}

fn validate_rate_limit(config: &Config) -> Result<()> {
    let rate_limit = &config.rate_limit;

    if !rate_limit.requests_per_second.is_finite() || rate_limit.requests_per_second < 0.0 {
        return Err(Error::ConfigValidation {
            field: "rate_limit.requests_per_second".to_string(),
            message: format!(
                "Must be a finite number >= 0 (got {})",
                rate_limit.requests_per_second
            ),
        });
    }

    if rate_limit.burst_size == 0 {
        return Err(Error::ConfigValidation {
            field: "rate_limit.burst_size".to_string(),
            message: "Must be at least 1".to_string(),
        });
    }

    if rate_limit.acquire_timeout_secs == 0 {
        return Err(Error::ConfigValidation {
            field: "rate_limit.acquire_timeout_secs".to_string(),
            message: "Must be at least 1 second".to_string(),
        });
    }

    Ok(())
}

fn validate_retry(config: &Config) -> Result<()> {
    let retry = &config.retry;

    if !retry.backoff_multiplier.is_finite() || retry.backoff_multiplier < 1.0 {
        return Err(Error::ConfigValidation {
            field: "retry.backoff_multiplier".to_string(),
            message: format!("Must be >= 1.0 (got {})", retry.backoff_multiplier),
        });
    }

    if retry.max_delay_ms < retry.initial_delay_ms {
        return Err(Error::ConfigValidation {
            field: "retry.max_delay_ms".to_string(),
            message: format!(
                "Must not be smaller than initial_delay_ms ({} < {})",
                retry.max_delay_ms, retry.initial_delay_ms
            ),
        });
    }

    Ok(())
}
