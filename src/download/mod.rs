//! Download module.
//!
//! This module provides:
//! - Priority queue with backpressure
//! - Token-bucket rate limiting
//! - Bounded retry with backoff
//! - The worker pool and its coordinator
//! - The HTTP content fetcher

pub mod coordinator;
pub mod fetcher;
pub mod http;
pub mod limiter;
pub mod producer;
pub mod queue;
pub mod retry;
pub mod stats;
pub mod task;
pub mod worker;

#[cfg(test)]
pub(crate) mod test_support;

pub use coordinator::{Coordinator, CoordinatorSettings, ProgressSnapshot};
pub use fetcher::ContentFetcher;
pub use http::HttpFetcher;
pub use limiter::RateLimiter;
pub use producer::{enqueue_channel, ChannelReport};
pub use queue::DownloadQueue;
pub use retry::RetryPolicy;
pub use stats::{FailureRecord, RunCounters, RunReport};
pub use task::{DownloadTask, RetryState, TaskKey};
pub use worker::{WorkerState, WorkerStatus};
