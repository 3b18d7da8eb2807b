//! Content fetcher seam.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::error::Result;
use crate::media::ItemMetadata;

/// Transfers the bytes of one remote item.
///
/// `destination` is the directory the file should land in. Implementations
/// return the final path of the written file and fail with
/// `Network`, `NotFound`, `QuotaExceeded` or an I/O error.
#[async_trait]
pub trait ContentFetcher: Send + Sync {
    async fn fetch(&self, item: &ItemMetadata, destination: &Path) -> Result<PathBuf>;
}
