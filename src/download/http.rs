//! HTTP content fetcher.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use indicatif::ProgressBar;
use reqwest::{header, Client, Response, StatusCode};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use url::Url;

use crate::download::fetcher::ContentFetcher;
use crate::error::{Error, Result};
use crate::fs::{partial_path, reserve_unique_path, sanitize_filename};
use crate::media::ItemMetadata;
use crate::output::create_download_bar;

/// Minimum file size to show progress bar (20 MB).
const PROGRESS_THRESHOLD: u64 = 20 * 1024 * 1024;

const USER_AGENT: &str = concat!("channel-fetch/", env!("CARGO_PKG_VERSION"));

/// Streams items over HTTP(S) into the destination directory.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    show_progress: bool,
}

impl HttpFetcher {
    pub fn new(connect_timeout: Duration, show_progress: bool) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            show_progress,
        })
    }

    async fn request(&self, url: Url) -> Result<Response> {
        let response = self.client.get(url.clone()).send().await.map_err(|e| {
            if e.is_timeout() || e.is_connect() || e.is_request() {
                Error::Network(format!("{}: {}", url, e))
            } else {
                Error::Http(e)
            }
        })?;

        classify_status(&url, &response)?;
        Ok(response)
    }

    fn progress_bar(&self, content_length: Option<u64>) -> Option<ProgressBar> {
        let length = content_length.filter(|l| *l > PROGRESS_THRESHOLD)?;
        if !self.show_progress {
            return None;
        }

        Some(create_download_bar(length))
    }
}

#[async_trait]
impl ContentFetcher for HttpFetcher {
    async fn fetch(&self, item: &ItemMetadata, destination: &Path) -> Result<PathBuf> {
        let url = parse_locator(&item.locator)?;
        let filename = sanitize_filename(&item.name)
            .map_err(|e| Error::MalformedMetadata(e.to_string()))?;

        tokio::fs::create_dir_all(destination).await?;

        let response = self.request(url).await?;
        let progress = self.progress_bar(response.content_length());

        let partial = RemoveOnDrop::new(partial_path(&destination.join(&filename)));
        let written = match stream_to_file(response, partial.path(), progress.as_ref()).await {
            Ok(written) => written,
            Err(e) => {
                if let Some(pb) = progress {
                    pb.abandon();
                }
                return Err(e);
            }
        };

        if let Some(pb) = progress {
            pb.finish_and_clear();
        }

        let final_name = reserve_unique_path(&destination.join(&filename)).await?;
        let reserved = RemoveOnDrop::new(final_name);
        tokio::fs::rename(partial.path(), reserved.path()).await?;
        partial.keep();
        let final_path = reserved.keep();

        tracing::debug!(
            path = %final_path.display(),
            bytes = written,
            "Downloaded file"
        );

        Ok(final_path)
    }
}

/// Deletes a file when dropped unless [`keep`](Self::keep) was called.
///
/// A fetch cut short by its deadline is dropped mid-stream, so cleanup
/// cannot wait for an error to come back.
struct RemoveOnDrop {
    path: PathBuf,
    armed: bool,
}

impl RemoveOnDrop {
    fn new(path: PathBuf) -> Self {
        Self { path, armed: true }
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn keep(mut self) -> PathBuf {
        self.armed = false;
        std::mem::take(&mut self.path)
    }
}

impl Drop for RemoveOnDrop {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => tracing::debug!(path = %self.path.display(), "Removed unfinished file"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(
                path = %self.path.display(),
                error = %e,
                "Failed to remove unfinished file"
            ),
        }
    }
}

async fn stream_to_file(
    response: Response,
    path: &Path,
    progress: Option<&ProgressBar>,
) -> Result<u64> {
    let mut file = File::create(path).await?;
    let mut stream = response.bytes_stream();
    let mut downloaded: u64 = 0;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| Error::Network(format!("Stream error: {}", e)))?;
        file.write_all(&chunk).await?;
        downloaded += chunk.len() as u64;

        if let Some(pb) = progress {
            pb.set_position(downloaded);
        }
    }

    file.flush().await?;
    file.sync_all().await?;
    Ok(downloaded)
}

/// Parse a locator, accepting only http and https URLs.
pub fn parse_locator(locator: &str) -> Result<Url> {
    let url = Url::parse(locator.trim())
        .map_err(|e| Error::MalformedMetadata(format!("invalid locator '{}': {}", locator, e)))?;

    match url.scheme() {
        "http" | "https" => Ok(url),
        scheme => Err(Error::MalformedMetadata(format!(
            "unsupported locator scheme '{}'",
            scheme
        ))),
    }
}

fn classify_status(url: &Url, response: &Response) -> Result<()> {
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }

    Err(status_error(url, status, retry_after(response)))
}

fn retry_after(response: &Response) -> Option<u64> {
    response
        .headers()
        .get(header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}

fn status_error(url: &Url, status: StatusCode, retry_after: Option<u64>) -> Error {
    match status {
        StatusCode::NOT_FOUND | StatusCode::GONE => {
            Error::NotFound(format!("{} returned HTTP {}", url, status))
        }
        StatusCode::TOO_MANY_REQUESTS => Error::QuotaExceeded { retry_after },
        s if s.is_server_error() => Error::Network(format!("{} returned HTTP {}", url, s)),
        s => Error::MalformedMetadata(format!("{} returned HTTP {}", url, s)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::download::test_support::{dir_entries, spawn_http_server, ServerMode};
    use crate::error::ErrorKind;

    fn url() -> Url {
        Url::parse("https://cdn.example/a.mp3").unwrap()
    }

    #[test]
    fn test_parse_locator() {
        assert!(parse_locator("https://cdn.example/a.mp3").is_ok());
        assert!(parse_locator(" http://cdn.example/a ").is_ok());
        assert!(matches!(
            parse_locator("ftp://cdn.example/a"),
            Err(Error::MalformedMetadata(_))
        ));
        assert!(matches!(
            parse_locator("not a url"),
            Err(Error::MalformedMetadata(_))
        ));
    }

    #[test]
    fn test_status_classification() {
        let not_found = status_error(&url(), StatusCode::NOT_FOUND, None);
        assert_eq!(not_found.kind(), ErrorKind::Permanent);
        assert!(matches!(
            status_error(&url(), StatusCode::GONE, None),
            Error::NotFound(_)
        ));

        let quota = status_error(&url(), StatusCode::TOO_MANY_REQUESTS, Some(12));
        assert_eq!(quota.kind(), ErrorKind::Transient);
        assert_eq!(quota.retry_after(), Some(Duration::from_secs(12)));

        let server = status_error(&url(), StatusCode::BAD_GATEWAY, None);
        assert_eq!(server.kind(), ErrorKind::Transient);

        let forbidden = status_error(&url(), StatusCode::FORBIDDEN, None);
        assert_eq!(forbidden.kind(), ErrorKind::Permanent);
    }

    #[tokio::test]
    async fn test_rejects_bad_locator_before_network() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = HttpFetcher::new(Duration::from_secs(1), false).unwrap();
        let item = ItemMetadata::new("a.mp3", 1, "file:///etc/passwd");

        let err = fetcher.fetch(&item, dir.path()).await.unwrap_err();
        assert!(matches!(err, Error::MalformedMetadata(_)));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_same_named_items_land_in_separate_files() {
        let dir = tempfile::tempdir().unwrap();
        let base = spawn_http_server(ServerMode::Echo).await;
        let fetcher = HttpFetcher::new(Duration::from_secs(5), false).unwrap();
        let first = ItemMetadata::new("dup.mp3", 0, format!("{}/a", base));
        let second = ItemMetadata::new("dup.mp3", 0, format!("{}/bb", base));

        for _ in 0..20 {
            let (a, b) = tokio::join!(
                fetcher.fetch(&first, dir.path()),
                fetcher.fetch(&second, dir.path())
            );
            let (a, b) = (a.unwrap(), b.unwrap());

            assert_ne!(a, b);
            assert_eq!(std::fs::read(&a).unwrap(), b"body of /a");
            assert_eq!(std::fs::read(&b).unwrap(), b"body of /bb");
            std::fs::remove_file(a).unwrap();
            std::fs::remove_file(b).unwrap();
        }
        assert!(dir_entries(dir.path()).is_empty());
    }

    #[tokio::test]
    async fn test_deadline_mid_stream_leaves_no_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let base = spawn_http_server(ServerMode::Stall).await;
        let fetcher = HttpFetcher::new(Duration::from_secs(5), false).unwrap();
        let item = ItemMetadata::new("song.mp3", 1000, format!("{}/song", base));

        let cut = tokio::time::timeout(
            Duration::from_millis(300),
            fetcher.fetch(&item, dir.path()),
        )
        .await;

        assert!(cut.is_err());
        assert!(dir.path().is_dir());
        assert!(dir_entries(dir.path()).is_empty());
    }
}
