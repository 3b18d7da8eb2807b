//! In-memory fetcher for pipeline tests.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::download::fetcher::ContentFetcher;
use crate::download::task::DownloadTask;
use crate::error::{Error, Result};
use crate::media::{ChannelId, ItemMetadata};
use crate::tracker::TrackerManager;

type ErrorFactory = Box<dyn Fn() -> Error + Send + Sync>;

/// Writes deterministic bytes per item name and can be told to fail.
#[derive(Default)]
pub(crate) struct ScriptedFetcher {
    failures: Mutex<HashMap<String, (u32, ErrorFactory)>>,
    started: Mutex<Vec<String>>,
    delay: Duration,
    fixed_content: Option<Vec<u8>>,
}

impl ScriptedFetcher {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Write the same bytes for every item.
    pub(crate) fn with_fixed_content(mut self, content: &[u8]) -> Self {
        self.fixed_content = Some(content.to_vec());
        self
    }

    /// Fail the next `times` fetches of `name` with the produced error.
    pub(crate) fn fail_times(
        &self,
        name: &str,
        times: u32,
        error: impl Fn() -> Error + Send + Sync + 'static,
    ) {
        self.failures
            .lock()
            .unwrap()
            .insert(name.to_string(), (times, Box::new(error)));
    }

    /// Item names in the order their fetches started.
    pub(crate) fn started(&self) -> Vec<String> {
        self.started.lock().unwrap().clone()
    }

    pub(crate) fn content_for(name: &str) -> Vec<u8> {
        format!("content of {}", name).into_bytes()
    }

    fn scripted_failure(&self, name: &str) -> Option<Error> {
        let mut failures = self.failures.lock().unwrap();
        let (remaining, make) = failures.get_mut(name)?;
        if *remaining == 0 {
            return None;
        }
        *remaining -= 1;
        Some(make())
    }
}

#[async_trait]
impl ContentFetcher for ScriptedFetcher {
    async fn fetch(&self, item: &ItemMetadata, destination: &Path) -> Result<PathBuf> {
        self.started.lock().unwrap().push(item.name.clone());

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        if let Some(error) = self.scripted_failure(&item.name) {
            return Err(error);
        }

        let content = match &self.fixed_content {
            Some(content) => content.clone(),
            None => Self::content_for(&item.name),
        };

        tokio::fs::create_dir_all(destination).await?;
        let path = destination.join(&item.name);
        tokio::fs::write(&path, content).await?;
        Ok(path)
    }
}

/// Task for item `<sequence>.mp3` of `channel`, landing in the channel's downloads dir.
pub(crate) fn task_for(manager: &TrackerManager, channel: &str, sequence: u64) -> DownloadTask {
    let channel = ChannelId::parse(channel).unwrap();
    let name = format!("{}.mp3", sequence);
    let size = ScriptedFetcher::content_for(&name).len() as u64;
    let item = ItemMetadata::new(
        name,
        size,
        format!("https://cdn.example/{}/{}", channel, sequence),
    );
    let destination = manager.downloads_dir(&channel);
    DownloadTask::new(channel, sequence, item, destination)
}

/// How [`spawn_http_server`] answers each request.
#[derive(Debug, Clone, Copy)]
pub(crate) enum ServerMode {
    /// Reply `body of <path>` and close.
    Echo,
    /// Send headers and ten of the promised bytes, then hang.
    Stall,
}

/// Minimal HTTP/1.1 server on a random local port. Returns its base URL.
pub(crate) async fn spawn_http_server(mode: ServerMode) -> String {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut buf = vec![0u8; 8192];
                let mut read = 0;
                while !buf[..read].windows(4).any(|w| w == b"\r\n\r\n") {
                    match socket.read(&mut buf[read..]).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => read += n,
                    }
                }
                let request = String::from_utf8_lossy(&buf[..read]).to_string();
                let path = request.split_whitespace().nth(1).unwrap_or("/").to_string();

                match mode {
                    ServerMode::Echo => {
                        let body = format!("body of {}", path);
                        let head = format!(
                            "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                            body.len()
                        );
                        let _ = socket.write_all(head.as_bytes()).await;
                        let _ = socket.write_all(body.as_bytes()).await;
                    }
                    ServerMode::Stall => {
                        let _ = socket
                            .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 1000\r\n\r\n0123456789")
                            .await;
                        tokio::time::sleep(Duration::from_secs(60)).await;
                    }
                }
            });
        }
    });

    format!("http://{}", addr)
}

/// Names of the entries in `dir`, sorted.
pub(crate) fn dir_entries(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .collect()
        })
        .unwrap_or_default();
    names.sort();
    names
}
