//! Error types for the channel-fetch application.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Main error type for the application.
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration value for '{field}': {message}")]
    ConfigValidation { field: String, message: String },

    #[error("Missing required configuration: {0}")]
    MissingConfig(String),

    #[error("Invalid channel identifier '{raw}': {reason}")]
    InvalidChannel { raw: String, reason: String },

    // Fetch errors
    #[error("Network error: {0}")]
    Network(String),

    #[error("Remote item not found: {0}")]
    NotFound(String),

    #[error("Quota exceeded{}", retry_after_suffix(.retry_after))]
    QuotaExceeded { retry_after: Option<u64> },

    #[error("Fetch timed out after {0} seconds")]
    FetchTimeout(u64),

    #[error("Malformed item metadata: {0}")]
    MalformedMetadata(String),

    // Hashing errors
    #[error("Failed to hash {}: {source}", .path.display())]
    HashIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // Admission errors
    #[error("Download queue is closed")]
    QueueClosed,

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Download queue stayed full for {0:?}")]
    CapacityTimeout(std::time::Duration),

    #[error("Rate limiter permit not granted within {0:?}")]
    RateLimitTimeout(std::time::Duration),

    // Tracker persistence errors
    #[error("Failed to persist tracker {}: {source}", .path.display())]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Tracker document {} is corrupt: {source}", .path.display())]
    TrackerCorrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    // Filesystem errors
    #[error("Invalid filename (path traversal attempt): {0}")]
    InvalidFilename(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // HTTP errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    // URL parsing errors
    #[error("Invalid URL: {0}")]
    UrlParse(#[from] url::ParseError),
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

fn retry_after_suffix(retry_after: &Option<u64>) -> String {
    match retry_after {
        Some(secs) => format!(", retry after {} seconds", secs),
        None => String::new(),
    }
}

/// How the coordinator reacts to an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorKind {
    /// Retried with backoff up to the configured bound, then demoted to failed.
    Transient,
    /// Recorded as failed immediately.
    Permanent,
    /// Admission was refused; retry the admission, the task itself is fine.
    Capacity,
    /// Aborts the coordinator run.
    Fatal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Transient => write!(f, "transient"),
            ErrorKind::Permanent => write!(f, "permanent"),
            ErrorKind::Capacity => write!(f, "capacity"),
            ErrorKind::Fatal => write!(f, "fatal"),
        }
    }
}

impl Error {
    /// Classify this error for retry and reporting decisions.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Network(_) | Error::QuotaExceeded { .. } | Error::FetchTimeout(_) => {
                ErrorKind::Transient
            }
            Error::Http(e) => {
                if e.is_timeout() || e.is_connect() || e.is_request() || e.is_body() {
                    ErrorKind::Transient
                } else {
                    ErrorKind::Permanent
                }
            }
            Error::Io(e) => match e.kind() {
                std::io::ErrorKind::TimedOut
                | std::io::ErrorKind::Interrupted
                | std::io::ErrorKind::WouldBlock
                | std::io::ErrorKind::ConnectionReset
                | std::io::ErrorKind::ConnectionAborted
                | std::io::ErrorKind::BrokenPipe
                | std::io::ErrorKind::UnexpectedEof => ErrorKind::Transient,
                _ => ErrorKind::Permanent,
            },
            Error::NotFound(_)
            | Error::MalformedMetadata(_)
            | Error::HashIo { .. }
            | Error::InvalidFilename(_)
            | Error::UrlParse(_)
            | Error::Json(_) => ErrorKind::Permanent,
            Error::QueueClosed
            | Error::Cancelled
            | Error::CapacityTimeout(_)
            | Error::RateLimitTimeout(_) => ErrorKind::Capacity,
            Error::Persistence { .. }
            | Error::TrackerCorrupt { .. }
            | Error::Config(_)
            | Error::ConfigValidation { .. }
            | Error::MissingConfig(_)
            | Error::InvalidChannel { .. }
            | Error::TomlParse(_) => ErrorKind::Fatal,
        }
    }

    /// Whether retrying the same fetch could succeed.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }

    /// Server-provided wait hint, if any.
    pub fn retry_after(&self) -> Option<std::time::Duration> {
        match self {
            Error::QuotaExceeded {
                retry_after: Some(secs),
            } => Some(std::time::Duration::from_secs(*secs)),
            _ => None,
        }
    }
}

/// Process exit codes.
pub mod exit_codes {
    pub const SUCCESS: i32 = 0;
    pub const ABORT: i32 = 1;
    pub const CONFIG_ERROR: i32 = 3;
    pub const DOWNLOAD_ERROR: i32 = 4;
    pub const UNEXPECTED_ERROR: i32 = 5;
}
