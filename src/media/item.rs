//! Media item representation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::fs::naming::sanitize_filename;

/// Metadata of one remote item, as supplied by the source client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemMetadata {
    /// File name hint for the downloaded content.
    pub name: String,

    /// Expected size in bytes.
    pub size: u64,

    /// Remote locator handed to the content fetcher.
    #[serde(alias = "url")]
    pub locator: String,

    /// MIME type reported by the source, if any.
    #[serde(default)]
    pub mime_type: Option<String>,

    /// When the item was published in its channel.
    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,
}

impl ItemMetadata {
    /// Create metadata with the required fields only.
    pub fn new(name: impl Into<String>, size: u64, locator: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            size,
            locator: locator.into(),
            mime_type: None,
            published_at: None,
        }
    }

    /// MIME type from the source, or a guess from the file name.
    pub fn effective_mime_type(&self) -> String {
        match &self.mime_type {
            Some(mime) if !mime.trim().is_empty() => mime.clone(),
            _ => mime_guess::from_path(&self.name)
                .first_or_octet_stream()
                .essence_str()
                .to_string(),
        }
    }

    /// Size in mebibytes, for display.
    pub fn size_mb(&self) -> f64 {
        self.size as f64 / (1024.0 * 1024.0)
    }

    /// Check that the metadata is usable for a fetch.
    pub fn validate(&self) -> Result<()> {
        if self.locator.trim().is_empty() {
            return Err(Error::MalformedMetadata(format!(
                "item '{}' has no locator",
                self.name
            )));
        }

        sanitize_filename(&self.name)
            .map_err(|e| Error::MalformedMetadata(format!("bad file name: {}", e)))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mime_type_guess() {
        let item = ItemMetadata::new("track.mp3", 10, "https://example.com/1");
        assert_eq!(item.effective_mime_type(), "audio/mpeg");

        let mut reported = item.clone();
        reported.mime_type = Some("audio/ogg".into());
        assert_eq!(reported.effective_mime_type(), "audio/ogg");

        let unknown = ItemMetadata::new("blob", 10, "https://example.com/2");
        assert_eq!(unknown.effective_mime_type(), "application/octet-stream");
    }

    #[test]
    fn test_validate() {
        assert!(ItemMetadata::new("a.flac", 1, "https://x/a").validate().is_ok());
        assert!(ItemMetadata::new("a.flac", 1, "  ").validate().is_err());
        assert!(ItemMetadata::new("", 1, "https://x/a").validate().is_err());
        assert!(ItemMetadata::new("../a.flac", 1, "https://x/a")
            .validate()
            .is_err());
    }

    #[test]
    fn test_url_alias() {
        let item: ItemMetadata =
            serde_json::from_str(r#"{"name":"a.mp3","size":3,"url":"https://x/a"}"#).unwrap();
        assert_eq!(item.locator, "https://x/a");
        assert!(item.published_at.is_none());
    }
}
