//! Durable JSON documents.

use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::AsyncWriteExt;

use crate::error::{Error, Result};

/// Load a tracker document, `None` if it does not exist yet.
pub async fn load_document<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let content = match tokio::fs::read(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(Error::Persistence {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    serde_json::from_slice(&content)
        .map(Some)
        .map_err(|source| Error::TrackerCorrupt {
            path: path.to_path_buf(),
            source,
        })
}

/// Write a tracker document atomically.
///
/// The document is written to a sibling temp file, synced, then renamed over
/// the target so readers never observe a half-written document.
pub async fn save_document<T: Serialize>(path: &Path, document: &T) -> Result<()> {
    let persistence = |source| Error::Persistence {
        path: path.to_path_buf(),
        source,
    };

    let content = serde_json::to_vec_pretty(document)?;
    let temp_path = temp_path(path);

    let mut file = tokio::fs::File::create(&temp_path)
        .await
        .map_err(persistence)?;
    file.write_all(&content).await.map_err(persistence)?;
    file.sync_all().await.map_err(persistence)?;
    drop(file);

    if let Err(source) = tokio::fs::rename(&temp_path, path).await {
        let _ = tokio::fs::remove_file(&temp_path).await;
        return Err(persistence(source));
    }

    Ok(())
}

fn temp_path(path: &Path) -> PathBuf {
    path.with_extension("tmp")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Doc {
        values: Vec<u64>,
    }

    #[tokio::test]
    async fn test_missing_document_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let loaded: Option<Doc> = load_document(&dir.path().join("none.json"))
            .await
            .unwrap();
        assert!(loaded.is_none());
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.json");
        let doc = Doc {
            values: vec![1, 2, 3],
        };

        save_document(&path, &doc).await.unwrap();
        assert!(!temp_path(&path).exists());

        let loaded: Doc = load_document(&path).await.unwrap().unwrap();
        assert_eq!(loaded, doc);
    }

    #[tokio::test]
    async fn test_corrupt_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.json");
        tokio::fs::write(&path, b"{not json").await.unwrap();

        let err = load_document::<Doc>(&path).await.unwrap_err();
        assert!(matches!(err, Error::TrackerCorrupt { .. }));
    }

    #[tokio::test]
    async fn test_unwritable_location_is_persistence_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing-dir").join("doc.json");
        let err = save_document(&path, &Doc { values: vec![] })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Persistence { .. }));
    }
}
