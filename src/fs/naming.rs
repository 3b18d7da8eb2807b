//! Filename validation and collision handling.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tokio::fs::OpenOptions;

use crate::error::{Error, Result};

/// Characters replaced with `_` in stored file names.
const RESERVED_CHARS: [char; 7] = [':', '*', '?', '"', '<', '>', '|'];

/// Numbered candidates tried before falling back to a random suffix.
const MAX_NUMBERED_SUFFIX: u32 = 1000;

/// Turn an item name into a safe single file name.
///
/// Names that could escape the target directory are rejected outright;
/// reserved and control characters are replaced.
pub fn sanitize_filename(name: &str) -> Result<String> {
    let reject = |what: &str| {
        Err(Error::InvalidFilename(format!(
            "{} not allowed in filename: '{}'",
            what, name
        )))
    };

    if name.contains("..") {
        return reject("Path traversal");
    }
    if name.contains(['/', '\\']) {
        return reject("Path separators");
    }
    if name.contains('\0') {
        return reject("Null bytes");
    }

    let sanitized: String = name
        .trim()
        .chars()
        .map(|c| {
            if RESERVED_CHARS.contains(&c) || c.is_control() {
                '_'
            } else {
                c
            }
        })
        .collect();

    if sanitized.is_empty() {
        return Err(Error::InvalidFilename(
            "Filename cannot be empty or whitespace-only".to_string(),
        ));
    }

    Ok(sanitized)
}

/// `path`, then `stem_1.ext` through `stem_1000.ext`, then a random suffix.
fn candidate_paths(path: &Path) -> impl Iterator<Item = PathBuf> + '_ {
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("file");
    let ext = path.extension().and_then(|e| e.to_str());
    let candidate = move |suffix: String| {
        let name = match ext {
            Some(ext) => format!("{}_{}.{}", stem, suffix, ext),
            None => format!("{}_{}", stem, suffix),
        };
        path.with_file_name(name)
    };

    std::iter::once(path.to_path_buf())
        .chain((1..=MAX_NUMBERED_SUFFIX).map(move |n| candidate(n.to_string())))
        .chain(std::iter::once_with(move || {
            candidate(uuid::Uuid::new_v4().simple().to_string())
        }))
}

/// Claim the first free path among `path`, `stem_1.ext`, `stem_2.ext`, ...
///
/// The claim creates an empty file with `create_new`, so two callers racing
/// for the same name always end up with different paths. The caller is
/// expected to replace the placeholder (usually by renaming over it).
pub async fn reserve_unique_path(path: &Path) -> Result<PathBuf> {
    for candidate in candidate_paths(path) {
        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&candidate)
            .await
        {
            Ok(_) => return Ok(candidate),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(e.into()),
        }
    }

    Err(Error::InvalidFilename(format!(
        "no free file name for '{}'",
        path.display()
    )))
}

/// Hidden temporary path used while a transfer is in flight.
pub fn partial_path(final_path: &Path) -> PathBuf {
    let name = final_path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("download");
    let parent = final_path.parent().unwrap_or(Path::new("."));
    parent.join(format!(".{}.{}.part", name, uuid::Uuid::new_v4()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_filename_valid() {
        assert_eq!(sanitize_filename("normal.txt").unwrap(), "normal.txt");
        assert_eq!(sanitize_filename("file:name.txt").unwrap(), "file_name.txt");
        assert_eq!(
            sanitize_filename("file*with?special.txt").unwrap(),
            "file_with_special.txt"
        );
    }

    #[test]
    fn test_sanitize_filename_path_traversal() {
        assert!(sanitize_filename("../etc/passwd").is_err());
        assert!(sanitize_filename("..\\windows\\system32").is_err());
        assert!(sanitize_filename("foo/../bar").is_err());
    }

    #[test]
    fn test_sanitize_filename_rejects_separators_and_nulls() {
        assert!(sanitize_filename("path/to/file.txt").is_err());
        assert!(sanitize_filename("path\\to\\file.txt").is_err());
        assert!(sanitize_filename("file\0name.txt").is_err());
    }

    #[test]
    fn test_sanitize_filename_empty() {
        assert!(sanitize_filename("").is_err());
        assert!(sanitize_filename("   ").is_err());
        assert_eq!(sanitize_filename("  take five.mp3 ").unwrap(), "take five.mp3");
    }

    #[tokio::test]
    async fn test_reserve_unique_path_numbers_taken_names() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("song.mp3");
        assert_eq!(reserve_unique_path(&path).await.unwrap(), path);
        assert!(path.exists());

        assert_eq!(
            reserve_unique_path(&path).await.unwrap(),
            dir.path().join("song_1.mp3")
        );

        let bare = dir.path().join("README");
        std::fs::write(&bare, b"x").unwrap();
        assert_eq!(
            reserve_unique_path(&bare).await.unwrap(),
            dir.path().join("README_1")
        );
    }

    #[tokio::test]
    async fn test_concurrent_reservations_never_share_a_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dup.mp3");

        let claims = futures::future::join_all((0..8).map(|_| reserve_unique_path(&path))).await;
        let mut claimed: Vec<PathBuf> = claims.into_iter().map(|c| c.unwrap()).collect();
        claimed.sort();
        claimed.dedup();

        assert_eq!(claimed.len(), 8);
        assert!(claimed.contains(&path));
        assert!(claimed.contains(&dir.path().join("dup_7.mp3")));
    }

    #[test]
    fn test_partial_path_is_hidden_sibling() {
        let path = Path::new("/data/jazz/downloads/a.mp3");
        let partial = partial_path(path);
        assert_eq!(partial.parent(), path.parent());
        let name = partial.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with(".a.mp3."));
        assert!(name.ends_with(".part"));
    }
}
