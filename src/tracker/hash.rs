//! Content fingerprinting.

use std::path::Path;

use sha2::{Digest, Sha256};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, BufReader};

use crate::error::{Error, Result};

const READ_BUFFER_SIZE: usize = 64 * 1024;

/// Compute the SHA-256 fingerprint of a file as lowercase hex.
pub async fn fingerprint_file(path: &Path) -> Result<String> {
    let hash_io = |source| Error::HashIo {
        path: path.to_path_buf(),
        source,
    };

    let file = File::open(path).await.map_err(hash_io)?;
    let mut reader = BufReader::new(file);
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; READ_BUFFER_SIZE];

    loop {
        let bytes_read = reader.read(&mut buffer).await.map_err(hash_io)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

/// Fingerprint of an in-memory buffer, same format as [`fingerprint_file`].
pub fn fingerprint_bytes(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}
