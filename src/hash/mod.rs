// Hashing module using BLAKE3

use std::fs::File;
use std::io::Read;
use std::path::Path;
use crate::constants::HASH_CHUNK_SIZE;
use crate::error::{LibraryError, Result};

/// Feed a reader through BLAKE3 in fixed-size chunks
pub fn hash_reader<R: Read>(reader: &mut R) -> Result<blake3::Hash> {
    let mut hasher = blake3::Hasher::new();
    let mut buffer = vec![0u8; HASH_CHUNK_SIZE];

    loop {
        let bytes_read = reader.read(&mut buffer)
            .map_err(|e| LibraryError::Hash(format!("Failed to read: {}", e)))?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(hasher.finalize())
}

/// Compute full BLAKE3 hash of entire file
/// Format: "blake3:full:<hex>"
pub fn compute_full_hash(path: &Path) -> Result<String> {
    let mut file = File::open(path)
        .map_err(|e| LibraryError::Hash(format!("Failed to open {}: {}", path.display(), e)))?;
    let hash = hash_reader(&mut file)?;
    Ok(format_full_hash(&hash))
}

pub fn format_full_hash(hash: &blake3::Hash) -> String {
    format!("blake3:full:{}", hash.to_hex())
}

/// Verify a file matches its stored hash
pub fn verify_hash(path: &Path, expected_hash: &str) -> Result<bool> {
    Ok(compute_full_hash(path)? == expected_hash)
}
