// Fast-path copy for sources that already match the output profile

use std::fs;
use std::io::{Read, Write};
use std::path::Path;

use crate::constants::HASH_CHUNK_SIZE;
use crate::error::{LibraryError, Result};
use crate::hash;

/// Copy `source` to `dest`, then verify the written bytes by BLAKE3 read-back.
/// A failed copy leaves nothing at `dest`. Returns the verified hash.
pub fn copy_with_verify(source: &Path, dest: &Path) -> Result<String> {
    let result = copy_and_hash(source, dest).and_then(|expected| {
        if !hash::verify_hash(dest, &expected)? {
            return Err(LibraryError::Hash(format!(
                "Verification failed: {} does not match {}",
                dest.display(),
                source.display()
            )));
        }
        Ok(expected)
    });

    if result.is_err() {
        let _ = fs::remove_file(dest);
        return result;
    }

    // Preserve modification time
    if let Ok(modified) = fs::metadata(source).and_then(|m| m.modified()) {
        let _ = filetime::set_file_mtime(dest, filetime::FileTime::from_system_time(modified));
    }

    result
}

fn copy_and_hash(source: &Path, dest: &Path) -> Result<String> {
    let mut source_file = fs::File::open(source)?;
    let mut dest_file = fs::File::create(dest)?;
    let mut hasher = blake3::Hasher::new();
    let mut buffer = vec![0u8; HASH_CHUNK_SIZE];

    loop {
        let bytes_read = source_file.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
        dest_file.write_all(&buffer[..bytes_read])?;
    }
    dest_file.sync_all()?;

    Ok(hash::format_full_hash(&hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_copy_with_verify() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("in.mp3");
        let dest = dir.path().join("out.tmp.mp3");
        let data: Vec<u8> = (0..(HASH_CHUNK_SIZE + 4097)).map(|i| (i % 251) as u8).collect();
        fs::write(&src, &data).unwrap();

        let digest = copy_with_verify(&src, &dest).unwrap();
        assert_eq!(fs::read(&dest).unwrap(), data);
        assert_eq!(digest, hash::compute_full_hash(&src).unwrap());
    }

    #[test]
    fn test_copy_preserves_mtime() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("in.mp4");
        let dest = dir.path().join("out.mp4");
        fs::write(&src, b"movie").unwrap();
        let old = filetime::FileTime::from_unix_time(1_500_000_000, 0);
        filetime::set_file_mtime(&src, old).unwrap();

        copy_with_verify(&src, &dest).unwrap();
        let meta = fs::metadata(&dest).unwrap();
        assert_eq!(filetime::FileTime::from_last_modification_time(&meta), old);
    }

    #[test]
    fn test_copy_missing_source_leaves_nothing() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("out.mp4");
        assert!(copy_with_verify(&dir.path().join("gone.mp4"), &dest).is_err());
        assert!(!dest.exists());
    }
}
