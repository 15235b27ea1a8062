use std::fs::File;
use std::io::{self, BufReader};
use std::path::Path;

use sha2::{Digest, Sha256};

const BUFFER_SIZE: usize = 1024 * 1024; // 1MB buffer

/// Calculate the SHA-256 digest of a file as lowercase hex.
///
/// Returns `None` if:
/// - The file is larger than `max_bytes`
/// - The path is not a regular file
pub fn sha256_file(path: &Path, max_bytes: u64) -> io::Result<Option<String>> {
    let metadata = std::fs::metadata(path)?;
    if !metadata.is_file() || metadata.len() > max_bytes {
        return Ok(None);
    }

    let mut reader = BufReader::with_capacity(BUFFER_SIZE, File::open(path)?);
    let mut hasher = Sha256::new();
    io::copy(&mut reader, &mut hasher)?;

    Ok(Some(format!("{:x}", hasher.finalize())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_known_digest() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("abc.txt");
        fs::write(&path, b"abc").unwrap();

        assert_eq!(
            sha256_file(&path, 1024).unwrap().as_deref(),
            Some("ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad")
        );
    }

    #[test]
    fn test_size_cap() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("large.bin");
        fs::write(&path, vec![0u8; 2048]).unwrap();

        assert_eq!(sha256_file(&path, 1024).unwrap(), None);
        assert!(sha256_file(&path, 2048).unwrap().is_some());
    }

    #[test]
    fn test_directory_is_skipped() {
        let temp_dir = TempDir::new().unwrap();
        assert_eq!(sha256_file(temp_dir.path(), u64::MAX).unwrap(), None);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        assert!(sha256_file(&temp_dir.path().join("missing"), 1024).is_err());
    }
}
