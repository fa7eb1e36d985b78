//! Whole-file content hashing, used by the scanner for move/rename
//! adoption and not tied to any particular archive format.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use sha2::{Digest, Sha256};

use crate::error::Result;

const BUFFER_SIZE: usize = 1024 * 1024;

/// SHA-256 of a file's full contents, read in 1 MiB buffered chunks so
/// hashing a large archive doesn't require loading it into memory.
pub fn sha256_file(path: &Path) -> Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; BUFFER_SIZE];

    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn hashes_are_stable_and_content_sensitive() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.bin");
        let b = dir.path().join("b.bin");
        std::fs::File::create(&a).unwrap().write_all(b"hello").unwrap();
        std::fs::File::create(&b).unwrap().write_all(b"world").unwrap();

        let hash_a1 = sha256_file(&a).unwrap();
        let hash_a2 = sha256_file(&a).unwrap();
        let hash_b = sha256_file(&b).unwrap();

        assert_eq!(hash_a1, hash_a2);
        assert_ne!(hash_a1, hash_b);
    }
}
