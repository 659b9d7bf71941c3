use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use sha2::{Digest, Sha256};

/// Streaming SHA-256 accumulator reused for every file of a copy pass.
#[derive(Debug, Clone, Default)]
pub struct ContentDigest {
    hasher: Sha256,
}

impl ContentDigest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, chunk: &[u8]) {
        self.hasher.update(chunk);
    }

    /// Hex digest of everything fed so far. Resets the accumulator.
    pub fn finish(&mut self) -> String {
        hex::encode(self.hasher.finalize_reset())
    }
}

/// Hex SHA-256 of a whole file.
pub fn digest_file(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut digest = ContentDigest::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        digest.update(&buf[..n]);
    }
    Ok(digest.finish())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_finish_resets() {
        let mut digest = ContentDigest::new();
        digest.update(b"hello");
        let first = digest.finish();
        assert_eq!(
            first,
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
        digest.update(b"hel");
        digest.update(b"lo");
        assert_eq!(digest.finish(), first);
    }

    #[test]
    fn test_digest_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.txt");
        std::fs::write(&path, "hello").unwrap();
        assert_eq!(
            digest_file(&path).unwrap(),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }
}
