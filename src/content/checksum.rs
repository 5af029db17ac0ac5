//! Chunked content digests using BLAKE3
//!
//! Files can be many gigabytes, so content is never loaded whole: it is read
//! in fixed-size chunks fed to an incremental hasher. Peak memory is one
//! chunk regardless of file size.
//!
//! The digest is the first 128 bits of the BLAKE3 output rendered as 32 hex
//! characters, which is the width of the `file.digest` column.

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Length of a rendered digest in hex characters
pub const DIGEST_HEX_LEN: usize = 32;

/// Default read chunk size (16 MiB)
pub const DEFAULT_CHUNK_SIZE: usize = 1 << 24;

/// Compute the digest of an in-memory buffer
///
/// # Example
///
/// ```
/// use fs_inventory::content::checksum::digest_bytes;
///
/// let hash = digest_bytes(b"Hello, World!");
/// assert_eq!(hash.len(), 32);
/// ```
pub fn digest_bytes(content: &[u8]) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(content);
    render(&hasher)
}

/// Compute the digest of everything `reader` yields, reading `buf.len()` bytes at a time
///
/// When `cancel` is raised the read stops before the next chunk and an
/// [`io::ErrorKind::Interrupted`] error is returned.
pub fn digest_reader<R: Read>(
    mut reader: R,
    buf: &mut [u8],
    cancel: Option<&AtomicBool>,
) -> io::Result<String> {
    let mut hasher = blake3::Hasher::new();
    loop {
        if cancel.is_some_and(|c| c.load(Ordering::Relaxed)) {
            return Err(io::Error::new(io::ErrorKind::Interrupted, "digest cancelled"));
        }
        let n = match reader.read(buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        hasher.update(&buf[..n]);
    }
    Ok(render(&hasher))
}

fn render(hasher: &blake3::Hasher) -> String {
    let mut hex = hasher.finalize().to_hex();
    hex.truncate(DIGEST_HEX_LEN);
    hex.to_string()
}

/// Reusable chunked file hasher
///
/// Owns the read buffer so a crawl allocates it once, on the first file it
/// hashes, instead of once per file.
#[derive(Debug)]
pub struct ContentHasher {
    chunk_size: usize,
    buf: Vec<u8>,
    cancel: Option<Arc<AtomicBool>>,
}

impl ContentHasher {
    /// Create a hasher reading `chunk_size` bytes per read (minimum 1)
    pub fn new(chunk_size: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            buf: Vec::new(),
            cancel: None,
        }
    }

    /// Abandon a digest in progress once `flag` is raised
    pub fn with_cancel(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    /// Configured chunk size in bytes
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Digest the full content of the file at `path`
    ///
    /// Fails if the file cannot be opened, a read fails part-way or the
    /// cancel flag is raised between chunks; the caller decides how to
    /// record that.
    pub fn digest_file(&mut self, path: &Path) -> io::Result<String> {
        let file = File::open(path)?;
        if self.buf.len() != self.chunk_size {
            self.buf = vec![0u8; self.chunk_size];
        }
        digest_reader(file, &mut self.buf, self.cancel.as_deref())
    }
}

impl Default for ContentHasher {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_digest_bytes() {
        let data = b"Hello, World!";
        let hash = digest_bytes(data);

        assert_eq!(hash.len(), DIGEST_HEX_LEN);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));

        // Same content should produce same hash
        assert_eq!(hash, digest_bytes(data));

        // Different content should produce different hash
        assert_ne!(hash, digest_bytes(b"Hello, World?"));
    }

    #[test]
    fn test_empty_file() {
        let file = NamedTempFile::new().unwrap();
        let mut hasher = ContentHasher::new(64);
        let hash = hasher.digest_file(file.path()).unwrap();
        assert_eq!(hash, digest_bytes(b""));
    }

    #[test]
    fn test_chunk_size_does_not_change_digest() {
        let content: Vec<u8> = (0..100_000u32).map(|i| (i % 251) as u8).collect();
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(&content).unwrap();
        file.flush().unwrap();

        let one_byte = ContentHasher::new(1).digest_file(file.path()).unwrap();
        let odd = ContentHasher::new(4099).digest_file(file.path()).unwrap();
        let default = ContentHasher::default().digest_file(file.path()).unwrap();

        assert_eq!(one_byte, default);
        assert_eq!(odd, default);
        assert_eq!(default, digest_bytes(&content));
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut hasher = ContentHasher::default();
        let err = hasher.digest_file(&dir.path().join("nope")).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn test_cancel_stops_between_chunks() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(&[7u8; 4096]).unwrap();
        file.flush().unwrap();

        let flag = Arc::new(AtomicBool::new(false));
        let mut hasher = ContentHasher::new(512).with_cancel(Arc::clone(&flag));
        assert_eq!(
            hasher.digest_file(file.path()).unwrap(),
            digest_bytes(&[7u8; 4096])
        );

        flag.store(true, Ordering::SeqCst);
        let err = hasher.digest_file(file.path()).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::Interrupted);
    }

    #[test]
    fn test_reader_cancel_after_partial_read() {
        struct Raising<'a> {
            data: &'a [u8],
            flag: &'a AtomicBool,
        }
        impl Read for Raising<'_> {
            fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
                // Raise the flag as soon as the first chunk is handed out
                self.flag.store(true, Ordering::SeqCst);
                let n = buf.len().min(self.data.len());
                buf[..n].copy_from_slice(&self.data[..n]);
                self.data = &self.data[n..];
                Ok(n)
            }
        }

        let flag = AtomicBool::new(false);
        let reader = Raising {
            data: &[1u8; 100],
            flag: &flag,
        };
        let mut buf = [0u8; 10];
        let err = digest_reader(reader, &mut buf, Some(&flag)).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::Interrupted);
    }

    #[test]
    fn test_zero_chunk_size_clamped() {
        assert_eq!(ContentHasher::new(0).chunk_size(), 1);
    }
}
