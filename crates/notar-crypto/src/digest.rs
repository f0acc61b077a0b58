use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::Path;

use notar_types::Digest;
use sha2::{Digest as _, Sha256};

use crate::error::DigestError;

/// Streaming SHA-256 digest of an artifact.
///
/// Consumes a reader in bounded chunks so an artifact of any size is hashed
/// without being held in memory. The result depends only on the bytes read,
/// never on the chunk size or on how the reader splits its output.
#[derive(Clone, Copy, Debug)]
pub struct DigestComputer {
    chunk_size: usize,
}

impl DigestComputer {
    /// Default read buffer size (64 KiB).
    pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

    pub fn new() -> Self {
        Self {
            chunk_size: Self::DEFAULT_CHUNK_SIZE,
        }
    }

    /// A computer reading at most `chunk_size` bytes per read (minimum 1).
    pub fn with_chunk_size(chunk_size: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Digest everything `reader` yields until end of stream.
    pub fn digest_reader<R: Read>(&self, mut reader: R) -> Result<Digest, DigestError> {
        let mut hasher = Sha256::new();
        let mut buf = vec![0u8; self.chunk_size];
        let mut bytes_read: u64 = 0;

        loop {
            let n = match reader.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(source) => return Err(DigestError::StreamRead { bytes_read, source }),
            };
            hasher.update(&buf[..n]);
            bytes_read += n as u64;
        }

        tracing::trace!(bytes_read, "artifact digested");
        Ok(Digest::from_hash(hasher.finalize().into()))
    }

    /// Digest the contents of a file.
    pub fn digest_file(&self, path: &Path) -> Result<Digest, DigestError> {
        let file = File::open(path).map_err(|source| DigestError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        self.digest_reader(file)
    }

    /// Digest an in-memory byte slice.
    pub fn digest_bytes(data: &[u8]) -> Digest {
        Digest::from_hash(Sha256::digest(data).into())
    }
}

impl Default for DigestComputer {
    fn default() -> Self {
        Self::new()
    }
}
