use notar_types::Digest;

/// Errors from certificate index operations.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    /// A record for this digest already exists.
    #[error("digest {digest} is already indexed")]
    DuplicateDigest { digest: Digest },

    /// Record encoding or decoding failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// I/O error from the backing file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A thread panicked while holding the index lock.
    #[error("index lock poisoned")]
    LockPoisoned,
}

/// Result alias for index operations.
pub type IndexResult<T> = Result<T, IndexError>;
