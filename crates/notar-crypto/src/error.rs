use std::io;
use std::path::PathBuf;

/// Errors from computing an artifact digest.
#[derive(Debug, thiserror::Error)]
pub enum DigestError {
    /// The underlying stream raised a read fault.
    #[error("stream read failed after {bytes_read} bytes: {source}")]
    StreamRead {
        bytes_read: u64,
        #[source]
        source: io::Error,
    },

    /// The artifact file could not be opened.
    #[error("cannot open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Errors from loading wallet key material. All are fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum KeyLoadError {
    #[error("keypair file not found: {0}")]
    Missing(PathBuf),

    #[error("cannot read keypair file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("malformed keypair file {path}: {reason}")]
    Malformed { path: PathBuf, reason: String },

    #[error("keypair element {index} out of byte range: {value}")]
    ByteOutOfRange { index: usize, value: i64 },

    #[error("keypair has {actual} bytes, expected {expected}")]
    WrongLength { expected: usize, actual: usize },

    #[error("embedded public key does not match the secret key")]
    PublicKeyMismatch,
}

/// Errors from signing or verifying.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum SignerError {
    #[error("invalid signature")]
    InvalidSignature,

    #[error("invalid public key")]
    InvalidKey,

    #[error("signer unavailable: {0}")]
    Unavailable(String),
}
