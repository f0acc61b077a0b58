use thiserror::Error;

/// Errors produced by type operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid hex string: {0}")]
    InvalidHex(String),

    #[error("invalid base58 string: {0}")]
    InvalidBase58(String),

    #[error("invalid byte length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
}

/// Decode base58 text into exactly `N` bytes.
pub(crate) fn decode_base58_array<const N: usize>(s: &str) -> Result<[u8; N], TypeError> {
    let bytes = bs58::decode(s)
        .into_vec()
        .map_err(|e| TypeError::InvalidBase58(e.to_string()))?;
    bytes.try_into().map_err(|bytes: Vec<u8>| TypeError::InvalidLength {
        expected: N,
        actual: bytes.len(),
    })
}
