use notar_crypto::SignerError;
use notar_types::Address;

/// Errors produced by ledger client operations.
///
/// Every failure is classified so callers can decide whether to retry
/// without inspecting messages.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    /// Network or node hiccup; the same call may succeed later.
    #[error("transient network error: {0}")]
    Transient(String),

    /// The transaction's blockhash is no longer recent. Rebuild from a fresh
    /// blockhash and resubmit.
    #[error("blockhash expired: {0}")]
    BlockhashExpired(String),

    /// The ledger rejected the request; retrying will not help.
    #[error("fatal protocol error: {0}")]
    Fatal(String),
}

impl LedgerError {
    pub fn transient(msg: impl Into<String>) -> Self {
        Self::Transient(msg.into())
    }

    pub fn fatal(msg: impl Into<String>) -> Self {
        Self::Fatal(msg.into())
    }

    /// Whether the failed call may be attempted again.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Fatal(_))
    }
}

/// Result alias for ledger client operations.
pub type LedgerResult<T> = Result<T, LedgerError>;

/// Errors from building, signing, or decoding transactions.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransactionError {
    #[error("transaction truncated: needed {needed} more bytes at offset {offset}")]
    Truncated { offset: usize, needed: usize },

    #[error("invalid compact length at offset {offset}: {reason}")]
    InvalidLength { offset: usize, reason: &'static str },

    #[error("{0} trailing bytes after transaction")]
    TrailingBytes(usize),

    #[error("length {0} exceeds the compact-u16 range")]
    LengthOverflow(usize),

    #[error("transaction is {size} bytes, limit is {max}")]
    TooLarge { size: usize, max: usize },

    #[error("expected {expected} signatures, found {actual}")]
    SignatureCount { expected: usize, actual: usize },

    #[error("signature {index} does not verify")]
    InvalidSignature { index: usize },

    #[error("account index {index} out of range ({len} accounts)")]
    AccountIndex { index: u8, len: usize },

    #[error("signer {actual} is not the fee payer {expected}")]
    SignerMismatch { expected: Address, actual: Address },

    #[error("signing failed: {0}")]
    Signing(#[from] SignerError),
}
