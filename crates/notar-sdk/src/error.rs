use std::fmt;

use notar_anchor::{AnchorError, FundingError};
use notar_crypto::{DigestError, KeyLoadError};
use notar_index::IndexError;
use notar_ledger::LedgerError;
use notar_types::{Digest, Lamports};

use crate::config::ConfigError;

/// Broad category of a [`ServiceError`], for choosing what to tell a user.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Bad artifact stream, key file or configuration.
    Input,
    /// The wallet could not be funded.
    Funding,
    /// The anchoring transaction was not accepted.
    Submission,
    /// The artifact is already anchored.
    Duplicate,
    /// The certificate index failed.
    Storage,
    /// The caller's deadline passed.
    Deadline,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Input => "input",
            Self::Funding => "funding",
            Self::Submission => "submission",
            Self::Duplicate => "duplicate",
            Self::Storage => "storage",
            Self::Deadline => "deadline",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors from the anchoring service.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("cannot digest artifact: {0}")]
    Digest(#[from] DigestError),

    #[error("cannot load wallet key: {0}")]
    KeyLoad(#[from] KeyLoadError),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("artifact {digest} is already anchored")]
    AlreadyAnchored { digest: Digest },

    #[error("wallet funding not confirmed: balance {balance}, required {required}")]
    InsufficientBalanceUnconfirmed { balance: Lamports, required: Lamports },

    #[error("funding failed: {0}")]
    Funding(#[from] FundingError),

    #[error("anchoring failed: {0}")]
    Anchor(#[from] AnchorError),

    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("index error: {0}")]
    Index(#[from] IndexError),
}

impl ServiceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidInput(_) | Self::Digest(_) | Self::KeyLoad(_) | Self::Config(_) => {
                ErrorKind::Input
            }
            Self::AlreadyAnchored { .. } | Self::Index(IndexError::DuplicateDigest { .. }) => {
                ErrorKind::Duplicate
            }
            Self::Index(_) => ErrorKind::Storage,
            Self::Funding(FundingError::DeadlineExceeded { .. })
            | Self::Anchor(AnchorError::DeadlineExceeded { .. }) => ErrorKind::Deadline,
            Self::InsufficientBalanceUnconfirmed { .. } | Self::Funding(_) | Self::Ledger(_) => {
                ErrorKind::Funding
            }
            Self::Anchor(_) => ErrorKind::Submission,
        }
    }
}

/// Result alias for service operations.
pub type ServiceResult<T> = Result<T, ServiceError>;
