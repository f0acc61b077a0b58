use notar_ledger::{LedgerError, TransactionError};

/// Errors from ensuring the wallet balance.
///
/// An unconfirmed top-up is not an error; see
/// [`BalanceOutcome::Unconfirmed`](crate::BalanceOutcome::Unconfirmed).
#[derive(Debug, thiserror::Error)]
pub enum FundingError {
    /// The ledger failed fatally, or transient failures outlasted the policy.
    #[error("balance check failed: {0}")]
    Ledger(#[source] LedgerError),

    #[error("deadline exceeded after {polls} balance polls")]
    DeadlineExceeded { polls: u32 },
}

/// Result alias for funding operations.
pub type FundingResult<T> = Result<T, FundingError>;

/// Errors from anchoring a digest on the ledger.
#[derive(Debug, thiserror::Error)]
pub enum AnchorError {
    /// The ledger refused the transaction. Not retried.
    #[error("transaction rejected: {0}")]
    Rejected(#[source] LedgerError),

    #[error("gave up after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: LedgerError },

    /// The transaction could not be built or signed, so nothing was sent.
    #[error("transaction not submitted: {0}")]
    SubmissionFailed(#[from] TransactionError),

    #[error("deadline exceeded after {attempts} attempts")]
    DeadlineExceeded { attempts: u32 },
}

/// Result alias for anchoring operations.
pub type AnchorResult<T> = Result<T, AnchorError>;
