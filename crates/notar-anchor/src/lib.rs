//! Anchoring core for Notar.
//!
//! Two workers, each a bounded loop over a [`LedgerClient`](notar_ledger::LedgerClient):
//!
//! - [`BalanceEnsurer`]: make sure the wallet can pay, requesting a top-up
//!   and polling until it lands or the poll budget runs out
//! - [`TransactionAnchorer`]: build, sign and submit the memo transaction
//!   carrying a digest, retrying transient failures from a fresh blockhash
//!
//! Waiting goes through a [`Clock`], so both loops run instantly under
//! [`ManualClock`] in tests.

pub mod anchorer;
pub mod clock;
pub mod error;
pub mod funding;
pub mod retry;

pub use anchorer::{AnchorReceipt, AnchorRequest, ConfirmationStatus, TransactionAnchorer};
pub use clock::{Clock, Deadline, ManualClock, SystemClock};
pub use error::{AnchorError, AnchorResult, FundingError, FundingResult};
pub use funding::{BalanceEnsurer, BalanceOutcome, FundingPolicy};
pub use retry::{Backoff, RetryPolicy};
