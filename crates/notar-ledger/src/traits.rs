use std::sync::Arc;

use notar_types::{Address, Blockhash, Lamports, TxSignature};
use serde::{Deserialize, Serialize};

use crate::error::LedgerResult;

/// How settled ledger state must be before a node answers from it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Commitment {
    Processed,
    #[default]
    Confirmed,
    Finalized,
}

impl Commitment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Processed => "processed",
            Self::Confirmed => "confirmed",
            Self::Finalized => "finalized",
        }
    }
}

/// Options passed through to raw transaction submission.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitOptions {
    /// Skip the node's simulation of the transaction before forwarding it.
    pub skip_preflight: bool,
    /// Commitment level used for the preflight simulation.
    pub preflight_commitment: Commitment,
    /// How many times the node itself may rebroadcast. `None` leaves the
    /// node's default.
    pub max_retries: Option<usize>,
}

/// What the network said about a submitted transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// The node accepted the transaction and echoed its signature.
    Accepted(TxSignature),
    /// The node acknowledged the request without a usable signature. The
    /// transaction may or may not have been forwarded.
    Ambiguous,
}

/// The four ledger calls the anchoring workflow depends on.
///
/// Implementations are black-box network calls: they classify failures into
/// [`LedgerError`](crate::LedgerError) variants but never retry. All calls
/// block the calling thread.
pub trait LedgerClient: Send + Sync {
    /// Current balance of an account.
    fn get_balance(&self, address: &Address) -> LedgerResult<Lamports>;

    /// Ask the network to credit an account. Best effort: success means the
    /// request was accepted, not that the funds have landed.
    fn request_funding(&self, address: &Address, amount: Lamports) -> LedgerResult<()>;

    /// A recent blockhash to build a transaction against.
    fn get_recent_blockhash(&self) -> LedgerResult<Blockhash>;

    /// Submit a signed, serialized transaction.
    fn submit_raw_transaction(
        &self,
        transaction: &[u8],
        options: &SubmitOptions,
    ) -> LedgerResult<SubmitOutcome>;
}

impl<T: LedgerClient + ?Sized> LedgerClient for Arc<T> {
    fn get_balance(&self, address: &Address) -> LedgerResult<Lamports> {
        (**self).get_balance(address)
    }

    fn request_funding(&self, address: &Address, amount: Lamports) -> LedgerResult<()> {
        (**self).request_funding(address, amount)
    }

    fn get_recent_blockhash(&self) -> LedgerResult<Blockhash> {
        (**self).get_recent_blockhash()
    }

    fn submit_raw_transaction(
        &self,
        transaction: &[u8],
        options: &SubmitOptions,
    ) -> LedgerResult<SubmitOutcome> {
        (**self).submit_raw_transaction(transaction, options)
    }
}
