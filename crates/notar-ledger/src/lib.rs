//! Ledger boundary for Notar.
//!
//! This crate is everything Notar knows about the ledger network:
//! - The [`LedgerClient`] trait: the four calls the anchoring core depends on
//! - [`LedgerError`]: transient / blockhash-expired / fatal classification
//! - The legacy transaction wire format and the memo instruction
//! - [`RpcLedgerClient`]: JSON-RPC 2.0 over HTTP
//! - [`InMemoryLedger`]: scripted in-process ledger for tests and demos
//!
//! Clients never retry. Retry policy belongs to the callers in `notar-anchor`.

pub mod error;
pub mod memory;
pub mod rpc;
pub mod short_vec;
pub mod traits;
pub mod transaction;

pub use error::{LedgerError, LedgerResult, TransactionError};
pub use memory::{AirdropMode, InMemoryLedger, Operation, SubmittedTransaction};
pub use rpc::RpcLedgerClient;
pub use traits::{Commitment, LedgerClient, SubmitOptions, SubmitOutcome};
pub use transaction::{
    CompiledInstruction, Message, MessageHeader, Transaction, MAX_TRANSACTION_SIZE,
    MEMO_PROGRAM_ID,
};
