//! Foundation types for Notar.
//!
//! Every other Notar crate depends on `notar-types`. The types here are plain
//! values: fixed-size byte arrays with canonical text forms.
//!
//! # Key Types
//!
//! - [`Digest`]: SHA-256 content digest of an artifact (hex text form)
//! - [`Address`]: 32-byte ed25519 public key identifying a ledger account (base58)
//! - [`Blockhash`]: short-lived token naming a recent ledger state (base58)
//! - [`TxSignature`]: 64-byte transaction signature, the durable transaction id (base58)
//! - [`Lamports`]: smallest unit of ledger balance

pub mod address;
pub mod blockhash;
pub mod digest;
pub mod error;
pub mod signature;

pub use address::Address;
pub use blockhash::Blockhash;
pub use digest::Digest;
pub use error::TypeError;
pub use signature::TxSignature;

/// Smallest unit of ledger balance.
pub type Lamports = u64;

/// Lamports per whole native token.
pub const LAMPORTS_PER_TOKEN: Lamports = 1_000_000_000;
