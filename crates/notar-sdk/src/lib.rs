//! High-level SDK for Notar.
//!
//! [`AnchoringService`] is the entry point: `issue` anchors an artifact's
//! digest on the ledger and records a certificate, `verify` answers whether
//! an artifact was anchored. [`NotarConfig`] wires a service from a TOML
//! file.

pub mod config;
pub mod error;
pub mod service;

pub use config::{ConfigError, FundingConfig, IndexConfig, NotarConfig, RpcConfig, SubmitConfig};
pub use error::{ErrorKind, ServiceError, ServiceResult};
pub use service::{
    AnchoringService, IssueOptions, ServiceBuilder, UnfundedPolicy, VerificationResult,
};

// Re-export key types
pub use notar_anchor::{AnchorReceipt, BalanceOutcome, Clock, ConfirmationStatus, ManualClock};
pub use notar_crypto::{DigestComputer, Signer, SigningKey, WalletKeyStore};
pub use notar_index::{CertificateIndex, CertificateRecord};
pub use notar_ledger::{InMemoryLedger, LedgerClient};
pub use notar_types::{Address, Digest, Lamports, TxSignature, LAMPORTS_PER_TOKEN};
