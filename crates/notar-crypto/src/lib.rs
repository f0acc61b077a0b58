//! Cryptographic primitives for Notar.
//!
//! Provides streaming SHA-256 artifact digests, ed25519 transaction signing
//! and verification, and loading of the anchoring wallet's key material.
//!
//! All crypto operations wrap established libraries (`sha2`, `ed25519-dalek`).

pub mod digest;
pub mod error;
pub mod keystore;
pub mod signer;

pub use digest::DigestComputer;
pub use error::{DigestError, KeyLoadError, SignerError};
pub use keystore::WalletKeyStore;
pub use signer::{verify_signature, Signer, SigningKey};
