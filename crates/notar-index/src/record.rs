use std::fmt;

use chrono::{DateTime, Utc};
use notar_types::{Digest, TxSignature};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Proof that an artifact's digest was anchored on the ledger.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateRecord {
    /// Time-ordered record identifier.
    pub id: Uuid,
    /// SHA-256 of the artifact. Unique across the index.
    pub digest: Digest,
    /// Free-form name of the party the certificate was issued to.
    pub owner: String,
    /// Signature of the anchoring transaction.
    pub transaction_signature: Option<TxSignature>,
    pub issued_at: DateTime<Utc>,
    /// Set once the digest is known to be on the ledger.
    pub verified: bool,
    pub remarks: Option<String>,
}

impl CertificateRecord {
    /// A fresh, unanchored record issued now.
    pub fn new(digest: Digest, owner: impl Into<String>) -> Self {
        Self {
            id: Uuid::now_v7(),
            digest,
            owner: owner.into(),
            transaction_signature: None,
            issued_at: Utc::now(),
            verified: false,
            remarks: None,
        }
    }

    /// Builder: attach the anchoring transaction and mark verified.
    pub fn with_signature(mut self, signature: TxSignature) -> Self {
        self.transaction_signature = Some(signature);
        self.verified = true;
        self
    }

    pub fn with_remarks(mut self, remarks: impl Into<String>) -> Self {
        self.remarks = Some(remarks.into());
        self
    }

    pub fn with_issued_at(mut self, issued_at: DateTime<Utc>) -> Self {
        self.issued_at = issued_at;
        self
    }

    /// First ten hex characters of the digest.
    pub fn short_digest(&self) -> String {
        self.digest.short_hex()
    }
}

impl fmt::Display for CertificateRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Certificate - {} ({}...)", self.owner, self.short_digest())
    }
}
