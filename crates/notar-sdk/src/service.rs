use std::collections::HashMap;
use std::io::Read;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use notar_anchor::{
    AnchorRequest, BalanceEnsurer, BalanceOutcome, Clock, Deadline, FundingPolicy, RetryPolicy,
    SystemClock, TransactionAnchorer,
};
use notar_crypto::{DigestComputer, Signer, WalletKeyStore};
use notar_index::{CertificateIndex, CertificateRecord, FileCertificateIndex, InMemoryCertificateIndex};
use notar_ledger::{LedgerClient, RpcLedgerClient, SubmitOptions};
use notar_types::{Address, Digest, Lamports, TxSignature};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::{IndexConfig, NotarConfig};
use crate::error::{ServiceError, ServiceResult};

/// What to do when a top-up was requested but never showed up.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnfundedPolicy {
    /// Fail the issuance without submitting.
    #[default]
    Abort,
    /// Submit anyway and let the ledger decide.
    Proceed,
}

/// Parameters of one issuance.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IssueOptions {
    pub owner: String,
    pub remarks: Option<String>,
    /// Upper bound on the whole issuance, checked between steps.
    pub timeout: Option<Duration>,
}

impl IssueOptions {
    pub fn new(owner: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            remarks: None,
            timeout: None,
        }
    }

    pub fn with_remarks(mut self, remarks: impl Into<String>) -> Self {
        self.remarks = Some(remarks.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Answer to "was this artifact anchored?".
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status")]
pub enum VerificationResult {
    #[serde(rename = "valid")]
    Valid {
        digest: Digest,
        owner: String,
        signature: Option<TxSignature>,
        issued_at: DateTime<Utc>,
    },
    #[serde(rename = "not found")]
    NotFound { digest: Digest },
}

impl VerificationResult {
    pub fn status(&self) -> &'static str {
        match self {
            Self::Valid { .. } => "valid",
            Self::NotFound { .. } => "not found",
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid { .. })
    }

    pub fn digest(&self) -> &Digest {
        match self {
            Self::Valid { digest, .. } | Self::NotFound { digest } => digest,
        }
    }
}

impl From<CertificateRecord> for VerificationResult {
    fn from(record: CertificateRecord) -> Self {
        Self::Valid {
            digest: record.digest,
            owner: record.owner,
            signature: record.transaction_signature,
            issued_at: record.issued_at,
        }
    }
}

/// Issues and verifies ledger-anchored certificates.
///
/// Issuance: digest the artifact, make sure the wallet can pay, submit a
/// memo transaction carrying the digest, then record the certificate. A
/// record is written only after the ledger accepted the transaction.
///
/// Concurrent issuances of the same artifact are serialized per digest; the
/// later one sees the earlier record and fails with
/// [`ServiceError::AlreadyAnchored`] instead of paying for a second
/// transaction.
pub struct AnchoringService {
    digester: DigestComputer,
    ledger: Arc<dyn LedgerClient>,
    signer: Arc<dyn Signer>,
    index: Arc<dyn CertificateIndex>,
    clock: Arc<dyn Clock>,
    ensurer: BalanceEnsurer,
    anchorer: TransactionAnchorer,
    min_balance: Lamports,
    unfunded_policy: UnfundedPolicy,
    in_flight: Mutex<HashMap<Digest, Arc<Mutex<()>>>>,
}

impl AnchoringService {
    pub fn builder(
        ledger: Arc<dyn LedgerClient>,
        signer: Arc<dyn Signer>,
        index: Arc<dyn CertificateIndex>,
    ) -> ServiceBuilder {
        ServiceBuilder::new(ledger, signer, index)
    }

    /// Wire up the RPC client, wallet and index described by `config`.
    pub fn from_config(config: &NotarConfig) -> ServiceResult<Self> {
        config.validate()?;

        let ledger = RpcLedgerClient::new(config.rpc.url.clone(), config.rpc_timeout())
            .with_commitment(config.rpc.commitment);
        let wallet = WalletKeyStore::load(&config.keypair_path)?;
        let index: Arc<dyn CertificateIndex> = match &config.index {
            IndexConfig::Memory => Arc::new(InMemoryCertificateIndex::new()),
            IndexConfig::File { path } => Arc::new(FileCertificateIndex::open(path)?),
        };
        info!(
            rpc = ledger.url(),
            commitment = ?ledger.commitment(),
            keypair = ?wallet.source(),
            "anchoring service configured"
        );

        Ok(Self::builder(Arc::new(ledger), Arc::new(wallet), index)
            .funding_policy(config.funding_policy())
            .min_balance(config.funding.min_balance)
            .submit_policy(config.submit_policy())
            .submit_options(config.submit_options())
            .unfunded_policy(config.unfunded_policy)
            .digest_chunk_size(config.digest_chunk_size)
            .build())
    }

    /// Anchor an artifact for `owner`.
    pub fn issue<R: Read>(&self, artifact: R, owner: &str) -> ServiceResult<CertificateRecord> {
        self.issue_with(artifact, IssueOptions::new(owner))
    }

    pub fn issue_with<R: Read>(
        &self,
        artifact: R,
        options: IssueOptions,
    ) -> ServiceResult<CertificateRecord> {
        if options.owner.trim().is_empty() {
            return Err(ServiceError::InvalidInput("owner must not be empty".into()));
        }
        let deadline = options
            .timeout
            .map(|t| Deadline::after(self.clock.as_ref(), t));

        let digest = self.digester.digest_reader(artifact)?;
        debug!(%digest, owner = %options.owner, "issuing certificate");

        let slot = self.claim(digest);
        let result = {
            let _held = slot.lock().unwrap_or_else(PoisonError::into_inner);
            self.issue_exclusive(digest, options, deadline.as_ref())
        };
        self.release(digest, slot);
        result
    }

    /// The issuance steps after the digest guard is held.
    fn issue_exclusive(
        &self,
        digest: Digest,
        options: IssueOptions,
        deadline: Option<&Deadline>,
    ) -> ServiceResult<CertificateRecord> {
        if self.index.contains(&digest)? {
            info!(%digest, "artifact already anchored");
            return Err(ServiceError::AlreadyAnchored { digest });
        }

        let request = AnchorRequest::new(digest, self.min_balance);
        let payer = self.signer.address();
        if let BalanceOutcome::Unconfirmed {
            last_balance,
            required,
            ..
        } = self.ensurer.ensure(&payer, request.min_balance, deadline)?
        {
            match self.unfunded_policy {
                UnfundedPolicy::Abort => {
                    return Err(ServiceError::InsufficientBalanceUnconfirmed {
                        balance: last_balance,
                        required,
                    });
                }
                UnfundedPolicy::Proceed => {
                    warn!(%payer, last_balance, required, "funding unconfirmed; submitting anyway");
                }
            }
        }

        let receipt = self.anchorer.anchor(&request, self.signer.as_ref(), deadline)?;

        let mut record =
            CertificateRecord::new(digest, options.owner).with_signature(receipt.signature);
        if let Some(remarks) = options.remarks {
            record = record.with_remarks(remarks);
        }
        self.index.insert(record.clone())?;

        info!(
            %digest,
            owner = %record.owner,
            signature = %receipt.signature,
            status = %receipt.status,
            "certificate issued"
        );
        Ok(record)
    }

    /// Check whether an artifact was anchored. Not-found is an answer, not
    /// an error.
    pub fn verify<R: Read>(&self, artifact: R) -> ServiceResult<VerificationResult> {
        let digest = self.digester.digest_reader(artifact)?;
        let result = match self.index.lookup(&digest)? {
            Some(record) => VerificationResult::from(record),
            None => VerificationResult::NotFound { digest },
        };
        debug!(%digest, status = result.status(), "verification");
        Ok(result)
    }

    pub fn lookup(&self, digest: &Digest) -> ServiceResult<Option<CertificateRecord>> {
        Ok(self.index.lookup(digest)?)
    }

    pub fn list(&self) -> ServiceResult<Vec<CertificateRecord>> {
        Ok(self.index.list()?)
    }

    pub fn list_by_owner(&self, owner: &str) -> ServiceResult<Vec<CertificateRecord>> {
        Ok(self.index.list_by_owner(owner)?)
    }

    /// The anchoring wallet's address.
    pub fn address(&self) -> Address {
        self.signer.address()
    }

    /// The anchoring wallet's current balance.
    pub fn balance(&self) -> ServiceResult<Lamports> {
        Ok(self.ledger.get_balance(&self.signer.address())?)
    }

    /// Shared guard for `digest`, created on first use.
    fn claim(&self, digest: Digest) -> Arc<Mutex<()>> {
        let mut map = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(map.entry(digest).or_default())
    }

    /// Drop the guard entry once no other issuance holds or awaits it.
    fn release(&self, digest: Digest, slot: Arc<Mutex<()>>) {
        let mut map = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        // One reference in the map, one in `slot`.
        if Arc::strong_count(&slot) == 2 {
            map.remove(&digest);
        }
    }
}

impl std::fmt::Debug for AnchoringService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnchoringService")
            .field("address", &self.signer.address())
            .field("min_balance", &self.min_balance)
            .field("unfunded_policy", &self.unfunded_policy)
            .finish_non_exhaustive()
    }
}

/// Builder for [`AnchoringService`]. Defaults match [`NotarConfig::default`].
pub struct ServiceBuilder {
    ledger: Arc<dyn LedgerClient>,
    signer: Arc<dyn Signer>,
    index: Arc<dyn CertificateIndex>,
    clock: Arc<dyn Clock>,
    funding_policy: FundingPolicy,
    submit_policy: RetryPolicy,
    submit_options: SubmitOptions,
    min_balance: Lamports,
    unfunded_policy: UnfundedPolicy,
    digest_chunk_size: usize,
}

impl ServiceBuilder {
    fn new(
        ledger: Arc<dyn LedgerClient>,
        signer: Arc<dyn Signer>,
        index: Arc<dyn CertificateIndex>,
    ) -> Self {
        let defaults = NotarConfig::default();
        Self {
            ledger,
            signer,
            index,
            clock: Arc::new(SystemClock),
            funding_policy: defaults.funding_policy(),
            submit_policy: defaults.submit_policy(),
            submit_options: defaults.submit_options(),
            min_balance: defaults.funding.min_balance,
            unfunded_policy: defaults.unfunded_policy,
            digest_chunk_size: defaults.digest_chunk_size,
        }
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn funding_policy(mut self, policy: FundingPolicy) -> Self {
        self.funding_policy = policy;
        self
    }

    pub fn submit_policy(mut self, policy: RetryPolicy) -> Self {
        self.submit_policy = policy;
        self
    }

    pub fn submit_options(mut self, options: SubmitOptions) -> Self {
        self.submit_options = options;
        self
    }

    pub fn min_balance(mut self, lamports: Lamports) -> Self {
        self.min_balance = lamports;
        self
    }

    pub fn unfunded_policy(mut self, policy: UnfundedPolicy) -> Self {
        self.unfunded_policy = policy;
        self
    }

    pub fn digest_chunk_size(mut self, size: usize) -> Self {
        self.digest_chunk_size = size;
        self
    }

    pub fn build(self) -> AnchoringService {
        let ensurer = BalanceEnsurer::new(
            Arc::clone(&self.ledger),
            Arc::clone(&self.clock),
            self.funding_policy,
        );
        let anchorer = TransactionAnchorer::new(
            Arc::clone(&self.ledger),
            Arc::clone(&self.clock),
            self.submit_policy,
        )
        .with_submit_options(self.submit_options);

        AnchoringService {
            digester: DigestComputer::with_chunk_size(self.digest_chunk_size),
            ledger: self.ledger,
            signer: self.signer,
            index: self.index,
            clock: self.clock,
            ensurer,
            anchorer,
            min_balance: self.min_balance,
            unfunded_policy: self.unfunded_policy,
            in_flight: Mutex::new(HashMap::new()),
        }
    }
}
