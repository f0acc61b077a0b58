use std::fmt;
use std::sync::Arc;

use notar_crypto::Signer;
use notar_ledger::{
    LedgerClient, LedgerError, Message, SubmitOptions, SubmitOutcome, Transaction,
    TransactionError,
};
use notar_types::{Digest, Lamports, TxSignature};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::clock::{Clock, Deadline};
use crate::error::{AnchorError, AnchorResult};
use crate::retry::RetryPolicy;

/// One issuance's worth of anchoring input.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AnchorRequest {
    pub digest: Digest,
    /// Balance the payer must hold before submitting.
    pub min_balance: Lamports,
}

impl AnchorRequest {
    pub fn new(digest: Digest, min_balance: Lamports) -> Self {
        Self {
            digest,
            min_balance,
        }
    }

    /// Memo payload written on-chain: the digest's 64-character lowercase
    /// hex text, not the raw 32 bytes. The memo program rejects non-UTF-8
    /// data, and the hex form is what verifiers compare against.
    pub fn memo(&self) -> String {
        self.digest.to_hex()
    }
}

/// Where the receipt's signature came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmationStatus {
    /// The node echoed the transaction signature.
    Acknowledged,
    /// The node acknowledged without a usable signature; the locally
    /// computed one was used.
    LocallySigned,
}

impl ConfirmationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Acknowledged => "acknowledged",
            Self::LocallySigned => "locally_signed",
        }
    }
}

impl fmt::Display for ConfirmationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Proof of a submitted anchoring transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnchorReceipt {
    pub digest: Digest,
    pub signature: TxSignature,
    pub status: ConfirmationStatus,
    /// Submission attempts used, including the successful one.
    pub attempts: u32,
}

/// Why one attempt failed.
enum AttemptError {
    Ledger(LedgerError),
    Build(TransactionError),
}

/// Builds, signs and submits the memo transaction for a digest.
///
/// Each attempt fetches a fresh blockhash, so a retry after an expired
/// blockhash is simply the next attempt.
pub struct TransactionAnchorer {
    ledger: Arc<dyn LedgerClient>,
    clock: Arc<dyn Clock>,
    retry: RetryPolicy,
    submit_options: SubmitOptions,
}

impl TransactionAnchorer {
    pub fn new(ledger: Arc<dyn LedgerClient>, clock: Arc<dyn Clock>, retry: RetryPolicy) -> Self {
        Self {
            ledger,
            clock,
            retry,
            submit_options: SubmitOptions::default(),
        }
    }

    /// Builder: options forwarded with every submission.
    pub fn with_submit_options(mut self, options: SubmitOptions) -> Self {
        self.submit_options = options;
        self
    }

    /// Anchor `request.digest`, paid for and signed by `signer`.
    ///
    /// Transient and expired-blockhash failures are retried from the
    /// blockhash fetch. A fatal ledger error ends the loop at once.
    pub fn anchor(
        &self,
        request: &AnchorRequest,
        signer: &dyn Signer,
        deadline: Option<&Deadline>,
    ) -> AnchorResult<AnchorReceipt> {
        let memo = request.memo();
        let mut attempts = 0;

        loop {
            if let Some(d) = deadline {
                if d.is_expired(self.clock.as_ref()) {
                    return Err(AnchorError::DeadlineExceeded { attempts });
                }
            }
            attempts += 1;

            let error = match self.attempt(memo.as_bytes(), signer) {
                Ok((local, outcome)) => {
                    let (signature, status) = resolve_signature(local, outcome);
                    info!(
                        digest = %request.digest,
                        %signature,
                        %status,
                        attempts,
                        "digest anchored"
                    );
                    return Ok(AnchorReceipt {
                        digest: request.digest,
                        signature,
                        status,
                        attempts,
                    });
                }
                Err(AttemptError::Build(e)) => return Err(AnchorError::SubmissionFailed(e)),
                Err(AttemptError::Ledger(e)) => e,
            };

            if !error.is_retryable() {
                warn!(digest = %request.digest, %error, "anchoring rejected");
                return Err(AnchorError::Rejected(error));
            }
            if !self.retry.allows_another(attempts) {
                warn!(digest = %request.digest, attempts, %error, "anchoring retries exhausted");
                return Err(AnchorError::RetriesExhausted {
                    attempts,
                    last: error,
                });
            }

            let delay = self.retry.delay_for_attempt(attempts);
            debug!(
                digest = %request.digest,
                attempts,
                ?delay,
                %error,
                "anchoring attempt failed; retrying"
            );
            self.clock.sleep(delay);
        }
    }

    /// Blockhash, build, sign, submit.
    fn attempt(
        &self,
        memo: &[u8],
        signer: &dyn Signer,
    ) -> Result<(TxSignature, SubmitOutcome), AttemptError> {
        let blockhash = self
            .ledger
            .get_recent_blockhash()
            .map_err(AttemptError::Ledger)?;

        let message = Message::new_memo(&signer.address(), memo, blockhash);
        let transaction = Transaction::sign(message, signer).map_err(AttemptError::Build)?;
        let local = *transaction
            .signature()
            .ok_or(AttemptError::Build(TransactionError::SignatureCount {
                expected: 1,
                actual: 0,
            }))?;
        let wire = transaction.serialize().map_err(AttemptError::Build)?;

        debug!(%blockhash, signature = %local, len = wire.len(), "submitting transaction");
        let outcome = self
            .ledger
            .submit_raw_transaction(&wire, &self.submit_options)
            .map_err(AttemptError::Ledger)?;
        Ok((local, outcome))
    }
}

impl fmt::Debug for TransactionAnchorer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionAnchorer")
            .field("retry", &self.retry)
            .field("submit_options", &self.submit_options)
            .finish_non_exhaustive()
    }
}

/// Network signature if the node gave one, else the local one.
fn resolve_signature(local: TxSignature, outcome: SubmitOutcome) -> (TxSignature, ConfirmationStatus) {
    match outcome {
        SubmitOutcome::Accepted(remote) => {
            if remote != local {
                warn!(%remote, %local, "node returned a different signature; using the node's");
            }
            (remote, ConfirmationStatus::Acknowledged)
        }
        SubmitOutcome::Ambiguous => {
            warn!(signature = %local, "ambiguous acknowledgement; using local signature");
            (local, ConfirmationStatus::LocallySigned)
        }
    }
}
