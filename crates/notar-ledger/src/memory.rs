use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard};

use notar_crypto::DigestComputer;
use notar_types::{Address, Blockhash, Lamports, TxSignature};
use tracing::debug;

use crate::error::{LedgerError, LedgerResult};
use crate::traits::{LedgerClient, SubmitOptions, SubmitOutcome};
use crate::transaction::{Transaction, MEMO_PROGRAM_ID};

/// Fee charged to the payer of every accepted transaction.
pub const DEFAULT_FEE: Lamports = 5_000;

/// Identifies one of the four [`LedgerClient`] calls.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
    GetBalance,
    RequestFunding,
    GetRecentBlockhash,
    SubmitTransaction,
}

/// When requested funds land.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AirdropMode {
    /// Credited before `request_funding` returns.
    Instant,
    /// Credited once this many further balance queries have been answered.
    AfterQueries(u32),
    /// Accepted but never credited.
    Never,
}

/// A transaction the ledger accepted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubmittedTransaction {
    pub signature: TxSignature,
    pub fee_payer: Address,
    pub recent_blockhash: Blockhash,
    pub memo: Vec<u8>,
}

/// In-process ledger for tests, local demos, and embedding.
///
/// Tracks balances, hands out a deterministic blockhash sequence, and
/// validates submitted transactions the way a node would (signature, recent
/// blockhash, fee-payer balance, duplicate detection). Faults can be queued
/// per operation to script transient and fatal network behaviour, and every
/// call is counted for assertions.
pub struct InMemoryLedger {
    inner: Mutex<LedgerState>,
}

struct LedgerState {
    balances: HashMap<Address, Lamports>,
    fee: Lamports,
    airdrop_mode: AirdropMode,
    pending_airdrops: Vec<PendingAirdrop>,
    blockhash_seq: u64,
    recent_blockhashes: HashSet<Blockhash>,
    faults: HashMap<Operation, VecDeque<LedgerError>>,
    ambiguous_acks: u32,
    submitted: Vec<SubmittedTransaction>,
    calls: HashMap<Operation, u32>,
}

struct PendingAirdrop {
    address: Address,
    amount: Lamports,
    remaining_queries: u32,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(LedgerState {
                balances: HashMap::new(),
                fee: DEFAULT_FEE,
                airdrop_mode: AirdropMode::Instant,
                pending_airdrops: Vec::new(),
                blockhash_seq: 0,
                recent_blockhashes: HashSet::new(),
                faults: HashMap::new(),
                ambiguous_acks: 0,
                submitted: Vec::new(),
                calls: HashMap::new(),
            }),
        }
    }

    /// Builder: start an account with a balance.
    pub fn with_balance(self, address: Address, lamports: Lamports) -> Self {
        self.set_balance(address, lamports);
        self
    }

    /// Builder: choose when airdrops land.
    pub fn with_airdrop_mode(self, mode: AirdropMode) -> Self {
        if let Ok(mut state) = self.inner.lock() {
            state.airdrop_mode = mode;
        }
        self
    }

    pub fn set_balance(&self, address: Address, lamports: Lamports) {
        if let Ok(mut state) = self.inner.lock() {
            state.balances.insert(address, lamports);
        }
    }

    pub fn balance_of(&self, address: &Address) -> Lamports {
        self.inner
            .lock()
            .map(|state| state.balances.get(address).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    /// Queue a failure for the next call of `op`. Queued failures are
    /// returned in FIFO order before normal behaviour resumes.
    pub fn inject_fault(&self, op: Operation, error: LedgerError) {
        if let Ok(mut state) = self.inner.lock() {
            state.faults.entry(op).or_default().push_back(error);
        }
    }

    /// Accept the next `count` transactions without echoing a signature.
    pub fn acknowledge_ambiguously(&self, count: u32) {
        if let Ok(mut state) = self.inner.lock() {
            state.ambiguous_acks += count;
        }
    }

    /// Drop every blockhash handed out so far, as if the validity window
    /// had passed.
    pub fn expire_blockhashes(&self) {
        if let Ok(mut state) = self.inner.lock() {
            state.recent_blockhashes.clear();
        }
    }

    /// How many times `op` has been called (including faulted calls).
    pub fn calls(&self, op: Operation) -> u32 {
        self.inner
            .lock()
            .map(|state| state.calls.get(&op).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    /// Transactions accepted so far, in submission order.
    pub fn submitted(&self) -> Vec<SubmittedTransaction> {
        self.inner
            .lock()
            .map(|state| state.submitted.clone())
            .unwrap_or_default()
    }

    fn state(&self) -> LedgerResult<MutexGuard<'_, LedgerState>> {
        self.inner
            .lock()
            .map_err(|_| LedgerError::fatal("ledger lock poisoned"))
    }

    /// Count the call and pop any scripted fault for it.
    fn enter(state: &mut LedgerState, op: Operation) -> LedgerResult<()> {
        *state.calls.entry(op).or_default() += 1;
        match state.faults.get_mut(&op).and_then(VecDeque::pop_front) {
            Some(error) => {
                debug!(?op, %error, "injected ledger fault");
                Err(error)
            }
            None => Ok(()),
        }
    }

    fn credit(state: &mut LedgerState, address: Address, amount: Lamports) {
        let balance = state.balances.entry(address).or_default();
        *balance = balance.saturating_add(amount);
    }
}

impl Default for InMemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl LedgerClient for InMemoryLedger {
    fn get_balance(&self, address: &Address) -> LedgerResult<Lamports> {
        let mut state = self.state()?;
        Self::enter(&mut state, Operation::GetBalance)?;

        let mut landed = Vec::new();
        state.pending_airdrops.retain_mut(|drop| {
            if drop.remaining_queries == 0 {
                landed.push((drop.address, drop.amount));
                false
            } else {
                drop.remaining_queries -= 1;
                true
            }
        });
        for (addr, amount) in landed {
            Self::credit(&mut state, addr, amount);
        }

        Ok(state.balances.get(address).copied().unwrap_or(0))
    }

    fn request_funding(&self, address: &Address, amount: Lamports) -> LedgerResult<()> {
        let mut state = self.state()?;
        Self::enter(&mut state, Operation::RequestFunding)?;
        match state.airdrop_mode {
            AirdropMode::Instant => Self::credit(&mut state, *address, amount),
            AirdropMode::AfterQueries(n) => state.pending_airdrops.push(PendingAirdrop {
                address: *address,
                amount,
                remaining_queries: n,
            }),
            AirdropMode::Never => {}
        }
        Ok(())
    }

    fn get_recent_blockhash(&self) -> LedgerResult<Blockhash> {
        let mut state = self.state()?;
        Self::enter(&mut state, Operation::GetRecentBlockhash)?;
        state.blockhash_seq += 1;
        let seed = format!("notar-blockhash:{}", state.blockhash_seq);
        let blockhash = Blockhash::from_bytes(*DigestComputer::digest_bytes(seed.as_bytes()).as_bytes());
        state.recent_blockhashes.insert(blockhash);
        Ok(blockhash)
    }

    fn submit_raw_transaction(
        &self,
        transaction: &[u8],
        _options: &SubmitOptions,
    ) -> LedgerResult<SubmitOutcome> {
        let mut state = self.state()?;
        Self::enter(&mut state, Operation::SubmitTransaction)?;

        let tx = Transaction::deserialize(transaction)
            .map_err(|e| LedgerError::fatal(format!("failed to decode transaction: {e}")))?;
        tx.verify()
            .map_err(|e| LedgerError::fatal(format!("signature verification failed: {e}")))?;

        let signature = *tx
            .signature()
            .ok_or_else(|| LedgerError::fatal("transaction has no signatures"))?;
        let fee_payer = *tx
            .message
            .fee_payer()
            .ok_or_else(|| LedgerError::fatal("transaction has no accounts"))?;

        if !state.recent_blockhashes.contains(&tx.message.recent_blockhash) {
            return Err(LedgerError::BlockhashExpired(format!(
                "blockhash {} not found",
                tx.message.recent_blockhash
            )));
        }
        if state.submitted.iter().any(|s| s.signature == signature) {
            return Err(LedgerError::fatal("transaction already processed"));
        }
        for ix in &tx.message.instructions {
            if tx.message.program_id(ix) != Some(&MEMO_PROGRAM_ID) {
                return Err(LedgerError::fatal("unsupported program"));
            }
            if std::str::from_utf8(&ix.data).is_err() {
                return Err(LedgerError::fatal("memo is not valid UTF-8"));
            }
        }

        let fee = state.fee;
        let balance = state.balances.get(&fee_payer).copied().unwrap_or(0);
        if balance < fee {
            return Err(LedgerError::fatal(format!(
                "insufficient funds for fee: balance {balance}, fee {fee}"
            )));
        }
        state.balances.insert(fee_payer, balance - fee);

        state.submitted.push(SubmittedTransaction {
            signature,
            fee_payer,
            recent_blockhash: tx.message.recent_blockhash,
            memo: tx.message.memos().flatten().copied().collect(),
        });
        debug!(%signature, %fee_payer, "transaction accepted");

        if state.ambiguous_acks > 0 {
            state.ambiguous_acks -= 1;
            return Ok(SubmitOutcome::Ambiguous);
        }
        Ok(SubmitOutcome::Accepted(signature))
    }
}

impl std::fmt::Debug for InMemoryLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let submitted = self.submitted().len();
        f.debug_struct("InMemoryLedger")
            .field("submitted", &submitted)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::Message;
    use notar_crypto::SigningKey;

    fn signed_memo(ledger: &InMemoryLedger, key: &SigningKey, memo: &[u8]) -> Vec<u8> {
        let blockhash = ledger.get_recent_blockhash().unwrap();
        let message = Message::new_memo(&key.address(), memo, blockhash);
        Transaction::sign(message, key).unwrap().serialize().unwrap()
    }

    #[test]
    fn instant_airdrop_credits_balance() {
        let ledger = InMemoryLedger::new();
        let addr = Address::from_bytes([1; 32]);
        ledger.request_funding(&addr, 1_000).unwrap();
        assert_eq!(ledger.get_balance(&addr).unwrap(), 1_000);
    }

    #[test]
    fn deferred_airdrop_lands_after_queries() {
        let ledger = InMemoryLedger::new().with_airdrop_mode(AirdropMode::AfterQueries(2));
        let addr = Address::from_bytes([1; 32]);
        ledger.request_funding(&addr, 500).unwrap();
        assert_eq!(ledger.get_balance(&addr).unwrap(), 0);
        assert_eq!(ledger.get_balance(&addr).unwrap(), 0);
        assert_eq!(ledger.get_balance(&addr).unwrap(), 500);
    }

    #[test]
    fn never_mode_does_not_credit() {
        let ledger = InMemoryLedger::new().with_airdrop_mode(AirdropMode::Never);
        let addr = Address::from_bytes([1; 32]);
        ledger.request_funding(&addr, 500).unwrap();
        for _ in 0..5 {
            assert_eq!(ledger.get_balance(&addr).unwrap(), 0);
        }
    }

    #[test]
    fn injected_faults_are_fifo_then_clear() {
        let ledger = InMemoryLedger::new();
        ledger.inject_fault(Operation::GetRecentBlockhash, LedgerError::transient("a"));
        ledger.inject_fault(Operation::GetRecentBlockhash, LedgerError::fatal("b"));
        assert_eq!(
            ledger.get_recent_blockhash(),
            Err(LedgerError::transient("a"))
        );
        assert_eq!(ledger.get_recent_blockhash(), Err(LedgerError::fatal("b")));
        assert!(ledger.get_recent_blockhash().is_ok());
        assert_eq!(ledger.calls(Operation::GetRecentBlockhash), 3);
    }

    #[test]
    fn blockhashes_are_distinct() {
        let ledger = InMemoryLedger::new();
        let a = ledger.get_recent_blockhash().unwrap();
        let b = ledger.get_recent_blockhash().unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn accepted_submission_charges_fee_and_echoes_signature() {
        let key = SigningKey::from_bytes([2; 32]);
        let ledger = InMemoryLedger::new().with_balance(key.address(), 10_000);
        let wire = signed_memo(&ledger, &key, b"memo");
        let expected = *Transaction::deserialize(&wire).unwrap().signature().unwrap();

        let outcome = ledger
            .submit_raw_transaction(&wire, &SubmitOptions::default())
            .unwrap();
        assert_eq!(outcome, SubmitOutcome::Accepted(expected));
        assert_eq!(ledger.balance_of(&key.address()), 10_000 - DEFAULT_FEE);

        let submitted = ledger.submitted();
        assert_eq!(submitted.len(), 1);
        assert_eq!(submitted[0].memo, b"memo");
        assert_eq!(submitted[0].fee_payer, key.address());
    }

    #[test]
    fn expired_blockhash_rejected() {
        let key = SigningKey::from_bytes([2; 32]);
        let ledger = InMemoryLedger::new().with_balance(key.address(), 10_000);
        let wire = signed_memo(&ledger, &key, b"memo");
        ledger.expire_blockhashes();
        assert!(matches!(
            ledger.submit_raw_transaction(&wire, &SubmitOptions::default()),
            Err(LedgerError::BlockhashExpired(_))
        ));
    }

    #[test]
    fn unfunded_payer_rejected() {
        let key = SigningKey::from_bytes([2; 32]);
        let ledger = InMemoryLedger::new();
        let wire = signed_memo(&ledger, &key, b"memo");
        let err = ledger
            .submit_raw_transaction(&wire, &SubmitOptions::default())
            .unwrap_err();
        assert!(!err.is_retryable());
    }

    #[test]
    fn duplicate_submission_rejected() {
        let key = SigningKey::from_bytes([2; 32]);
        let ledger = InMemoryLedger::new().with_balance(key.address(), 10_000);
        let wire = signed_memo(&ledger, &key, b"memo");
        ledger
            .submit_raw_transaction(&wire, &SubmitOptions::default())
            .unwrap();
        assert!(matches!(
            ledger.submit_raw_transaction(&wire, &SubmitOptions::default()),
            Err(LedgerError::Fatal(_))
        ));
    }

    #[test]
    fn garbage_bytes_are_fatal() {
        let ledger = InMemoryLedger::new();
        assert!(matches!(
            ledger.submit_raw_transaction(&[1, 2, 3], &SubmitOptions::default()),
            Err(LedgerError::Fatal(_))
        ));
    }

    #[test]
    fn ambiguous_ack_still_records_transaction() {
        let key = SigningKey::from_bytes([2; 32]);
        let ledger = InMemoryLedger::new().with_balance(key.address(), 10_000);
        ledger.acknowledge_ambiguously(1);
        let wire = signed_memo(&ledger, &key, b"memo");
        assert_eq!(
            ledger
                .submit_raw_transaction(&wire, &SubmitOptions::default())
                .unwrap(),
            SubmitOutcome::Ambiguous
        );
        assert_eq!(ledger.submitted().len(), 1);
    }
}
