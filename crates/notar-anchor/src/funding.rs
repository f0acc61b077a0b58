use std::sync::Arc;

use notar_ledger::LedgerClient;
use notar_types::{Address, Lamports, LAMPORTS_PER_TOKEN};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::clock::{Clock, Deadline};
use crate::error::{FundingError, FundingResult};
use crate::retry::RetryPolicy;

/// How to top up and how long to wait for it.
#[derive(Clone, Debug, PartialEq)]
pub struct FundingPolicy {
    /// Amount asked for in the single funding request.
    pub top_up_amount: Lamports,
    /// Poll budget and spacing after the request. Also bounds retries of the
    /// initial balance query.
    pub poll: RetryPolicy,
}

impl Default for FundingPolicy {
    fn default() -> Self {
        Self {
            top_up_amount: LAMPORTS_PER_TOKEN,
            poll: RetryPolicy::funding_default(),
        }
    }
}

/// Result of a balance check.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum BalanceOutcome {
    /// Already at or above the minimum; nothing was requested.
    Sufficient { balance: Lamports },
    /// A top-up landed after `polls` balance polls.
    Funded { balance: Lamports, polls: u32 },
    /// The poll budget ran out before the balance reached `required`.
    Unconfirmed {
        last_balance: Lamports,
        required: Lamports,
        polls: u32,
    },
}

impl BalanceOutcome {
    pub fn is_funded(&self) -> bool {
        !matches!(self, Self::Unconfirmed { .. })
    }
}

/// Makes sure an account can pay for a transaction.
pub struct BalanceEnsurer {
    ledger: Arc<dyn LedgerClient>,
    clock: Arc<dyn Clock>,
    policy: FundingPolicy,
}

impl BalanceEnsurer {
    pub fn new(ledger: Arc<dyn LedgerClient>, clock: Arc<dyn Clock>, policy: FundingPolicy) -> Self {
        Self {
            ledger,
            clock,
            policy,
        }
    }

    /// Check `address` holds at least `minimum`, topping up if not.
    ///
    /// A funded account costs exactly one balance query. Otherwise one
    /// funding request is made and the balance is polled until it reaches
    /// `minimum` or the poll budget is spent.
    pub fn ensure(
        &self,
        address: &Address,
        minimum: Lamports,
        deadline: Option<&Deadline>,
    ) -> FundingResult<BalanceOutcome> {
        let balance = self.initial_balance(address, deadline)?;
        if balance >= minimum {
            debug!(%address, balance, minimum, "balance sufficient");
            return Ok(BalanceOutcome::Sufficient { balance });
        }

        let amount = self.policy.top_up_amount;
        info!(%address, balance, minimum, amount, "balance low; requesting funding");
        match self.ledger.request_funding(address, amount) {
            Ok(()) => {}
            Err(e) if e.is_retryable() => {
                warn!(%address, error = %e, "funding request failed; polling anyway");
            }
            Err(e) => return Err(FundingError::Ledger(e)),
        }

        let mut last_balance = balance;
        let mut polls = 0;
        while self.policy.poll.allows_another(polls) {
            self.check_deadline(deadline, polls)?;
            self.clock.sleep(self.policy.poll.delay_for_attempt(polls + 1));
            polls += 1;

            match self.ledger.get_balance(address) {
                Ok(balance) => {
                    last_balance = balance;
                    if balance >= minimum {
                        info!(%address, balance, polls, "funding landed");
                        return Ok(BalanceOutcome::Funded { balance, polls });
                    }
                    debug!(%address, balance, polls, "funding not yet visible");
                }
                Err(e) if e.is_retryable() => {
                    debug!(%address, polls, error = %e, "balance poll failed");
                }
                Err(e) => return Err(FundingError::Ledger(e)),
            }
        }

        warn!(
            %address,
            last_balance,
            required = minimum,
            polls,
            "funding not confirmed within poll budget"
        );
        Ok(BalanceOutcome::Unconfirmed {
            last_balance,
            required: minimum,
            polls,
        })
    }

    /// First balance query, retrying transient failures under the poll policy.
    fn initial_balance(
        &self,
        address: &Address,
        deadline: Option<&Deadline>,
    ) -> FundingResult<Lamports> {
        let mut attempts = 0;
        loop {
            self.check_deadline(deadline, 0)?;
            attempts += 1;
            match self.ledger.get_balance(address) {
                Ok(balance) => return Ok(balance),
                Err(e) if e.is_retryable() && self.policy.poll.allows_another(attempts) => {
                    debug!(%address, attempts, error = %e, "balance query failed; retrying");
                    self.clock.sleep(self.policy.poll.delay_for_attempt(attempts));
                }
                Err(e) => return Err(FundingError::Ledger(e)),
            }
        }
    }

    fn check_deadline(&self, deadline: Option<&Deadline>, polls: u32) -> FundingResult<()> {
        match deadline {
            Some(d) if d.is_expired(self.clock.as_ref()) => {
                Err(FundingError::DeadlineExceeded { polls })
            }
            _ => Ok(()),
        }
    }
}

impl std::fmt::Debug for BalanceEnsurer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BalanceEnsurer")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}
