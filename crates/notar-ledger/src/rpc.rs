//! JSON-RPC 2.0 client for a ledger node.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use notar_types::{Address, Blockhash, Lamports, TxSignature};
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::error::{LedgerError, LedgerResult};
use crate::traits::{Commitment, LedgerClient, SubmitOptions, SubmitOutcome};

/// Node-side error codes that describe temporary conditions.
const TRANSIENT_RPC_CODES: &[i64] = &[
    -32004, // block not available
    -32005, // node unhealthy / behind
    -32014, // block status not yet available
    -32016, // minimum context slot not reached
];

/// [`LedgerClient`] over HTTP JSON-RPC.
///
/// Each call is a single blocking request. Failures are classified, never
/// retried here.
pub struct RpcLedgerClient {
    agent: ureq::Agent,
    url: String,
    commitment: Commitment,
    next_id: AtomicU64,
}

impl RpcLedgerClient {
    /// Client for `url` with the same timeout applied to connect, read and
    /// write.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(timeout)
            .timeout_read(timeout)
            .timeout_write(timeout)
            .user_agent(concat!("notar/", env!("CARGO_PKG_VERSION")))
            .build();
        Self {
            agent,
            url: url.into(),
            commitment: Commitment::default(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Builder: commitment level for balance and blockhash queries.
    pub fn with_commitment(mut self, commitment: Commitment) -> Self {
        self.commitment = commitment;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn commitment(&self) -> Commitment {
        self.commitment
    }

    /// POST one request. Status and transport failures are classified here;
    /// the body is returned unread.
    fn post(&self, method: &str, params: Value) -> LedgerResult<ureq::Response> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });
        debug!(method, id, url = %self.url, "rpc request");

        match self
            .agent
            .post(&self.url)
            .set("Content-Type", "application/json")
            .send_json(request)
        {
            Ok(response) => Ok(response),
            Err(ureq::Error::Status(code, _)) => Err(classify_status(code, method)),
            Err(ureq::Error::Transport(transport)) => Err(LedgerError::transient(format!(
                "{method}: transport error: {transport}"
            ))),
        }
    }

    /// POST and return the `result` member, or the classified `error`.
    fn call(&self, method: &str, params: Value) -> LedgerResult<Value> {
        let response = self.post(method, params)?;
        let body: Value = response.into_json().map_err(|e| {
            LedgerError::transient(format!("{method}: unreadable response body: {e}"))
        })?;
        extract_result(method, body)
    }
}

impl std::fmt::Debug for RpcLedgerClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcLedgerClient")
            .field("url", &self.url)
            .field("commitment", &self.commitment)
            .finish_non_exhaustive()
    }
}

impl LedgerClient for RpcLedgerClient {
    fn get_balance(&self, address: &Address) -> LedgerResult<Lamports> {
        let result = self.call(
            "getBalance",
            json!([address.to_base58(), { "commitment": self.commitment.as_str() }]),
        )?;
        parse_balance(&result)
    }

    fn request_funding(&self, address: &Address, amount: Lamports) -> LedgerResult<()> {
        let result = self.call("requestAirdrop", json!([address.to_base58(), amount]))?;
        debug!(%address, amount, airdrop = %result, "funding requested");
        Ok(())
    }

    fn get_recent_blockhash(&self) -> LedgerResult<Blockhash> {
        let result = self.call(
            "getLatestBlockhash",
            json!([{ "commitment": self.commitment.as_str() }]),
        )?;
        parse_blockhash(&result)
    }

    fn submit_raw_transaction(
        &self,
        transaction: &[u8],
        options: &SubmitOptions,
    ) -> LedgerResult<SubmitOutcome> {
        let mut config = json!({
            "encoding": "base64",
            "skipPreflight": options.skip_preflight,
            "preflightCommitment": options.preflight_commitment.as_str(),
        });
        if let Some(max_retries) = options.max_retries {
            config["maxRetries"] = json!(max_retries);
        }
        let response = self.post(
            "sendTransaction",
            json!([BASE64.encode(transaction), config]),
        )?;

        // The node took the request; from here on, anything we cannot read
        // leaves the transaction's fate unknown rather than failed.
        let body: Value = match response.into_json() {
            Ok(body) => body,
            Err(e) => {
                warn!(error = %e, "sendTransaction response unreadable");
                return Ok(SubmitOutcome::Ambiguous);
            }
        };
        if let Some(error) = body.get("error") {
            return Err(classify_rpc_error("sendTransaction", error));
        }
        Ok(send_outcome(body.get("result")))
    }
}

/// Classify a non-2xx HTTP status.
fn classify_status(code: u16, method: &str) -> LedgerError {
    let msg = format!("{method}: http status {code}");
    if code == 429 || code >= 500 {
        LedgerError::Transient(msg)
    } else {
        LedgerError::Fatal(msg)
    }
}

/// Classify a JSON-RPC `error` object.
fn classify_rpc_error(method: &str, error: &Value) -> LedgerError {
    let code = error.get("code").and_then(Value::as_i64).unwrap_or(0);
    let message = error
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or("unknown error");
    let msg = format!("{method}: rpc error {code}: {message}");
    let lower = message.to_ascii_lowercase();

    if lower.contains("blockhash not found") {
        LedgerError::BlockhashExpired(msg)
    } else if TRANSIENT_RPC_CODES.contains(&code)
        || lower.contains("rate limit")
        || lower.contains("too many requests")
    {
        LedgerError::Transient(msg)
    } else {
        LedgerError::Fatal(msg)
    }
}

fn extract_result(method: &str, mut body: Value) -> LedgerResult<Value> {
    if let Some(error) = body.get("error") {
        return Err(classify_rpc_error(method, error));
    }
    match body.get_mut("result") {
        Some(result) => Ok(result.take()),
        None => Err(LedgerError::fatal(format!(
            "{method}: response has neither result nor error"
        ))),
    }
}

fn parse_balance(result: &Value) -> LedgerResult<Lamports> {
    result
        .get("value")
        .and_then(Value::as_u64)
        .ok_or_else(|| LedgerError::fatal(format!("getBalance: malformed result {result}")))
}

fn parse_blockhash(result: &Value) -> LedgerResult<Blockhash> {
    let text = result
        .get("value")
        .and_then(|v| v.get("blockhash"))
        .and_then(Value::as_str)
        .ok_or_else(|| {
            LedgerError::fatal(format!("getLatestBlockhash: malformed result {result}"))
        })?;
    Blockhash::from_base58(text)
        .map_err(|e| LedgerError::fatal(format!("getLatestBlockhash: bad blockhash: {e}")))
}

/// A `sendTransaction` result is the base58 signature. Anything else is an
/// acknowledgement we cannot tie to a transaction.
fn send_outcome(result: Option<&Value>) -> SubmitOutcome {
    match result
        .and_then(Value::as_str)
        .map(TxSignature::from_base58)
    {
        Some(Ok(signature)) => SubmitOutcome::Accepted(signature),
        _ => SubmitOutcome::Ambiguous,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limit_and_server_errors_are_transient() {
        assert!(matches!(classify_status(429, "m"), LedgerError::Transient(_)));
        assert!(matches!(classify_status(503, "m"), LedgerError::Transient(_)));
        assert!(matches!(classify_status(400, "m"), LedgerError::Fatal(_)));
        assert!(matches!(classify_status(404, "m"), LedgerError::Fatal(_)));
    }

    #[test]
    fn blockhash_not_found_is_expired() {
        let error = json!({
            "code": -32002,
            "message": "Transaction simulation failed: Blockhash not found"
        });
        assert!(matches!(
            classify_rpc_error("sendTransaction", &error),
            LedgerError::BlockhashExpired(_)
        ));
    }

    #[test]
    fn node_health_codes_are_transient() {
        for code in TRANSIENT_RPC_CODES {
            let error = json!({ "code": code, "message": "node is behind" });
            assert!(classify_rpc_error("getBalance", &error).is_retryable());
        }
        let error = json!({ "code": -32600, "message": "rate limit exceeded" });
        assert!(matches!(
            classify_rpc_error("getBalance", &error),
            LedgerError::Transient(_)
        ));
    }

    #[test]
    fn other_rpc_errors_are_fatal() {
        let error = json!({
            "code": -32002,
            "message": "Transaction simulation failed: Attempt to debit an account but found no record of a prior credit."
        });
        assert!(matches!(
            classify_rpc_error("sendTransaction", &error),
            LedgerError::Fatal(_)
        ));
        assert!(matches!(
            classify_rpc_error("x", &json!({})),
            LedgerError::Fatal(_)
        ));
    }

    #[test]
    fn extract_result_prefers_error() {
        let body = json!({ "jsonrpc": "2.0", "id": 1, "result": 5 });
        assert_eq!(extract_result("m", body).unwrap(), json!(5));

        let body = json!({ "jsonrpc": "2.0", "id": 1, "error": { "code": -32005, "message": "x" } });
        assert!(extract_result("m", body).unwrap_err().is_retryable());

        let body = json!({ "jsonrpc": "2.0", "id": 1 });
        assert!(matches!(extract_result("m", body), Err(LedgerError::Fatal(_))));
    }

    #[test]
    fn parses_balance_and_blockhash() {
        let balance = json!({ "context": { "slot": 1 }, "value": 1_500_000 });
        assert_eq!(parse_balance(&balance).unwrap(), 1_500_000);

        let hash = Blockhash::from_bytes([9; 32]);
        let result = json!({
            "context": { "slot": 1 },
            "value": { "blockhash": hash.to_base58(), "lastValidBlockHeight": 100 }
        });
        assert_eq!(parse_blockhash(&result).unwrap(), hash);

        assert!(parse_balance(&json!({ "value": "x" })).is_err());
        assert!(parse_blockhash(&json!({ "value": { "blockhash": "0OIl" } })).is_err());
    }

    #[test]
    fn send_outcome_requires_parsable_signature() {
        let sig = TxSignature::from_bytes([3; 64]);
        let text = json!(sig.to_base58());
        assert_eq!(send_outcome(Some(&text)), SubmitOutcome::Accepted(sig));
        assert_eq!(send_outcome(None), SubmitOutcome::Ambiguous);
        assert_eq!(send_outcome(Some(&json!(null))), SubmitOutcome::Ambiguous);
        assert_eq!(send_outcome(Some(&json!(42))), SubmitOutcome::Ambiguous);
        assert_eq!(send_outcome(Some(&json!("not-a-sig"))), SubmitOutcome::Ambiguous);
    }

    #[test]
    fn unreachable_node_is_transient() {
        let client = RpcLedgerClient::new("http://127.0.0.1:1", Duration::from_millis(500))
            .with_commitment(Commitment::Finalized);
        assert_eq!(client.url(), "http://127.0.0.1:1");
        assert_eq!(client.commitment(), Commitment::Finalized);
        let err = client.get_recent_blockhash().unwrap_err();
        assert!(matches!(err, LedgerError::Transient(_)), "{err:?}");
    }
}
