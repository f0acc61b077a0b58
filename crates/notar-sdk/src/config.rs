use std::path::{Path, PathBuf};
use std::time::Duration;

use notar_anchor::{FundingPolicy, RetryPolicy};
use notar_crypto::DigestComputer;
use notar_ledger::{Commitment, SubmitOptions};
use notar_types::{Lamports, LAMPORTS_PER_TOKEN};
use serde::{Deserialize, Serialize};

use crate::service::UnfundedPolicy;

/// Errors from loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config syntax: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("cannot encode config: {0}")]
    Encode(#[from] toml::ser::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Top-level Notar configuration, read from TOML.
///
/// Every section is optional; missing values fall back to devnet defaults.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NotarConfig {
    /// JSON keypair file of the anchoring wallet.
    pub keypair_path: PathBuf,
    pub unfunded_policy: UnfundedPolicy,
    /// Read size used when digesting artifacts.
    pub digest_chunk_size: usize,
    pub rpc: RpcConfig,
    pub index: IndexConfig,
    pub funding: FundingConfig,
    pub submit: SubmitConfig,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RpcConfig {
    pub url: String,
    pub timeout_ms: u64,
    pub commitment: Commitment,
}

/// Where certificate records are kept.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum IndexConfig {
    Memory,
    File { path: PathBuf },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FundingConfig {
    /// Balance the wallet must hold before each issuance.
    pub min_balance: Lamports,
    pub top_up_amount: Lamports,
    pub poll_attempts: u32,
    pub poll_interval_ms: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SubmitConfig {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub skip_preflight: bool,
}

impl Default for NotarConfig {
    fn default() -> Self {
        Self {
            keypair_path: PathBuf::from("notar-keypair.json"),
            unfunded_policy: UnfundedPolicy::default(),
            digest_chunk_size: DigestComputer::DEFAULT_CHUNK_SIZE,
            rpc: RpcConfig::default(),
            index: IndexConfig::default(),
            funding: FundingConfig::default(),
            submit: SubmitConfig::default(),
        }
    }
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            url: "https://api.devnet.solana.com".into(),
            timeout_ms: 30_000,
            commitment: Commitment::Confirmed,
        }
    }
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self::File {
            path: PathBuf::from("notar-certificates.log"),
        }
    }
}

impl Default for FundingConfig {
    fn default() -> Self {
        Self {
            min_balance: 10_000,
            top_up_amount: LAMPORTS_PER_TOKEN,
            poll_attempts: 15,
            poll_interval_ms: 1_000,
        }
    }
}

impl Default for SubmitConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff_ms: 500,
            max_backoff_ms: 4_000,
            skip_preflight: false,
        }
    }
}

impl NotarConfig {
    /// Read and validate a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse without validating.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = self.rpc.url.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(invalid(format!("rpc.url must be an http(s) URL, got {url:?}")));
        }
        if self.rpc.timeout_ms == 0 {
            return Err(invalid("rpc.timeout_ms must be positive"));
        }
        if self.keypair_path.as_os_str().is_empty() {
            return Err(invalid("keypair_path must not be empty"));
        }
        if let IndexConfig::File { path } = &self.index {
            if path.as_os_str().is_empty() {
                return Err(invalid("index.path must not be empty"));
            }
        }
        if self.funding.poll_attempts == 0 {
            return Err(invalid("funding.poll_attempts must be at least 1"));
        }
        if self.funding.top_up_amount < self.funding.min_balance {
            return Err(invalid(format!(
                "funding.top_up_amount ({}) is below funding.min_balance ({})",
                self.funding.top_up_amount, self.funding.min_balance
            )));
        }
        if self.submit.max_attempts == 0 {
            return Err(invalid("submit.max_attempts must be at least 1"));
        }
        if self.submit.initial_backoff_ms > self.submit.max_backoff_ms {
            return Err(invalid("submit.initial_backoff_ms exceeds submit.max_backoff_ms"));
        }
        if self.digest_chunk_size == 0 {
            return Err(invalid("digest_chunk_size must be positive"));
        }
        Ok(())
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_millis(self.rpc.timeout_ms)
    }

    pub fn funding_policy(&self) -> FundingPolicy {
        FundingPolicy {
            top_up_amount: self.funding.top_up_amount,
            poll: RetryPolicy::fixed(
                self.funding.poll_attempts,
                Duration::from_millis(self.funding.poll_interval_ms),
            ),
        }
    }

    pub fn submit_policy(&self) -> RetryPolicy {
        RetryPolicy::exponential(
            self.submit.max_attempts,
            Duration::from_millis(self.submit.initial_backoff_ms),
            Duration::from_millis(self.submit.max_backoff_ms),
        )
    }

    pub fn submit_options(&self) -> SubmitOptions {
        SubmitOptions {
            skip_preflight: self.submit.skip_preflight,
            preflight_commitment: self.rpc.commitment,
            max_retries: None,
        }
    }
}

fn invalid(msg: impl Into<String>) -> ConfigError {
    ConfigError::Invalid(msg.into())
}
