//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for a deposit task.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for one deposit task.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct DepositConfig {
    /// Node connection settings.
    pub node: NodeConfig,

    /// What to deposit, where, and at which gas price.
    pub deposit: DepositSettings,

    /// Where the signing key comes from.
    pub signer: SignerConfig,

    /// Transaction delivery path.
    pub broadcast: BroadcastConfig,

    /// Retry policy for failed attempts.
    pub retry: RetryConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Node connection configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct NodeConfig {
    /// JSON-RPC endpoint. `ws://`/`wss://` subscribe to new heads,
    /// `http://`/`https://` poll the block number.
    pub rpc_endpoint: String,

    /// Expected chain ID. Queried from the node when absent.
    pub chain_id: Option<u64>,

    /// Per-request RPC timeout in seconds.
    pub rpc_timeout_secs: u64,

    /// Block polling interval for HTTP endpoints, in milliseconds.
    pub block_poll_interval_ms: u64,

    /// Receipt polling interval while waiting for the approval, in milliseconds.
    pub receipt_poll_interval_ms: u64,

    /// Maximum time to wait for the approval to be mined, in seconds.
    pub approval_timeout_secs: u64,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            rpc_endpoint: "ws://localhost:8546".to_string(),
            chain_id: None,
            rpc_timeout_secs: 15,
            block_poll_interval_ms: 1000,
            receipt_poll_interval_ms: 2000,
            approval_timeout_secs: 300,
        }
    }
}

/// Repeat behavior once a deposit has been accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionMode {
    /// Stop after the first accepted deposit.
    SingleShot,
    /// Submit a fresh deposit on every block until stopped.
    Recurring,
}

/// Amount the guard approves when the allowance is short.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalPolicy {
    /// Approve `U256::MAX` once.
    Max,
    /// Approve exactly the deposit amount.
    Exact,
}

/// A decimal quantity written as a TOML string, integer, or float.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum DecimalValue {
    Text(String),
    Integer(u64),
    Float(f64),
}

impl DecimalValue {
    /// Canonical decimal text, as accepted by `parse_units`.
    pub fn as_decimal_string(&self) -> String {
        match self {
            DecimalValue::Text(s) => s.trim().to_string(),
            DecimalValue::Integer(n) => n.to_string(),
            DecimalValue::Float(f) => f.to_string(),
        }
    }
}

impl From<&str> for DecimalValue {
    fn from(s: &str) -> Self {
        DecimalValue::Text(s.to_string())
    }
}

/// Deposit task parameters.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DepositSettings {
    /// ERC-20 token being deposited.
    pub token_contract: String,

    /// Vault contract exposing `deposit(uint256)`.
    pub target_contract: String,

    /// Amount in whole token units (e.g. "100" or "12.5").
    pub amount: DecimalValue,

    /// Token decimals used to scale `amount`.
    pub token_decimals: u8,

    /// Gas limit for every transaction.
    pub gas_limit: u64,

    /// Gas price in gwei.
    pub gas_price_gwei: DecimalValue,

    /// Priority gas price in gwei for deposit transactions.
    pub fast_gas_price_gwei: Option<DecimalValue>,

    /// Single-shot or recurring submission.
    pub mode: SubmissionMode,

    /// Approval amount policy.
    pub approval: ApprovalPolicy,
}

impl Default for DepositSettings {
    fn default() -> Self {
        Self {
            // USDC on Arbitrum One
            token_contract: "0xaf88d065e77c8cc2239327c5edb3a432268e5831".to_string(),
            // autoUSDai vault
            target_contract: "0x62ddf301b21970e7cc12c34caac9ce9bc975c0a9".to_string(),
            amount: DecimalValue::Integer(0),
            token_decimals: 6,
            gas_limit: 500_000,
            gas_price_gwei: DecimalValue::Text("0.1".to_string()),
            fast_gas_price_gwei: None,
            mode: SubmissionMode::Recurring,
            approval: ApprovalPolicy::Max,
        }
    }
}

/// Signing key source.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SignerConfig {
    /// Environment variable holding the hex private key.
    pub private_key_env: String,
}

impl Default for SignerConfig {
    fn default() -> Self {
        Self {
            private_key_env: "DEPOSIT_PRIVATE_KEY".to_string(),
        }
    }
}

/// Which gateway delivers signed transactions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BroadcastStrategy {
    Direct,
    RelayBundle,
}

/// Broadcast configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BroadcastConfig {
    /// Selected delivery path.
    pub strategy: BroadcastStrategy,

    /// Direct broadcast settings.
    pub direct: DirectBroadcastConfig,

    /// Relay bundle settings.
    pub relay: RelayConfig,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            strategy: BroadcastStrategy::Direct,
            direct: DirectBroadcastConfig::default(),
            relay: RelayConfig::default(),
        }
    }
}

/// Direct broadcast configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DirectBroadcastConfig {
    /// Dedicated `eth_sendRawTransaction` endpoint. Uses the node when absent.
    pub endpoint: Option<String>,

    /// Submission timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for DirectBroadcastConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            timeout_secs: 15,
        }
    }
}

/// Private relay configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Relay HTTPS endpoint.
    pub endpoint: String,

    /// Environment variable holding the `Authorization` header value.
    pub auth_env: String,

    /// Number of blocks the bundle stays valid for.
    pub blocks_count: u64,

    /// Builder selector, comma separated (`all` targets every builder).
    pub builders: String,

    /// Submission timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.blxrbdn.com".to_string(),
            auth_env: "DEPOSIT_RELAY_AUTH".to_string(),
            blocks_count: 10,
            builders: "all".to_string(),
            timeout_secs: 15,
        }
    }
}

/// Retry configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Fixed delay between attempts in milliseconds.
    pub delay_ms: u64,

    /// Random jitter added to the delay, in milliseconds.
    pub jitter_ms: u64,

    /// Maximum consecutive retries before the task fails. Unbounded when absent.
    pub max_retries: Option<u32>,

    /// Maximum time spent retrying one attempt, in seconds. Unbounded when absent.
    pub deadline_secs: Option<u64>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            delay_ms: 1000,
            jitter_ms: 0,
            max_retries: None,
            deadline_secs: None,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Full,
    Compact,
    Pretty,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log line format.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Full,
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}
