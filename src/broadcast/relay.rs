//! Private relay bundle submission.
//!
//! # Responsibilities
//! - Build `blxr_submit_bundle` JSON-RPC requests
//! - Attach the static relay credential to every request
//! - Map relay replies onto `BlockchainError`
//!
//! # Design Decisions
//! - The credential is injected at construction and never logged
//! - A bundle targets the block after the one that triggered the attempt

use alloy::hex;
use alloy::primitives::Bytes;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::time::Duration;
use uuid::Uuid;

use crate::blockchain::types::{BlockchainError, BlockchainResult, SignedTransaction, TransactionReceipt};
use crate::config::schema::RelayConfig;

/// Options attached to every bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleOptions {
    /// Number of blocks, starting at the target, the bundle stays valid for.
    pub blocks_count: u64,
    /// Comma-separated builder names; `all` targets every builder.
    pub builder_selector: String,
}

/// An ordered group of signed transactions for one target block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleSubmission {
    pub target_block_number: u64,
    pub raw_transactions: Vec<Bytes>,
    pub options: BundleOptions,
}

impl BundleSubmission {
    /// JSON-RPC body for the relay.
    pub fn to_request_body(&self, id: &str) -> Value {
        let transactions: Vec<String> = self.raw_transactions.iter().map(hex::encode).collect();

        let mut builders = Map::new();
        for name in self.options.builder_selector.split(',') {
            let name = name.trim();
            if !name.is_empty() {
                builders.insert(name.to_string(), Value::String(String::new()));
            }
        }

        json!({
            "id": id,
            "method": "blxr_submit_bundle",
            "params": {
                "transaction": transactions,
                "block_number": format!("{:#x}", self.target_block_number),
                "blocks_count": self.options.blocks_count,
                "mev_builders": builders,
            }
        })
    }
}

#[derive(Debug, Deserialize)]
struct RelayReply {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RelayErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RelayErrorBody {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
}

/// Submits bundles to an authenticated relay endpoint.
#[derive(Clone)]
pub struct RelayBundleBroadcast {
    client: reqwest::Client,
    endpoint: String,
    credential: String,
    options: BundleOptions,
    timeout_duration: Duration,
}

impl RelayBundleBroadcast {
    /// Create a relay gateway.
    ///
    /// # Arguments
    /// * `config` - Relay endpoint, bundle options and timeout
    /// * `credential` - Value of the `Authorization` header
    pub fn from_config(config: &RelayConfig, credential: String) -> BlockchainResult<Self> {
        let timeout_duration = Duration::from_secs(config.timeout_secs);
        let client = reqwest::Client::builder()
            .timeout(timeout_duration)
            .build()
            .map_err(|e| BlockchainError::Network(format!("Failed to build relay client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            credential,
            options: BundleOptions {
                blocks_count: config.blocks_count,
                builder_selector: config.builders.clone(),
            },
            timeout_duration,
        })
    }

    /// Build the single-transaction bundle for an attempt triggered at `current_block`.
    pub fn bundle_for(&self, signed: &SignedTransaction, current_block: u64) -> BundleSubmission {
        BundleSubmission {
            target_block_number: current_block + 1,
            raw_transactions: vec![signed.raw.clone()],
            options: self.options.clone(),
        }
    }

    /// Submit one signed transaction as a bundle.
    pub async fn submit(&self, signed: &SignedTransaction, current_block: u64) -> BlockchainResult<TransactionReceipt> {
        let bundle = self.bundle_for(signed, current_block);
        let result = self.submit_bundle(&bundle).await?;

        tracing::debug!(
            tx_hash = %signed.hash,
            target_block = bundle.target_block_number,
            result = %result,
            "Bundle accepted by relay"
        );

        Ok(TransactionReceipt::acknowledged(signed.hash))
    }

    /// Submit a bundle and return the relay's `result` value.
    pub async fn submit_bundle(&self, bundle: &BundleSubmission) -> BlockchainResult<Value> {
        let id = Uuid::new_v4().to_string();
        let body = bundle.to_request_body(&id);

        let response = self
            .client
            .post(&self.endpoint)
            .header(CONTENT_TYPE, "application/json")
            .header(AUTHORIZATION, &self.credential)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        let status = response.status();
        let text = response.text().await.map_err(|e| self.map_transport_error(e))?;

        let reply: RelayReply = match serde_json::from_str(&text) {
            Ok(reply) => reply,
            Err(_) if !status.is_success() => {
                return Err(BlockchainError::RelayRejected {
                    code: i64::from(status.as_u16()),
                    message: text,
                });
            }
            Err(e) => return Err(BlockchainError::Decode(format!("Relay reply: {}", e))),
        };

        if let Some(error) = reply.error {
            tracing::warn!(request_id = %id, code = error.code, message = %error.message, "Relay rejected bundle");
            return Err(BlockchainError::RelayRejected {
                code: error.code,
                message: error.message,
            });
        }

        if !status.is_success() {
            return Err(BlockchainError::RelayRejected {
                code: i64::from(status.as_u16()),
                message: text,
            });
        }

        Ok(reply.result.unwrap_or(Value::Null))
    }

    fn map_transport_error(&self, error: reqwest::Error) -> BlockchainError {
        if error.is_timeout() {
            BlockchainError::Timeout(self.timeout_duration.as_secs())
        } else {
            BlockchainError::Network(error.to_string())
        }
    }
}

impl std::fmt::Debug for RelayBundleBroadcast {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayBundleBroadcast")
            .field("endpoint", &self.endpoint)
            .field("options", &self.options)
            .field("timeout_secs", &self.timeout_duration.as_secs())
            .finish_non_exhaustive()
    }
}
