//! Deposit task construction.
//!
//! Everything that can be checked offline is parsed here, so a bad key,
//! address or amount fails before the first network request.

use alloy::primitives::{Address, U256};
use std::sync::Arc;
use std::time::Duration;

use crate::blockchain::client::{AlloyNode, NodeClient};
use crate::blockchain::contracts::{deposit_calldata, parse_gwei, parse_token_amount};
use crate::blockchain::transaction::UnsignedTx;
use crate::blockchain::wallet::SigningIdentity;
use crate::broadcast::{BroadcastGateway, DirectBroadcast, RelayBundleBroadcast};
use crate::config::schema::{ApprovalPolicy, BroadcastStrategy, DepositConfig, SubmissionMode};
use crate::config::{read_secret, validate_config, ConfigError};
use crate::deposit::{DepositError, DepositResult};
use crate::resilience::RetryPolicy;

/// Immutable parameters of one deposit task.
#[derive(Debug, Clone)]
pub struct DepositTask {
    pub identity: SigningIdentity,
    pub token: Address,
    pub target: Address,
    /// Deposit amount in token base units.
    pub amount: U256,
    pub gas_limit: u64,
    /// Wei per gas for approvals (and deposits unless `fast_gas_price` is set).
    pub gas_price: u128,
    /// Wei per gas for deposits.
    pub fast_gas_price: Option<u128>,
    /// Expected chain ID; queried from the node when absent.
    pub chain_id: Option<u64>,
    pub mode: SubmissionMode,
    pub approval: ApprovalPolicy,
    pub retry: RetryPolicy,
    pub receipt_poll_interval: Duration,
    pub approval_timeout: Duration,
}

impl DepositTask {
    /// Build a task from configuration and raw key material.
    pub fn from_config(config: &DepositConfig, private_key: &str) -> DepositResult<Self> {
        let settings = &config.deposit;

        let identity = SigningIdentity::from_private_key(private_key)
            .map_err(|e| DepositError::Config(e.to_string()))?;
        let token = parse_address("deposit.token_contract", &settings.token_contract)?;
        let target = parse_address("deposit.target_contract", &settings.target_contract)?;

        let amount = parse_token_amount(&settings.amount.as_decimal_string(), settings.token_decimals)
            .map_err(|e| DepositError::Config(format!("deposit.amount: {}", e)))?;
        if amount.is_zero() {
            return Err(DepositError::Config("deposit.amount: must be greater than zero".to_string()));
        }

        let gas_price = parse_gwei(&settings.gas_price_gwei.as_decimal_string())
            .map_err(|e| DepositError::Config(format!("deposit.gas_price_gwei: {}", e)))?;
        let fast_gas_price = settings
            .fast_gas_price_gwei
            .as_ref()
            .map(|price| parse_gwei(&price.as_decimal_string()))
            .transpose()
            .map_err(|e| DepositError::Config(format!("deposit.fast_gas_price_gwei: {}", e)))?;

        if settings.gas_limit == 0 {
            return Err(DepositError::Config("deposit.gas_limit: must be greater than zero".to_string()));
        }

        Ok(Self {
            identity,
            token,
            target,
            amount,
            gas_limit: settings.gas_limit,
            gas_price,
            fast_gas_price,
            chain_id: config.node.chain_id,
            mode: settings.mode,
            approval: settings.approval,
            retry: RetryPolicy::from_config(&config.retry),
            receipt_poll_interval: Duration::from_millis(config.node.receipt_poll_interval_ms),
            approval_timeout: Duration::from_secs(config.node.approval_timeout_secs),
        })
    }

    /// Build a task, reading the key from the environment variable named in the config.
    pub fn from_env(config: &DepositConfig) -> DepositResult<Self> {
        validate_config(config).map_err(ConfigError::Validation)?;

        let private_key = read_secret(&config.signer.private_key_env)?;
        Self::from_config(config, &private_key)
    }

    /// Gas price used for deposit transactions.
    pub fn deposit_gas_price(&self) -> u128 {
        self.fast_gas_price.unwrap_or(self.gas_price)
    }

    /// Deposit transaction for one attempt.
    pub fn deposit_tx(&self, nonce: u64, chain_id: u64) -> UnsignedTx {
        UnsignedTx {
            from: self.identity.address(),
            to: self.target,
            nonce,
            gas_limit: self.gas_limit,
            gas_price: self.deposit_gas_price(),
            value: U256::ZERO,
            data: deposit_calldata(self.amount),
            chain_id,
        }
    }
}

fn parse_address(field: &str, value: &str) -> DepositResult<Address> {
    value
        .trim()
        .parse()
        .map_err(|_| DepositError::Config(format!("{}: invalid address '{}'", field, value)))
}

/// Connect the node described by `config.node`.
pub async fn connect_node(config: &DepositConfig) -> DepositResult<Arc<dyn NodeClient>> {
    let node = AlloyNode::connect(
        &config.node.rpc_endpoint,
        Duration::from_secs(config.node.rpc_timeout_secs),
        Duration::from_millis(config.node.block_poll_interval_ms),
    )
    .await?;

    Ok(Arc::new(node))
}

/// Build the gateway selected by `config.broadcast.strategy`.
///
/// Direct broadcast reuses `node` unless a dedicated endpoint is configured.
/// The relay credential is read from the environment.
pub async fn build_gateway(config: &DepositConfig, node: Arc<dyn NodeClient>) -> DepositResult<BroadcastGateway> {
    let broadcast = &config.broadcast;

    match broadcast.strategy {
        BroadcastStrategy::Direct => {
            let timeout = Duration::from_secs(broadcast.direct.timeout_secs);
            let target: Arc<dyn NodeClient> = match &broadcast.direct.endpoint {
                Some(endpoint) => Arc::new(
                    AlloyNode::connect(
                        endpoint,
                        timeout,
                        Duration::from_millis(config.node.block_poll_interval_ms),
                    )
                    .await?,
                ),
                None => node,
            };
            Ok(BroadcastGateway::Direct(DirectBroadcast::new(target, timeout)))
        }
        BroadcastStrategy::RelayBundle => {
            let credential = read_secret(&broadcast.relay.auth_env)?;
            let relay = RelayBundleBroadcast::from_config(&broadcast.relay, credential)?;
            Ok(BroadcastGateway::RelayBundle(relay))
        }
    }
}
