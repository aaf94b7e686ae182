//! Transaction building and inclusion monitoring.
//!
//! # Responsibilities
//! - Build immutable transaction requests (one per attempt)
//! - Wait for a transaction to be mined

use alloy::network::TransactionBuilder;
use alloy::primitives::{Address, Bytes, TxHash, U256};
use alloy::rpc::types::TransactionRequest;
use std::time::Duration;
use tokio::time::{interval, timeout, MissedTickBehavior};

use crate::blockchain::client::NodeClient;
use crate::blockchain::types::{BlockchainError, BlockchainResult, TransactionReceipt};

/// Fully specified legacy-priced transaction, before signing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsignedTx {
    pub from: Address,
    pub to: Address,
    pub nonce: u64,
    pub gas_limit: u64,
    /// Wei per gas.
    pub gas_price: u128,
    pub value: U256,
    pub data: Bytes,
    pub chain_id: u64,
}

impl UnsignedTx {
    /// Convert into an alloy request, suitable for `eth_estimateGas` and signing.
    pub fn to_request(&self) -> TransactionRequest {
        TransactionRequest::default()
            .with_from(self.from)
            .with_to(self.to)
            .with_nonce(self.nonce)
            .with_gas_limit(self.gas_limit)
            .with_gas_price(self.gas_price)
            .with_value(self.value)
            .with_input(self.data.clone())
            .with_chain_id(self.chain_id)
    }
}

/// Wait until a transaction is mined.
///
/// # Arguments
/// * `node` - Node to poll for the receipt
/// * `tx_hash` - Transaction hash to monitor
/// * `poll_interval` - Delay between receipt queries
/// * `max_wait` - Maximum time to wait for inclusion
///
/// Transient RPC errors while polling are logged and polling continues.
/// A mined receipt is returned even if the transaction reverted; check
/// `accepted`.
pub async fn wait_for_inclusion(
    node: &dyn NodeClient,
    tx_hash: TxHash,
    poll_interval: Duration,
    max_wait: Duration,
) -> BlockchainResult<TransactionReceipt> {
    let result = timeout(max_wait, async {
        let mut ticker = interval(poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            match node.transaction_receipt(tx_hash).await {
                Ok(Some(receipt)) if receipt.is_included() => return receipt,
                Ok(_) => {
                    tracing::debug!(tx_hash = %tx_hash, "Transaction pending");
                }
                Err(e) => {
                    tracing::warn!(tx_hash = %tx_hash, error = %e, "Receipt query failed, polling again");
                }
            }
        }
    })
    .await;

    result.map_err(|_| BlockchainError::InclusionTimeout(max_wait.as_secs()))
}
