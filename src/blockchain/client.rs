//! Node RPC client with timeout and error handling.
//!
//! # Responsibilities
//! - Connect to a JSON-RPC endpoint (WebSocket or HTTP)
//! - Query chain state (allowance, nonce, receipts)
//! - Simulate and broadcast transactions
//! - Deliver new block numbers as a stream

use alloy::network::TransactionBuilder;
use alloy::primitives::{Address, TxHash, U256};
use alloy::providers::{Provider, ProviderBuilder, WsConnect};
use alloy::rpc::types::TransactionRequest;
use alloy::transports::{RpcError, TransportError};
use async_trait::async_trait;
use futures_util::StreamExt;
use std::future::{Future, IntoFuture};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

use crate::blockchain::contracts::{allowance_calldata, decode_uint256};
use crate::blockchain::types::{BlockStream, BlockchainError, BlockchainResult, TransactionReceipt};

/// The node operations a deposit task depends on.
#[async_trait]
pub trait NodeClient: Send + Sync {
    /// Chain ID reported by the node.
    async fn chain_id(&self) -> BlockchainResult<u64>;

    /// Latest block number.
    async fn block_number(&self) -> BlockchainResult<u64>;

    /// ERC-20 `allowance(owner, spender)` on `token`.
    async fn allowance(&self, token: Address, owner: Address, spender: Address) -> BlockchainResult<U256>;

    /// Transaction count (next nonce) for an address at the latest block.
    async fn transaction_count(&self, address: Address) -> BlockchainResult<u64>;

    /// Dry-run the request and return the gas it would use.
    async fn estimate_gas(&self, request: &TransactionRequest) -> BlockchainResult<u64>;

    /// Broadcast signed bytes via `eth_sendRawTransaction`.
    async fn send_raw_transaction(&self, raw: &[u8]) -> BlockchainResult<TxHash>;

    /// Receipt for a mined transaction, `None` while pending.
    async fn transaction_receipt(&self, tx_hash: TxHash) -> BlockchainResult<Option<TransactionReceipt>>;

    /// Subscribe to new blocks. Dropping the stream unsubscribes.
    async fn subscribe_blocks(&self) -> BlockchainResult<BlockStream>;
}

/// Map an alloy transport error onto our taxonomy.
pub fn map_rpc_error(error: TransportError) -> BlockchainError {
    match error {
        RpcError::ErrorResp(payload) => BlockchainError::RpcRejected {
            code: payload.code,
            message: payload.message.to_string(),
        },
        other => BlockchainError::Network(other.to_string()),
    }
}

/// Node client backed by an alloy provider.
#[derive(Clone)]
pub struct AlloyNode {
    provider: Arc<dyn Provider + Send + Sync>,
    endpoint: String,
    /// Whether the transport supports `eth_subscribe`.
    pubsub: bool,
    /// Request timeout duration.
    timeout_duration: Duration,
    /// Block polling interval when `pubsub` is false.
    poll_interval: Duration,
}

impl AlloyNode {
    /// Connect to a node.
    ///
    /// # Arguments
    /// * `endpoint` - `ws(s)://` or `http(s)://` URL
    /// * `rpc_timeout` - Ceiling for every request
    /// * `poll_interval` - Block polling interval for HTTP endpoints
    pub async fn connect(endpoint: &str, rpc_timeout: Duration, poll_interval: Duration) -> BlockchainResult<Self> {
        let url: url::Url = endpoint
            .parse()
            .map_err(|e| BlockchainError::Network(format!("Invalid RPC URL '{}': {}", endpoint, e)))?;

        let (provider, pubsub): (Arc<dyn Provider + Send + Sync>, bool) = match url.scheme() {
            "ws" | "wss" => {
                let connect = ProviderBuilder::new().connect_ws(WsConnect::new(url.as_str()));
                let provider = match timeout(rpc_timeout, connect).await {
                    Ok(Ok(provider)) => provider,
                    Ok(Err(e)) => return Err(map_rpc_error(e)),
                    Err(_) => return Err(BlockchainError::Timeout(rpc_timeout.as_secs())),
                };
                (Arc::new(provider), true)
            }
            "http" | "https" => (Arc::new(ProviderBuilder::new().connect_http(url)), false),
            other => {
                return Err(BlockchainError::Network(format!("Unsupported RPC scheme '{}'", other)));
            }
        };

        tracing::info!(endpoint = %redact_endpoint(endpoint), pubsub, "Node client connected");

        Ok(Self {
            provider,
            endpoint: endpoint.to_string(),
            pubsub,
            timeout_duration: rpc_timeout,
            poll_interval,
        })
    }

    /// Run one RPC call under the request timeout.
    async fn call<T, F>(&self, op: &'static str, fut: F) -> BlockchainResult<T>
    where
        F: IntoFuture<Output = Result<T, TransportError>>,
    {
        match timeout(self.timeout_duration, fut).await {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(e)) => {
                tracing::debug!(op, error = %e, "RPC error");
                Err(map_rpc_error(e))
            }
            Err(_) => {
                tracing::warn!(op, timeout_secs = self.timeout_duration.as_secs(), "RPC timeout");
                Err(BlockchainError::Timeout(self.timeout_duration.as_secs()))
            }
        }
    }

    /// Block stream for transports without `eth_subscribe`, starting after `head`.
    fn polled_blocks(&self, head: u64) -> BlockStream {
        let provider = self.provider.clone();
        let request_timeout = self.timeout_duration;

        poll_new_blocks(head, self.poll_interval, move || {
            let provider = provider.clone();
            async move {
                match timeout(request_timeout, provider.get_block_number()).await {
                    Ok(result) => result.map_err(map_rpc_error),
                    Err(_) => Err(BlockchainError::Timeout(request_timeout.as_secs())),
                }
            }
        })
    }
}

/// Poll `fetch` every `interval` and yield each block number above the last one seen.
///
/// Polls that fail or report no progress are skipped.
fn poll_new_blocks<F, Fut>(head: u64, interval: Duration, fetch: F) -> BlockStream
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = BlockchainResult<u64>> + Send + 'static,
{
    let fetch = Arc::new(fetch);

    futures_util::stream::unfold(head, move |last| {
        let fetch = fetch.clone();
        async move {
            loop {
                tokio::time::sleep(interval).await;
                match fetch().await {
                    Ok(number) if number > last => return Some((number, number)),
                    Ok(_) => {}
                    Err(e) => tracing::warn!(error = %e, "Block poll failed"),
                }
            }
        }
    })
    .boxed()
}

#[async_trait]
impl NodeClient for AlloyNode {
    async fn chain_id(&self) -> BlockchainResult<u64> {
        self.call("eth_chainId", self.provider.get_chain_id()).await
    }

    async fn block_number(&self) -> BlockchainResult<u64> {
        self.call("eth_blockNumber", self.provider.get_block_number()).await
    }

    async fn allowance(&self, token: Address, owner: Address, spender: Address) -> BlockchainResult<U256> {
        let request = TransactionRequest::default()
            .with_to(token)
            .with_input(allowance_calldata(owner, spender));
        let output = self.call("eth_call", self.provider.call(request)).await?;
        decode_uint256(&output)
    }

    async fn transaction_count(&self, address: Address) -> BlockchainResult<u64> {
        self.call("eth_getTransactionCount", self.provider.get_transaction_count(address)).await
    }

    async fn estimate_gas(&self, request: &TransactionRequest) -> BlockchainResult<u64> {
        self.call("eth_estimateGas", self.provider.estimate_gas(request.clone())).await
    }

    async fn send_raw_transaction(&self, raw: &[u8]) -> BlockchainResult<TxHash> {
        let pending = self
            .call("eth_sendRawTransaction", self.provider.send_raw_transaction(raw))
            .await?;
        Ok(*pending.tx_hash())
    }

    async fn transaction_receipt(&self, tx_hash: TxHash) -> BlockchainResult<Option<TransactionReceipt>> {
        let receipt = self
            .call("eth_getTransactionReceipt", self.provider.get_transaction_receipt(tx_hash))
            .await?;
        Ok(receipt.map(|r| TransactionReceipt {
            transaction_hash: tx_hash,
            accepted: r.status(),
            block_number: r.block_number,
        }))
    }

    async fn subscribe_blocks(&self) -> BlockchainResult<BlockStream> {
        if !self.pubsub {
            // Only blocks after the current head count as new
            let head = self.block_number().await?;
            tracing::debug!(head, interval_ms = self.poll_interval.as_millis() as u64, "Polling for new blocks");
            return Ok(self.polled_blocks(head));
        }

        let subscription = self.call("eth_subscribe", self.provider.subscribe_blocks()).await?;
        Ok(subscription.into_stream().map(|header| header.number).boxed())
    }
}

impl std::fmt::Debug for AlloyNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlloyNode")
            .field("endpoint", &redact_endpoint(&self.endpoint))
            .field("pubsub", &self.pubsub)
            .field("timeout_secs", &self.timeout_duration.as_secs())
            .finish()
    }
}

/// Strip the path and query of an endpoint; providers often embed API keys there.
pub fn redact_endpoint(endpoint: &str) -> String {
    match url::Url::parse(endpoint) {
        Ok(url) => match url.host_str() {
            Some(host) => format!("{}://{}", url.scheme(), host),
            None => url.scheme().to_string(),
        },
        Err(_) => "<invalid>".to_string(),
    }
}
