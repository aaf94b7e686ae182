//! Direct broadcast through a node's `eth_sendRawTransaction`.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

use crate::blockchain::client::NodeClient;
use crate::blockchain::types::{BlockchainError, BlockchainResult, SignedTransaction, TransactionReceipt};

/// Sends signed bytes straight to a node.
#[derive(Clone)]
pub struct DirectBroadcast {
    node: Arc<dyn NodeClient>,
    timeout_duration: Duration,
}

impl DirectBroadcast {
    /// Create a direct gateway over `node` with a submission ceiling.
    pub fn new(node: Arc<dyn NodeClient>, timeout_duration: Duration) -> Self {
        Self { node, timeout_duration }
    }

    /// Submit one signed transaction.
    pub async fn submit(&self, signed: &SignedTransaction) -> BlockchainResult<TransactionReceipt> {
        let hash = match timeout(self.timeout_duration, self.node.send_raw_transaction(&signed.raw)).await {
            Ok(result) => result?,
            Err(_) => return Err(BlockchainError::Timeout(self.timeout_duration.as_secs())),
        };

        if hash != signed.hash {
            tracing::warn!(expected = %signed.hash, reported = %hash, "Node reported a different transaction hash");
        }

        Ok(TransactionReceipt::acknowledged(hash))
    }
}

impl std::fmt::Debug for DirectBroadcast {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectBroadcast")
            .field("timeout_secs", &self.timeout_duration.as_secs())
            .finish_non_exhaustive()
    }
}
