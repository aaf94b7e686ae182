//! Transaction broadcast subsystem.
//!
//! # Data Flow
//! ```text
//! SignedTransaction
//!     → BroadcastGateway (selected once per task)
//!         → direct.rs (eth_sendRawTransaction to a node)
//!         → relay.rs  (blxr_submit_bundle to a private relay)
//!     → TransactionReceipt (acknowledged, not mined)
//! On failure:
//!     → classifier.rs (retry, resync nonce, accept, or fail)
//! ```

pub mod classifier;
pub mod direct;
pub mod relay;

pub use classifier::{classify, Disposition, RejectionKind};
pub use direct::DirectBroadcast;
pub use relay::{BundleOptions, BundleSubmission, RelayBundleBroadcast};

use crate::blockchain::types::{BlockchainResult, SignedTransaction, TransactionReceipt};

/// The delivery path chosen for a task.
#[derive(Debug, Clone)]
pub enum BroadcastGateway {
    Direct(DirectBroadcast),
    RelayBundle(RelayBundleBroadcast),
}

impl BroadcastGateway {
    /// Label for logs and metrics.
    pub fn path(&self) -> &'static str {
        match self {
            BroadcastGateway::Direct(_) => "direct",
            BroadcastGateway::RelayBundle(_) => "relay_bundle",
        }
    }

    /// Submit a signed transaction.
    ///
    /// `current_block` is the block that triggered the attempt; the relay
    /// path targets the block after it.
    pub async fn submit(&self, signed: &SignedTransaction, current_block: u64) -> BlockchainResult<TransactionReceipt> {
        match self {
            BroadcastGateway::Direct(gateway) => gateway.submit(signed).await,
            BroadcastGateway::RelayBundle(gateway) => gateway.submit(signed, current_block).await,
        }
    }
}
