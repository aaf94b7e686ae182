//! Chain-specific types and error definitions.

use alloy::primitives::{Bytes, TxHash};
use futures_util::stream::BoxStream;
use thiserror::Error;

/// Stream of new block numbers from a node subscription.
///
/// Dropping the stream unsubscribes.
pub type BlockStream = BoxStream<'static, u64>;

/// Errors that can occur during blockchain operations.
#[derive(Debug, Clone, Error)]
pub enum BlockchainError {
    /// Node answered with a JSON-RPC error object.
    #[error("RPC rejected ({code}): {message}")]
    RpcRejected { code: i64, message: String },

    /// Relay answered with an error object.
    #[error("Relay rejected ({code}): {message}")]
    RelayRejected { code: i64, message: String },

    /// Connection failure, dropped socket, or malformed transport response.
    #[error("Network error: {0}")]
    Network(String),

    /// RPC request timed out.
    #[error("RPC timeout after {0} seconds")]
    Timeout(u64),

    /// Secret key material could not be parsed.
    #[error("Invalid key material: {0}")]
    InvalidKeyMaterial(String),

    /// Transaction could not be built or signed.
    #[error("Signing failed: {0}")]
    Signing(String),

    /// Response could not be decoded.
    #[error("Decode error: {0}")]
    Decode(String),

    /// Transaction was not mined within the allowed time.
    #[error("Transaction not mined after {0} seconds")]
    InclusionTimeout(u64),

    /// Chain configuration mismatch.
    #[error("Chain ID mismatch: expected {expected}, got {actual}")]
    ChainMismatch { expected: u64, actual: u64 },
}

/// Result type for blockchain operations.
pub type BlockchainResult<T> = Result<T, BlockchainError>;

/// Logical receipt for a submitted or mined transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransactionReceipt {
    /// Transaction hash.
    pub transaction_hash: TxHash,
    /// Gateway acknowledgement, or successful execution once mined.
    pub accepted: bool,
    /// Block the transaction was mined in, if known.
    pub block_number: Option<u64>,
}

impl TransactionReceipt {
    /// Receipt for a transaction the gateway acknowledged but that is not mined yet.
    pub fn acknowledged(transaction_hash: TxHash) -> Self {
        Self {
            transaction_hash,
            accepted: true,
            block_number: None,
        }
    }

    /// Whether the receipt proves on-chain inclusion.
    pub fn is_included(&self) -> bool {
        self.block_number.is_some()
    }
}

/// A signed transaction ready for broadcast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTransaction {
    /// EIP-2718 encoded bytes.
    pub raw: Bytes,
    /// Hash of the encoded transaction.
    pub hash: TxHash,
    /// Nonce the transaction was signed with.
    pub nonce: u64,
}
