//! Blockchain integration subsystem.
//!
//! # Data Flow
//! ```text
//! Environment Variables (private key) + config (RPC endpoint)
//!     → wallet.rs (key loading, signing)
//!     → client.rs (RPC connection with timeouts, block stream)
//!     → contracts.rs (token / vault calldata)
//!     → transaction.rs (build, wait for inclusion)
//! ```
//!
//! # Security Constraints
//! - Private keys ONLY from environment variables
//! - Never log private keys or endpoint credentials
//! - All RPC calls have configurable timeouts

pub mod client;
pub mod contracts;
pub mod transaction;
pub mod types;
pub mod wallet;

pub use client::{AlloyNode, NodeClient};
pub use transaction::UnsignedTx;
pub use types::{
    BlockStream, BlockchainError, BlockchainResult, SignedTransaction, TransactionReceipt,
};
pub use wallet::SigningIdentity;
