//! Block-triggered deposit subsystem.
//!
//! # Data Flow
//! ```text
//! DepositConfig
//!     → task.rs (parse key, addresses, amounts; no network)
//!     → engine.rs (state machine, one tokio task)
//!         → allowance.rs (check / approve before the first attempt)
//!         → nonce.rs (in-memory cursor primed from the node)
//!         → broadcast::BroadcastGateway (direct or relay bundle)
//!     → sink.rs (progress lines and the single fatal error report)
//! ```
//!
//! # Design Decisions
//! - One owner for all mutable task state; no locks
//! - Cancellation is a flag checked at every resume point, never an abort

pub mod allowance;
pub mod engine;
pub mod nonce;
pub mod sink;
pub mod task;

pub use allowance::{AllowanceGuard, AuthorizationOutcome};
pub use engine::{DepositEngine, DepositHandle, DepositOutcome, Phase, StopReason};
pub use nonce::NonceSequencer;
pub use sink::{CallbackSink, ProgressSink, TracingSink};
pub use task::DepositTask;

use thiserror::Error;

use crate::blockchain::types::BlockchainError;
use crate::config::ConfigError;

/// Errors that end a deposit task.
#[derive(Debug, Clone, Error)]
pub enum DepositError {
    /// Task configuration is unusable. Raised before any network activity.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The spending authorization could not be established.
    #[error("Authorization failed: {0}")]
    AuthorizationFailed(String),

    /// Nonce cursor used before it was primed from the node.
    #[error("Nonce sequencer used before initialization")]
    NotInitialized,

    /// Node or signing failure outside the submission path.
    #[error(transparent)]
    Chain(#[from] BlockchainError),

    /// Submission rejected for a reason retrying cannot fix.
    #[error("Broadcast failed: {0}")]
    Broadcast(BlockchainError),

    /// `max_retries` consecutive attempts failed.
    #[error("Gave up after {attempts} attempts, last error: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },

    /// Retries kept failing past the retry deadline.
    #[error("Retry deadline of {secs} seconds exceeded")]
    DeadlineExceeded { secs: u64 },

    /// The block notification stream ended.
    #[error("Block subscription closed")]
    SubscriptionClosed,

    /// The engine task ended without reporting an outcome.
    #[error("Deposit task aborted: {0}")]
    TaskAborted(String),
}

impl From<ConfigError> for DepositError {
    fn from(error: ConfigError) -> Self {
        DepositError::Config(error.to_string())
    }
}

/// Result type for deposit operations.
pub type DepositResult<T> = Result<T, DepositError>;
