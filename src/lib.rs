//! Block-triggered deposit engine.
//!
//! Ensures a token allowance exists, then submits a vault deposit at the
//! earliest opportunity after each new block, retrying transient failures
//! while keeping the nonce sequence gap-free.
//!
//! # Architecture Overview
//!
//! ```text
//!   config ──▶ DepositTask ──▶ DepositEngine::start ──▶ DepositHandle (stop / join)
//!                                   │
//!                                   ▼
//!              ┌─────────────── SubmissionLoop ───────────────┐
//!              │  AllowanceGuard   NonceSequencer   RetryPolicy│
//!              └──────┬───────────────────┬───────────────────┘
//!                     ▼                   ▼
//!              NodeClient (alloy)   BroadcastGateway
//!              blocks, simulation    Direct | RelayBundle
//! ```

// Core subsystems
pub mod blockchain;
pub mod broadcast;
pub mod config;
pub mod deposit;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;
pub mod resilience;

pub use blockchain::{AlloyNode, NodeClient, SigningIdentity};
pub use broadcast::BroadcastGateway;
pub use config::schema::DepositConfig;
pub use deposit::{DepositEngine, DepositError, DepositHandle, DepositOutcome, DepositTask, Phase, StopReason};
