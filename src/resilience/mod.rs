//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Failed attempt (simulation revert, transport error, retryable rejection):
//!     → retries.rs (cap / deadline check, delay for the next attempt)
//!     → backoff.rs (fixed delay + jitter)
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every node call has a deadline (see `blockchain::client`)
//! - Retries never consume a nonce

pub mod backoff;
pub mod retries;

pub use retries::{RetryPolicy, RetryRefusal, RetryTracker};
