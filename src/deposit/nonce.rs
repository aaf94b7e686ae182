//! Local nonce management.
//!
//! # Responsibilities
//! - Read the on-chain transaction count once per task
//! - Hand out strictly increasing nonces without gaps
//! - Move forward when the node reports the cursor is stale
//!
//! # Design Decisions
//! - Not internally locked: the engine owns the sequencer and serializes access
//! - A nonce is consumed only after the gateway accepted the transaction,
//!   so retries of one logical deposit reuse the peeked value

use alloy::primitives::Address;

use crate::blockchain::client::NodeClient;
use crate::deposit::{DepositError, DepositResult};

/// In-memory nonce cursor for one signing address.
#[derive(Debug, Default)]
pub struct NonceSequencer {
    cursor: Option<u64>,
}

impl NonceSequencer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Prime the cursor from the node's transaction count for `address`.
    pub async fn initialize(&mut self, node: &dyn NodeClient, address: Address) -> DepositResult<u64> {
        let count = node.transaction_count(address).await?;
        self.cursor = Some(count);

        tracing::debug!(address = %address, nonce = count, "Nonce sequencer initialized");
        Ok(count)
    }

    /// Whether `initialize` has completed.
    pub fn is_initialized(&self) -> bool {
        self.cursor.is_some()
    }

    /// Return the current nonce and advance the cursor.
    pub fn next(&mut self) -> DepositResult<u64> {
        let cursor = self.cursor.as_mut().ok_or(DepositError::NotInitialized)?;
        let nonce = *cursor;
        *cursor += 1;
        Ok(nonce)
    }

    /// Return the current nonce without consuming it.
    pub fn peek(&self) -> DepositResult<u64> {
        self.cursor.ok_or(DepositError::NotInitialized)
    }

    /// Move the cursor up to `count` (the node's transaction count).
    ///
    /// Never moves backwards. Returns the resulting cursor.
    pub fn resync(&mut self, count: u64) -> DepositResult<u64> {
        let cursor = self.cursor.as_mut().ok_or(DepositError::NotInitialized)?;
        if count > *cursor {
            tracing::info!(from = *cursor, to = count, "Nonce cursor resynchronized");
            *cursor = count;
        }
        Ok(*cursor)
    }
}
