//! Spending authorization guard.
//!
//! # Responsibilities
//! - Check the token allowance granted to the vault
//! - Send an approval when it falls short, and wait until it is mined
//!
//! # Design Decisions
//! - A sufficient allowance short-circuits: no transaction is built
//! - Every failure is fatal for the task; the approval is never retried
//! - The approval goes through the task's gateway so both transactions
//!   share one delivery path

use alloy::primitives::{Address, TxHash, U256};
use std::sync::Arc;
use std::time::Duration;

use crate::blockchain::client::NodeClient;
use crate::blockchain::contracts::approve_calldata;
use crate::blockchain::transaction::{wait_for_inclusion, UnsignedTx};
use crate::blockchain::wallet::SigningIdentity;
use crate::broadcast::{classify, BroadcastGateway, Disposition};
use crate::config::schema::ApprovalPolicy;
use crate::deposit::sink::ProgressSink;
use crate::deposit::{DepositError, DepositResult};
use crate::observability::metrics;

/// Result of a successful authorization check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthorizationOutcome {
    /// The existing allowance already covers the deposit.
    AlreadyAuthorized { allowance: U256 },
    /// An approval was sent and mined.
    Approved { tx_hash: TxHash, block_number: u64 },
}

/// Checks and raises the token allowance for one owner.
pub struct AllowanceGuard {
    node: Arc<dyn NodeClient>,
    token: Address,
    policy: ApprovalPolicy,
    gas_limit: u64,
    gas_price: u128,
    chain_id: u64,
    poll_interval: Duration,
    inclusion_timeout: Duration,
}

impl AllowanceGuard {
    /// Create a guard for `token` on chain `chain_id`.
    ///
    /// Approvals are priced at `gas_price` with `gas_limit`.
    pub fn new(node: Arc<dyn NodeClient>, token: Address, chain_id: u64, gas_limit: u64, gas_price: u128) -> Self {
        Self {
            node,
            token,
            policy: ApprovalPolicy::Max,
            gas_limit,
            gas_price,
            chain_id,
            poll_interval: Duration::from_secs(2),
            inclusion_timeout: Duration::from_secs(300),
        }
    }

    /// Approval amount policy (default: `U256::MAX`).
    pub fn with_policy(mut self, policy: ApprovalPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Receipt polling cadence and the inclusion ceiling.
    pub fn with_inclusion_wait(mut self, poll_interval: Duration, inclusion_timeout: Duration) -> Self {
        self.poll_interval = poll_interval;
        self.inclusion_timeout = inclusion_timeout;
        self
    }

    /// Make sure `spender` may transfer at least `required` of the owner's tokens.
    ///
    /// # Arguments
    /// * `identity` - Token owner; signs the approval if one is needed
    /// * `spender` - Contract that pulls the tokens (the vault)
    /// * `required` - Deposit amount in base units
    /// * `gateway` - Delivery path for the approval
    /// * `sink` - Progress narrative
    pub async fn ensure_authorized(
        &self,
        identity: &SigningIdentity,
        spender: Address,
        required: U256,
        gateway: &BroadcastGateway,
        sink: &dyn ProgressSink,
    ) -> DepositResult<AuthorizationOutcome> {
        let owner = identity.address();

        // 1. Current allowance
        let allowance = self
            .node
            .allowance(self.token, owner, spender)
            .await
            .map_err(|e| DepositError::AuthorizationFailed(format!("allowance query failed: {}", e)))?;

        sink.progress(&format!("current allowance: {}", allowance));

        if allowance >= required {
            tracing::debug!(owner = %owner, spender = %spender, %allowance, %required, "Allowance sufficient");
            return Ok(AuthorizationOutcome::AlreadyAuthorized { allowance });
        }

        // 2. Build and sign the approval
        let amount = match self.policy {
            ApprovalPolicy::Max => U256::MAX,
            ApprovalPolicy::Exact => required,
        };

        let nonce = self
            .node
            .transaction_count(owner)
            .await
            .map_err(|e| DepositError::AuthorizationFailed(format!("nonce query failed: {}", e)))?;
        let current_block = self
            .node
            .block_number()
            .await
            .map_err(|e| DepositError::AuthorizationFailed(format!("block query failed: {}", e)))?;

        let approval = UnsignedTx {
            from: owner,
            to: self.token,
            nonce,
            gas_limit: self.gas_limit,
            gas_price: self.gas_price,
            value: U256::ZERO,
            data: approve_calldata(spender, amount),
            chain_id: self.chain_id,
        };

        let signed = identity
            .sign(&approval)
            .await
            .map_err(|e| DepositError::AuthorizationFailed(e.to_string()))?;

        sink.progress("allowance too low, sending approval");

        // 3. Submit
        match gateway.submit(&signed, current_block).await {
            Ok(_) => {}
            Err(e) if classify(&e).disposition() == Disposition::TreatAsAccepted => {
                tracing::debug!(tx_hash = %signed.hash, "Approval already known to the node");
            }
            Err(e) => {
                return Err(DepositError::AuthorizationFailed(format!("approval rejected: {}", e)));
            }
        }

        metrics::record_approval();
        sink.progress(&format!("approval sent, tx hash {}", signed.hash));

        // 4. Wait for inclusion
        let receipt = wait_for_inclusion(self.node.as_ref(), signed.hash, self.poll_interval, self.inclusion_timeout)
            .await
            .map_err(|e| DepositError::AuthorizationFailed(format!("approval not mined: {}", e)))?;

        let block_number = receipt.block_number.unwrap_or_default();
        if !receipt.accepted {
            return Err(DepositError::AuthorizationFailed(format!(
                "approval {} reverted in block {}",
                signed.hash, block_number
            )));
        }

        sink.progress(&format!("approval confirmed in block {}", block_number));
        tracing::info!(tx_hash = %signed.hash, block = block_number, "Approval mined");

        Ok(AuthorizationOutcome::Approved {
            tx_hash: signed.hash,
            block_number,
        })
    }
}
