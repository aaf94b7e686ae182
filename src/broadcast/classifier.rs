//! Submission error classification.
//!
//! Nodes and relays word the same condition differently, so the classifier
//! matches on lower-cased message patterns first and falls back to JSON-RPC
//! codes. The resulting [`Disposition`] is the only thing the submission
//! loop branches on.

use crate::blockchain::types::BlockchainError;

/// Classified rejection reasons.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectionKind {
    /// Nonce already used on chain.
    NonceTooLow,
    /// Gas price below the node's or builder's floor.
    Underpriced,
    /// Balance cannot cover gas * price + value.
    InsufficientFunds,
    /// Configured gas limit is below intrinsic gas.
    IntrinsicGasTooLow,
    /// Transaction is already in the pool.
    AlreadyKnown,
    /// Payload or parameters the node refuses to parse.
    Malformed,
    /// Token allowance no longer covers the transfer.
    AllowanceExceeded,
    /// Relay could not reach a block builder.
    BuilderUnavailable,
    /// Connection failure or timeout.
    Network,
    /// Anything else.
    Unknown,
}

/// What the submission loop should do about a failed submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// The transaction is already known; count it as submitted.
    TreatAsAccepted,
    /// Retry the same attempt after the retry delay.
    Retry,
    /// Re-read the nonce from the node, then retry.
    ResyncNonceAndRetry,
    /// Stop the task.
    Fatal,
}

impl RejectionKind {
    /// Map the rejection onto a loop action.
    pub fn disposition(self) -> Disposition {
        match self {
            RejectionKind::AlreadyKnown => Disposition::TreatAsAccepted,
            RejectionKind::NonceTooLow => Disposition::ResyncNonceAndRetry,
            RejectionKind::Underpriced
            | RejectionKind::BuilderUnavailable
            | RejectionKind::Network
            | RejectionKind::Unknown => Disposition::Retry,
            RejectionKind::InsufficientFunds
            | RejectionKind::IntrinsicGasTooLow
            | RejectionKind::Malformed
            | RejectionKind::AllowanceExceeded => Disposition::Fatal,
        }
    }

    /// Short label for logs and metrics.
    pub fn as_str(self) -> &'static str {
        match self {
            RejectionKind::NonceTooLow => "nonce_too_low",
            RejectionKind::Underpriced => "underpriced",
            RejectionKind::InsufficientFunds => "insufficient_funds",
            RejectionKind::IntrinsicGasTooLow => "intrinsic_gas_too_low",
            RejectionKind::AlreadyKnown => "already_known",
            RejectionKind::Malformed => "malformed",
            RejectionKind::AllowanceExceeded => "allowance_exceeded",
            RejectionKind::BuilderUnavailable => "builder_unavailable",
            RejectionKind::Network => "network",
            RejectionKind::Unknown => "unknown",
        }
    }
}

/// Classify a submission error.
pub fn classify(error: &BlockchainError) -> RejectionKind {
    match error {
        BlockchainError::Network(_)
        | BlockchainError::Timeout(_)
        | BlockchainError::InclusionTimeout(_) => RejectionKind::Network,
        BlockchainError::RpcRejected { code, message }
        | BlockchainError::RelayRejected { code, message } => classify_message(*code, message),
        BlockchainError::InvalidKeyMaterial(_)
        | BlockchainError::Signing(_)
        | BlockchainError::Decode(_)
        | BlockchainError::ChainMismatch { .. } => RejectionKind::Malformed,
    }
}

fn classify_message(code: i64, message: &str) -> RejectionKind {
    let msg = message.to_lowercase();

    if msg.contains("already known")
        || msg.contains("already imported")
        || msg.contains("known transaction")
        || msg.contains("transaction already exists")
    {
        return RejectionKind::AlreadyKnown;
    }

    if msg.contains("nonce too low") || msg.contains("nonce is too low") {
        return RejectionKind::NonceTooLow;
    }

    if msg.contains("insufficient funds")
        || msg.contains("insufficient balance")
        || msg.contains("exceeds balance")
    {
        return RejectionKind::InsufficientFunds;
    }

    if msg.contains("exceeds allowance") || msg.contains("insufficient allowance") {
        return RejectionKind::AllowanceExceeded;
    }

    if msg.contains("intrinsic gas too low") || msg.contains("gas limit too low") {
        return RejectionKind::IntrinsicGasTooLow;
    }

    if msg.contains("underpriced")
        || msg.contains("gas price too low")
        || msg.contains("max fee per gas less than block base fee")
    {
        return RejectionKind::Underpriced;
    }

    if msg.contains("builder") && (msg.contains("unavailable") || msg.contains("not available")) {
        return RejectionKind::BuilderUnavailable;
    }

    if msg.contains("rlp")
        || msg.contains("invalid sender")
        || msg.contains("invalid signature")
        || msg.contains("invalid transaction")
        || msg.contains("malformed")
    {
        return RejectionKind::Malformed;
    }

    match code {
        // JSON-RPC parse error / invalid params
        -32700 | -32602 => RejectionKind::Malformed,
        _ => RejectionKind::Unknown,
    }
}
