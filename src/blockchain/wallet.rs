//! Signing identity: key loading, address derivation and transaction signing.
//!
//! # Security
//! - Private keys are loaded ONLY from environment variables (via config)
//! - Keys are never logged, serialized or printed by `Debug`

use alloy::eips::eip2718::Encodable2718;
use alloy::network::{EthereumWallet, TransactionBuilder};
use alloy::primitives::Address;
use alloy::signers::local::PrivateKeySigner;

use crate::blockchain::transaction::UnsignedTx;
use crate::blockchain::types::{BlockchainError, BlockchainResult, SignedTransaction};

/// A single signing identity derived from one private key.
#[derive(Clone)]
pub struct SigningIdentity {
    /// Kept for the address; signing goes through `wallet`.
    signer: PrivateKeySigner,
    wallet: EthereumWallet,
}

impl SigningIdentity {
    /// Derive an identity from a hex-encoded private key.
    ///
    /// # Arguments
    /// * `private_key_hex` - Hex string (with or without 0x prefix)
    ///
    /// # Security
    /// The parse error never echoes the input.
    pub fn from_private_key(private_key_hex: &str) -> BlockchainResult<Self> {
        // Strip 0x prefix if present
        let key_hex = private_key_hex.trim();
        let key_hex = key_hex.strip_prefix("0x").unwrap_or(key_hex);

        let signer: PrivateKeySigner = key_hex
            .parse()
            .map_err(|_| BlockchainError::InvalidKeyMaterial("expected 32-byte hex private key".to_string()))?;

        tracing::info!(address = %signer.address(), "Signing identity initialized");

        Ok(Self {
            wallet: EthereumWallet::from(signer.clone()),
            signer,
        })
    }

    /// Get the identity's address.
    pub fn address(&self) -> Address {
        self.signer.address()
    }

    /// Sign a transaction into raw EIP-2718 bytes.
    pub async fn sign(&self, tx: &UnsignedTx) -> BlockchainResult<SignedTransaction> {
        let envelope = tx
            .to_request()
            .build(&self.wallet)
            .await
            .map_err(|e| BlockchainError::Signing(e.to_string()))?;

        let hash = *envelope.tx_hash();
        Ok(SignedTransaction {
            raw: envelope.encoded_2718().into(),
            hash,
            nonce: tx.nonce,
        })
    }
}

impl std::fmt::Debug for SigningIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningIdentity")
            .field("address", &self.address())
            .finish_non_exhaustive()
    }
}
