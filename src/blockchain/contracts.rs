//! Contract ABIs and calldata helpers for the token and the deposit vault.

use alloy::primitives::utils::parse_units;
use alloy::primitives::{Address, Bytes, U256};
use alloy::sol;
use alloy::sol_types::SolCall;

use crate::blockchain::types::{BlockchainError, BlockchainResult};

sol! {
    /// Subset of ERC-20 used for the spending authorization.
    interface IERC20 {
        function approve(address spender, uint256 amount) external returns (bool);
        function allowance(address owner, address spender) external view returns (uint256);
    }

    /// Vault accepting token deposits.
    interface IDepositVault {
        function deposit(uint256 assets_) external payable;
    }
}

/// Encode `approve(spender, amount)`.
pub fn approve_calldata(spender: Address, amount: U256) -> Bytes {
    IERC20::approveCall { spender, amount }.abi_encode().into()
}

/// Encode `allowance(owner, spender)`.
pub fn allowance_calldata(owner: Address, spender: Address) -> Bytes {
    IERC20::allowanceCall { owner, spender }.abi_encode().into()
}

/// Encode `deposit(assets_)`.
pub fn deposit_calldata(assets: U256) -> Bytes {
    IDepositVault::depositCall { assets_: assets }.abi_encode().into()
}

/// Decode a single ABI `uint256` return word.
pub fn decode_uint256(output: &[u8]) -> BlockchainResult<U256> {
    if output.len() < 32 {
        return Err(BlockchainError::Decode(format!(
            "expected 32-byte uint256, got {} bytes",
            output.len()
        )));
    }
    Ok(U256::from_be_slice(&output[..32]))
}

/// Scale a decimal token amount into base units.
pub fn parse_token_amount(amount: &str, decimals: u8) -> BlockchainResult<U256> {
    let units = parse_units(amount, decimals)
        .map_err(|e| BlockchainError::Decode(format!("invalid amount '{}': {}", amount, e)))?;
    if units.is_negative() {
        return Err(BlockchainError::Decode(format!("negative amount '{}'", amount)));
    }
    Ok(units.get_absolute())
}

/// Convert a decimal gwei price into wei per gas.
pub fn parse_gwei(price: &str) -> BlockchainResult<u128> {
    let units = parse_units(price, "gwei")
        .map_err(|e| BlockchainError::Decode(format!("invalid gas price '{}': {}", price, e)))?;
    if units.is_negative() {
        return Err(BlockchainError::Decode(format!("negative gas price '{}'", price)));
    }
    u128::try_from(units.get_absolute())
        .map_err(|_| BlockchainError::Decode(format!("gas price '{}' overflows u128", price)))
}
