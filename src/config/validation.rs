//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check addresses, endpoints and decimal quantities parse
//! - Validate value ranges (timeouts > 0, gas limit > 0)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: DepositConfig → Result<(), Vec<ValidationError>>
//! - Runs before any network activity

use alloy::primitives::utils::parse_units;
use alloy::primitives::Address;
use std::fmt;

use crate::config::schema::{BroadcastStrategy, DecimalValue, DepositConfig};

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: String,
    /// Human-readable reason.
    pub message: String,
}

impl ValidationError {
    fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate a parsed configuration.
pub fn validate_config(config: &DepositConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    check_endpoint(
        "node.rpc_endpoint",
        &config.node.rpc_endpoint,
        &["ws", "wss", "http", "https"],
        &mut errors,
    );
    if config.node.rpc_timeout_secs == 0 {
        errors.push(ValidationError::new("node.rpc_timeout_secs", "must be greater than 0"));
    }
    if config.node.block_poll_interval_ms == 0 {
        errors.push(ValidationError::new("node.block_poll_interval_ms", "must be greater than 0"));
    }
    if config.node.receipt_poll_interval_ms == 0 {
        errors.push(ValidationError::new("node.receipt_poll_interval_ms", "must be greater than 0"));
    }

    let deposit = &config.deposit;
    check_address("deposit.token_contract", &deposit.token_contract, &mut errors);
    check_address("deposit.target_contract", &deposit.target_contract, &mut errors);

    match parse_units(&deposit.amount.as_decimal_string(), deposit.token_decimals) {
        Ok(units) if units.get_absolute().is_zero() => {
            errors.push(ValidationError::new("deposit.amount", "must be greater than 0"));
        }
        Ok(units) if units.is_negative() => {
            errors.push(ValidationError::new("deposit.amount", "must not be negative"));
        }
        Ok(_) => {}
        Err(e) => errors.push(ValidationError::new("deposit.amount", e.to_string())),
    }

    if deposit.gas_limit == 0 {
        errors.push(ValidationError::new("deposit.gas_limit", "must be greater than 0"));
    }
    check_gwei("deposit.gas_price_gwei", &deposit.gas_price_gwei, &mut errors);
    if let Some(fast) = &deposit.fast_gas_price_gwei {
        check_gwei("deposit.fast_gas_price_gwei", fast, &mut errors);
    }

    if config.signer.private_key_env.trim().is_empty() {
        errors.push(ValidationError::new("signer.private_key_env", "must name an environment variable"));
    }

    match config.broadcast.strategy {
        BroadcastStrategy::Direct => {
            if let Some(endpoint) = &config.broadcast.direct.endpoint {
                check_endpoint("broadcast.direct.endpoint", endpoint, &["http", "https", "ws", "wss"], &mut errors);
            }
            if config.broadcast.direct.timeout_secs == 0 {
                errors.push(ValidationError::new("broadcast.direct.timeout_secs", "must be greater than 0"));
            }
        }
        BroadcastStrategy::RelayBundle => {
            let relay = &config.broadcast.relay;
            check_endpoint("broadcast.relay.endpoint", &relay.endpoint, &["http", "https"], &mut errors);
            if relay.auth_env.trim().is_empty() {
                errors.push(ValidationError::new("broadcast.relay.auth_env", "must name an environment variable"));
            }
            if relay.blocks_count == 0 {
                errors.push(ValidationError::new("broadcast.relay.blocks_count", "must be greater than 0"));
            }
            if relay.builders.trim().is_empty() {
                errors.push(ValidationError::new("broadcast.relay.builders", "must not be empty"));
            }
            if relay.timeout_secs == 0 {
                errors.push(ValidationError::new("broadcast.relay.timeout_secs", "must be greater than 0"));
            }
        }
    }

    if config.retry.delay_ms == 0 {
        errors.push(ValidationError::new("retry.delay_ms", "must be greater than 0"));
    }
    if config.retry.deadline_secs == Some(0) {
        errors.push(ValidationError::new("retry.deadline_secs", "must be greater than 0 when set"));
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<std::net::SocketAddr>().is_err()
    {
        errors.push(ValidationError::new("observability.metrics_address", "not a socket address"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_address(field: &str, value: &str, errors: &mut Vec<ValidationError>) {
    if let Err(e) = value.parse::<Address>() {
        errors.push(ValidationError::new(field, format!("invalid address: {}", e)));
    }
}

fn check_endpoint(field: &str, value: &str, schemes: &[&str], errors: &mut Vec<ValidationError>) {
    match url::Url::parse(value) {
        Ok(url) if schemes.contains(&url.scheme()) => {}
        Ok(url) => errors.push(ValidationError::new(
            field,
            format!("unsupported scheme '{}', expected one of {:?}", url.scheme(), schemes),
        )),
        Err(e) => errors.push(ValidationError::new(field, format!("invalid URL: {}", e))),
    }
}

fn check_gwei(field: &str, value: &DecimalValue, errors: &mut Vec<ValidationError>) {
    match parse_units(&value.as_decimal_string(), "gwei") {
        Ok(units) if units.is_negative() => {
            errors.push(ValidationError::new(field, "must not be negative"));
        }
        Ok(_) => {}
        Err(e) => errors.push(ValidationError::new(field, e.to_string())),
    }
}
