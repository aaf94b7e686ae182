//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → DepositConfig (validated, immutable)
//!     → DepositTask::from_config (secrets read from env)
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; a task never re-reads it
//! - All fields have defaults to allow minimal configs
//! - Secrets are referenced by environment variable name only

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, load_config_str, read_secret, ConfigError};
pub use schema::{
    ApprovalPolicy, BroadcastConfig, BroadcastStrategy, DecimalValue, DepositConfig,
    DepositSettings, NodeConfig, ObservabilityConfig, RetryConfig, SubmissionMode,
};
pub use validation::{validate_config, ValidationError};
