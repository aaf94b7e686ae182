//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → DepositHandle::stop → engine reaches Stopped → exit
//! ```

pub mod signals;

pub use signals::shutdown_signal;
