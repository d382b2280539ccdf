//! Error types for the gate facade.

use creditgate_core::{ChargeReceipt, CoreError, OperationTag};
use creditgate_store::StoreError;
use thiserror::Error;

use crate::router::{ComputeError, InvocationState};

/// Errors from administrative, audit and configuration operations.
///
/// `consume` never returns one of these: every failure inside the gate is
/// folded into a [`Denial`](creditgate_core::Denial).
#[derive(Debug, Error)]
pub enum GateError {
    /// Storage error.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// Malformed identifier, tag or request.
    #[error("invalid input: {0}")]
    Invalid(#[from] CoreError),

    /// Configuration could not be read or is inconsistent.
    #[error("configuration error: {0}")]
    Config(String),

    /// Reading a configuration file failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised by the invocation router.
///
/// Denials are not errors; they come back as a completed [`Invocation`]
/// whose outcome is denied.
///
/// [`Invocation`]: crate::router::Invocation
#[derive(Debug, Error)]
pub enum RouterError {
    /// The operation has no price, so it can never be charged.
    #[error("unknown operation: {0}")]
    UnknownOperation(String),

    /// Inputs were rejected before any charge.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// An internal state transition was attempted out of order.
    #[error("invalid transition from {from:?} to {to:?}")]
    InvalidTransition {
        from: InvocationState,
        to: InvocationState,
    },

    /// The computation failed after the charge committed. The charge stands.
    #[error("computation {operation} failed after charge: {source}")]
    Computation {
        operation: OperationTag,
        receipt: ChargeReceipt,
        #[source]
        source: ComputeError,
    },
}

/// Result type for gate facade operations.
pub type Result<T> = std::result::Result<T, GateError>;
