//! Error types for the bridge ABI
//!
//! The taxonomy distinguishes user-triggerable conditions (type mismatches,
//! argument errors, construction failures) from bridge-internal bugs
//! (unresolvable callable references), and carries engine exceptions as a
//! single aggregated error value so they never stay pending across the
//! boundary.

use crate::engine::EngineException;

/// Result type for bridge calls
pub type BridgeResult<T> = Result<T, BridgeError>;

/// Host-facing bridge error
#[derive(Debug, Clone, thiserror::Error)]
pub enum BridgeError {
    /// A value's runtime tag does not match what the destination requires
    #[error("type mismatch: expected {expected}, got {got}")]
    TypeMismatch {
        /// Expected type name
        expected: String,
        /// Actual type name
        got: String,
    },

    /// Invalid argument
    #[error("argument error: {0}")]
    Argument(String),

    /// A callable reference did not resolve: stale or cross-instance.
    /// This is a bridge-internal bug, not a user error.
    #[error("callable reference {0} not found")]
    CallableNotFound(u32),

    /// A callable reference resolved, but the stored callable does not
    /// support the requested calling convention.
    #[error("callable reference {0} has the wrong calling convention")]
    WrongConvention(u32),

    /// A reflective constructor failed arity/type checks or returned no
    /// usable value
    #[error("construction failed: {0}")]
    Construction(String),

    /// An exception raised inside the embedded engine, captured at the
    /// call boundary
    #[error("{0}")]
    Exception(EngineException),

    /// Operation on a closed VM instance
    #[error("vm instance is closed")]
    Closed,
}

impl BridgeError {
    /// Type-mismatch constructor
    pub fn mismatch(expected: impl Into<String>, got: impl Into<String>) -> Self {
        BridgeError::TypeMismatch {
            expected: expected.into(),
            got: got.into(),
        }
    }
}

impl From<EngineException> for BridgeError {
    fn from(exc: EngineException) -> Self {
        BridgeError::Exception(exc)
    }
}
