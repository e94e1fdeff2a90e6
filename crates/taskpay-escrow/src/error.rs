use thiserror::Error;

use taskpay_gateway::GatewayError;
use taskpay_ledger::LedgerError;

/// Escrow error types. Each variant is a distinct, actionable category for
/// callers: insufficient balance, conflict, and provider-down are different
/// decisions, never a generic failure.
#[derive(Error, Debug)]
pub enum EscrowError {
    /// Malformed input, rejected before any ledger mutation
    #[error("Invalid request: {0}")]
    Validation(String),

    /// Missing or invalid caller identity
    #[error("Not authenticated")]
    Auth,

    /// Authenticated but wrong role for this task
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// State already changed under the caller; re-fetch and decide
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Balance too low for the requested operation
    #[error("Insufficient balance: required {required}, available {available}")]
    InsufficientBalance { required: String, available: String },

    /// Payment gateway unreachable or rejected the request
    #[error("Provider error: {0}")]
    Provider(#[from] GatewayError),

    /// Invariant violation. Structurally impossible through these flows;
    /// if it fires it is fatal and loud, never swallowed.
    #[error("Integrity violation: {0}")]
    Integrity(String),
}

impl From<LedgerError> for EscrowError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::WalletNotFound(id) => Self::NotFound(format!("wallet {}", id)),
            LedgerError::TransactionNotFound(id) => Self::NotFound(format!("transaction {}", id)),
            LedgerError::InsufficientBalance {
                required,
                available,
            } => Self::InsufficientBalance {
                required,
                available,
            },
            LedgerError::InvalidId(id) => Self::Validation(format!("invalid id: {}", id)),
            LedgerError::Integrity(msg) => Self::Integrity(msg),
        }
    }
}

/// Result type for escrow operations
pub type Result<T> = std::result::Result<T, EscrowError>;
