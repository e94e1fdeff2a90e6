use thiserror::Error;

/// Ledger error types
#[derive(Error, Debug, Clone)]
pub enum LedgerError {
    /// Wallet does not exist
    #[error("Wallet not found: {0}")]
    WalletNotFound(String),

    /// Transaction does not exist
    #[error("Transaction not found: {0}")]
    TransactionNotFound(String),

    /// Balance too low for the requested debit
    #[error("Insufficient balance: required {required}, available {available}")]
    InsufficientBalance { required: String, available: String },

    /// Malformed identifier
    #[error("Invalid id: {0}")]
    InvalidId(String),

    /// Invariant violation. Structurally unreachable through the public
    /// flows; if it fires, something is wrong with the ledger itself.
    #[error("Ledger integrity violation: {0}")]
    Integrity(String),
}

/// Result type for ledger operations
pub type Result<T> = std::result::Result<T, LedgerError>;
