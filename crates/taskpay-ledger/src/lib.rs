//! Escrow ledger: wallets, transactions, and atomic settlement.
//!
//! The ledger is the source of truth for balances. Its core correctness
//! property: a wallet's balance always equals the sum of amounts of that
//! wallet's COMPLETED transactions. PENDING and FAILED entries never affect
//! balance, and a settled entry never changes again.

pub mod error;
pub mod ledger;
pub mod storage;
pub mod types;

pub use error::{LedgerError, Result};
pub use ledger::LedgerManager;
pub use storage::{LedgerStorage, MemoryLedgerStorage};
pub use types::{
    Amount, NewTransaction, TaskId, Transaction, TransactionId, TransactionStatus,
    TransactionType, UserId, Wallet, WalletId, DEFAULT_CURRENCY,
};
