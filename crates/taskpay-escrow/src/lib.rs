//! Escrow state machine: the task lifecycle and its coupling to money
//! movement.
//!
//! A task moves POSTED → ACCEPTED → COMPLETED → PAID (or POSTED →
//! CANCELLED), and every transition that moves money writes to the ledger
//! in one atomic unit. Provider confirmations arrive out of band through
//! the webhook reconciler; withdrawals are reserved locally and settled by
//! the same reconciler.

pub mod audit;
pub mod engine;
pub mod error;
pub mod reconcile;
pub mod task;
pub mod withdrawal;

pub use audit::{AdminAction, AuditOutcome, AuditSink, MemoryAuditLog};
pub use engine::{EscrowConfig, EscrowEngine, PaymentIntent, Resolution, ResolvedTask};
pub use error::{EscrowError, Result};
pub use reconcile::WebhookReconciler;
pub use task::{CasOutcome, MemoryTaskStore, NewTask, Task, TaskStatus, TaskStore};
pub use withdrawal::WithdrawalProcessor;
