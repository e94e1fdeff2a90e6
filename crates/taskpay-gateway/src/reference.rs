use std::fmt;

use taskpay_ledger::{TaskId, TransactionId};

/// Caller-chosen correlation key embedded in the reference string sent to
/// the provider at initiation time. The provider echoes it back in webhook
/// events, which is the only join key available before the provider's own
/// id is known.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentReference {
    /// Escrow charge for a task: `task_<uuid>`
    TaskCharge(TaskId),
    /// Withdrawal payout keyed by its ledger transaction: `wd_<uuid>`
    WithdrawalPayout(TransactionId),
}

impl PaymentReference {
    /// Parse a provider-echoed reference. Foreign references (references
    /// this system never issued) return None and are ignored upstream.
    pub fn parse(reference: &str) -> Option<Self> {
        if let Some(rest) = reference.strip_prefix("task_") {
            return TaskId::parse(rest).ok().map(Self::TaskCharge);
        }
        if let Some(rest) = reference.strip_prefix("wd_") {
            return TransactionId::parse(rest).ok().map(Self::WithdrawalPayout);
        }
        None
    }
}

impl fmt::Display for PaymentReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TaskCharge(task_id) => write!(f, "task_{}", task_id),
            Self::WithdrawalPayout(tx_id) => write!(f, "wd_{}", tx_id),
        }
    }
}
