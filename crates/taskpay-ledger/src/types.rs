use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::error::{LedgerError, Result};

pub const DEFAULT_CURRENCY: &str = "NGN";

/// Minor units per major currency unit (kobo per naira).
pub const MINOR_PER_MAJOR: i64 = 100;

/// Fixed-point currency amount in signed minor units.
///
/// Ledger entries carry signed amounts (credits positive, debits negative);
/// wallet balances are maintained as non-negative sums of settled entries.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub struct Amount(i64);

impl Amount {
    pub const ZERO: Self = Self(0);

    pub fn from_minor(minor: i64) -> Self {
        Self(minor)
    }

    pub fn from_major(major: i64) -> Self {
        Self(major * MINOR_PER_MAJOR)
    }

    pub fn to_minor(&self) -> i64 {
        self.0
    }

    pub fn checked_add(&self, other: Self) -> Option<Self> {
        self.0.checked_add(other.0).map(Self)
    }

    pub fn checked_sub(&self, other: Self) -> Option<Self> {
        self.0.checked_sub(other.0).map(Self)
    }

    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }

    pub fn is_negative(&self) -> bool {
        self.0 < 0
    }

    pub fn abs(&self) -> Self {
        Self(self.0.abs())
    }

    pub fn negated(&self) -> Self {
        Self(-self.0)
    }

    /// Split this amount into (platform fee, remainder).
    ///
    /// The single rounding rule for the whole system: the fee rounds DOWN in
    /// minor units and the remainder is exact, so fee + remainder always
    /// reconstructs the original amount.
    pub fn split_fee(&self, percent: u8) -> Result<(Self, Self)> {
        if percent > 100 {
            return Err(LedgerError::Integrity(format!(
                "fee percent out of range: {}",
                percent
            )));
        }
        if self.0 < 0 {
            return Err(LedgerError::Integrity(format!(
                "cannot split fee of negative amount {}",
                self
            )));
        }
        let fee = Self(self.0 * percent as i64 / 100);
        let remainder = Self(self.0 - fee.0);
        Ok((fee, remainder))
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.abs();
        write!(
            f,
            "{}{}.{:02} {}",
            sign,
            abs / MINOR_PER_MAJOR,
            abs % MINOR_PER_MAJOR,
            DEFAULT_CURRENCY
        )
    }
}

macro_rules! uuid_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        pub struct $name(Uuid);

        impl $name {
            #[allow(clippy::new_without_default)]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            pub fn from_uuid(id: Uuid) -> Self {
                Self(id)
            }

            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }

            pub fn parse(s: &str) -> Result<Self> {
                Uuid::parse_str(s)
                    .map(Self)
                    .map_err(|_| LedgerError::InvalidId(s.to_string()))
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

uuid_id!(
    /// A platform user account.
    UserId
);
uuid_id!(WalletId);
uuid_id!(TaskId);
uuid_id!(TransactionId);

impl UserId {
    /// Reserved system account holding funds escrowed against open tasks.
    pub fn escrow_account() -> Self {
        Self(Uuid::from_u128(0xEE00_0000_0000_0000_0000_0000_0000_0001))
    }

    /// Reserved system account accumulating collected platform fees.
    pub fn revenue_account() -> Self {
        Self(Uuid::from_u128(0xEE00_0000_0000_0000_0000_0000_0000_0002))
    }

    pub fn is_system(&self) -> bool {
        *self == Self::escrow_account() || *self == Self::revenue_account()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionType {
    EscrowHold,
    EscrowRelease,
    PlatformFee,
    Withdrawal,
    Refund,
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::EscrowHold => "ESCROW_HOLD",
            Self::EscrowRelease => "ESCROW_RELEASE",
            Self::PlatformFee => "PLATFORM_FEE",
            Self::Withdrawal => "WITHDRAWAL",
            Self::Refund => "REFUND",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    Pending,
    Completed,
    Failed,
}

impl TransactionStatus {
    /// COMPLETED and FAILED are terminal: a settled entry never changes again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "PENDING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Wallet {
    pub id: WalletId,
    pub user_id: UserId,
    pub balance: Amount,
    pub currency: String,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

/// An escrow ledger entry. Immutable once settled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub wallet_id: WalletId,
    pub task_id: Option<TaskId>,
    pub tx_type: TransactionType,
    pub amount: Amount,
    pub status: TransactionStatus,
    pub provider_ref: Option<String>,
    pub metadata: serde_json::Value,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// Parameters for inserting a new ledger entry.
#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub wallet_id: WalletId,
    pub task_id: Option<TaskId>,
    pub tx_type: TransactionType,
    pub amount: Amount,
    pub metadata: serde_json::Value,
}

impl NewTransaction {
    pub fn new(
        wallet_id: WalletId,
        task_id: Option<TaskId>,
        tx_type: TransactionType,
        amount: Amount,
    ) -> Self {
        Self {
            wallet_id,
            task_id,
            tx_type,
            amount,
            metadata: serde_json::Value::Null,
        }
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}
