use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

use taskpay_gateway::{PaymentGateway, PaymentReference, PayoutDestination};
use taskpay_ledger::{Amount, LedgerManager, Transaction, TransactionStatus, UserId};

use crate::error::{EscrowError, Result};

/// Converts an internal wallet balance into an external bank payout.
///
/// The intent is reserved (PENDING, negative amount) before the gateway
/// call; balance only moves when the reconciler settles the transfer. The
/// processor itself never marks a withdrawal COMPLETED.
pub struct WithdrawalProcessor {
    ledger: Arc<LedgerManager>,
    gateway: Arc<dyn PaymentGateway>,
}

impl WithdrawalProcessor {
    pub fn new(ledger: Arc<LedgerManager>, gateway: Arc<dyn PaymentGateway>) -> Self {
        Self { ledger, gateway }
    }

    pub async fn request_withdrawal(
        &self,
        user: UserId,
        amount: Amount,
        destination: PayoutDestination,
    ) -> Result<Transaction> {
        if !amount.is_positive() {
            return Err(EscrowError::Validation(
                "withdrawal amount must be greater than zero".into(),
            ));
        }
        if destination.account_number.trim().is_empty() || destination.bank_code.trim().is_empty()
        {
            return Err(EscrowError::Validation(
                "payout destination is incomplete".into(),
            ));
        }

        // Available-balance check and PENDING insert are one atomic unit in
        // the store; an overdraw rejection creates no transaction at all.
        let tx = self
            .ledger
            .reserve_withdrawal(
                user,
                amount,
                json!({
                    "account_number": destination.account_number,
                    "bank_code": destination.bank_code,
                    "account_name": destination.account_name,
                }),
            )
            .await?;

        let reference = PaymentReference::WithdrawalPayout(tx.id);
        match self
            .gateway
            .initiate_payout(&reference, amount, &destination)
            .await
        {
            Ok(transfer_id) => {
                let tx = self.ledger.attach_provider_ref(tx.id, &transfer_id).await?;
                info!(
                    tx_id = %tx.id,
                    user = %user,
                    amount = %amount,
                    transfer_id = %transfer_id,
                    "💸 Withdrawal pending provider confirmation"
                );
                Ok(tx)
            }
            Err(e) => {
                // Adapter failure: settle FAILED immediately and surface the
                // error. Balance never moved.
                warn!(
                    tx_id = %tx.id,
                    user = %user,
                    error = %e,
                    "❌ Payout initiation failed; withdrawal settled FAILED"
                );
                self.ledger
                    .settle(tx.id, TransactionStatus::Failed, None)
                    .await?;
                Err(e.into())
            }
        }
    }
}
