use std::sync::Arc;
use tracing::{info, warn};

use taskpay_gateway::{PaymentReference, WebhookEvent, WebhookPayload};
use taskpay_ledger::{LedgerError, LedgerManager, TransactionStatus, TransactionType};

use crate::error::Result;

/// Consumes asynchronous provider events and settles the matching ledger
/// entry exactly once despite at-least-once delivery.
///
/// Idempotence needs no extra bookkeeping: settlement of an
/// already-terminal transaction is a no-op, so replayed webhooks are
/// automatically safe. Signature verification happens before this layer.
pub struct WebhookReconciler {
    ledger: Arc<LedgerManager>,
}

impl WebhookReconciler {
    pub fn new(ledger: Arc<LedgerManager>) -> Self {
        Self { ledger }
    }

    pub async fn process(&self, payload: WebhookPayload) -> Result<()> {
        match payload.decode() {
            WebhookEvent::Charge {
                tx_ref,
                successful,
                provider_ref,
            } => self.reconcile_charge(&tx_ref, successful, provider_ref).await,
            WebhookEvent::Transfer {
                reference,
                successful,
                provider_ref,
            } => {
                self.reconcile_transfer(&reference, successful, provider_ref)
                    .await
            }
            WebhookEvent::Unknown(event) => {
                // Providers add event types over time; not an error.
                info!(event = %event, "ℹ️ Unhandled webhook event ignored");
                Ok(())
            }
        }
    }

    async fn reconcile_charge(
        &self,
        tx_ref: &str,
        successful: bool,
        provider_ref: Option<String>,
    ) -> Result<()> {
        if !successful {
            warn!(tx_ref = %tx_ref, "⚠️ Charge event not successful; hold left PENDING");
            return Ok(());
        }

        let task_id = match PaymentReference::parse(tx_ref) {
            Some(PaymentReference::TaskCharge(task_id)) => task_id,
            _ => {
                warn!(tx_ref = %tx_ref, "Unrecognized charge reference ignored");
                return Ok(());
            }
        };

        let hold = match self
            .ledger
            .find_by_task_and_type(task_id, TransactionType::EscrowHold)
            .await?
        {
            Some(hold) => hold,
            None => {
                warn!(task_id = %task_id, "Charge event for task with no escrow hold ignored");
                return Ok(());
            }
        };

        // Replays hit the terminal guard and return the settled record.
        let settled = self
            .ledger
            .settle(hold.id, TransactionStatus::Completed, provider_ref)
            .await?;
        info!(
            task_id = %task_id,
            hold_tx_id = %settled.id,
            status = %settled.status,
            "✅ Escrow charge reconciled"
        );
        Ok(())
    }

    async fn reconcile_transfer(
        &self,
        reference: &str,
        successful: bool,
        provider_ref: Option<String>,
    ) -> Result<()> {
        let tx_id = match PaymentReference::parse(reference) {
            Some(PaymentReference::WithdrawalPayout(tx_id)) => tx_id,
            _ => {
                warn!(reference = %reference, "Unrecognized transfer reference ignored");
                return Ok(());
            }
        };

        let final_status = if successful {
            TransactionStatus::Completed
        } else {
            TransactionStatus::Failed
        };

        match self.ledger.settle(tx_id, final_status, provider_ref).await {
            Ok(settled) => {
                info!(
                    tx_id = %tx_id,
                    status = %settled.status,
                    "✅ Withdrawal transfer reconciled"
                );
                Ok(())
            }
            // A well-formed reference we never issued a transaction for.
            Err(LedgerError::TransactionNotFound(_)) => {
                warn!(reference = %reference, "Transfer event for unknown withdrawal ignored");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}
