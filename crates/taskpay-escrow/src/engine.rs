use serde_json::json;
use std::sync::Arc;
use tracing::{error, info, warn};

use taskpay_gateway::{ChargeCustomer, PaymentGateway, PaymentReference};
use taskpay_ledger::{
    LedgerManager, NewTransaction, TaskId, TransactionId, TransactionStatus, TransactionType,
    UserId,
};

use crate::audit::{AdminAction, AuditOutcome, AuditSink};
use crate::error::{EscrowError, Result};
use crate::task::{CasOutcome, NewTask, Task, TaskStatus, TaskStore};

#[derive(Debug, Clone)]
pub struct EscrowConfig {
    /// Marketplace cut of each task fee, in whole percent.
    pub platform_fee_percent: u8,
}

impl Default for EscrowConfig {
    fn default() -> Self {
        Self {
            platform_fee_percent: 15,
        }
    }
}

/// Handle returned from task creation: everything the poster needs to fund
/// the escrow, and everything reconciliation needs to find it later.
#[derive(Debug, Clone)]
pub struct PaymentIntent {
    pub hold_tx_id: TransactionId,
    pub tx_ref: String,
    pub checkout_url: String,
    pub provider_ref: Option<String>,
}

/// Admin resolution target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Resolution {
    Paid,
    Cancelled,
}

impl Resolution {
    fn target_status(self) -> TaskStatus {
        match self {
            Self::Paid => TaskStatus::Paid,
            Self::Cancelled => TaskStatus::Cancelled,
        }
    }
}

/// Outcome of an admin resolution, including whether the audit record
/// landed or the resolution completed in degraded mode.
#[derive(Debug, Clone)]
pub struct ResolvedTask {
    pub task: Task,
    pub audit: AuditOutcome,
}

/// The task lifecycle and its coupling to money movement.
///
/// All collaborators are injected at construction, so tests substitute
/// in-memory stores and a fake gateway. Safety comes from the stores'
/// atomic conditional updates, not from in-process locks: gateway calls
/// never run inside a store critical section.
pub struct EscrowEngine {
    ledger: Arc<LedgerManager>,
    tasks: Arc<dyn TaskStore>,
    gateway: Arc<dyn PaymentGateway>,
    audit: Arc<dyn AuditSink>,
    config: EscrowConfig,
}

impl EscrowEngine {
    pub fn new(
        ledger: Arc<LedgerManager>,
        tasks: Arc<dyn TaskStore>,
        gateway: Arc<dyn PaymentGateway>,
        audit: Arc<dyn AuditSink>,
        config: EscrowConfig,
    ) -> Self {
        Self {
            ledger,
            tasks,
            gateway,
            audit,
            config,
        }
    }

    pub fn ledger(&self) -> &Arc<LedgerManager> {
        &self.ledger
    }

    /// Post a task and open the escrow charge.
    ///
    /// The PENDING hold is written before the gateway call; a provider
    /// failure or timeout surfaces as an error while the hold stays PENDING
    /// for later reconciliation. Nothing is ever silently dropped.
    pub async fn create_task(
        &self,
        poster: UserId,
        payer: ChargeCustomer,
        new_task: NewTask,
    ) -> Result<(Task, PaymentIntent)> {
        let title = new_task.title.trim().to_string();
        if title.is_empty() {
            return Err(EscrowError::Validation("title must not be empty".into()));
        }
        if !new_task.fee_amount.is_positive() {
            return Err(EscrowError::Validation(
                "fee amount must be greater than zero".into(),
            ));
        }

        // Wallets exist before any entry references them.
        self.ledger.wallet_for(poster).await?;
        let escrow_wallet = self.ledger.escrow_wallet().await?;

        let task = Task::new(poster, title, new_task.description.trim().to_string(), new_task.fee_amount);
        self.tasks.insert(task.clone()).await?;

        let reference = PaymentReference::TaskCharge(task.id);
        let hold = self
            .ledger
            .create_pending(
                NewTransaction::new(
                    escrow_wallet.id,
                    Some(task.id),
                    TransactionType::EscrowHold,
                    task.fee_amount,
                )
                .with_metadata(json!({
                    "tx_ref": reference.to_string(),
                    "poster_id": poster.to_string(),
                })),
            )
            .await?;

        // No store lock is held across this network call.
        let session = match self
            .gateway
            .initiate_charge(&reference, task.fee_amount, &payer)
            .await
        {
            Ok(session) => session,
            Err(e) => {
                warn!(
                    task_id = %task.id,
                    hold_tx_id = %hold.id,
                    error = %e,
                    "⚠️ Charge initiation failed; hold left PENDING for reconciliation"
                );
                return Err(e.into());
            }
        };

        if let Some(ref provider_ref) = session.provider_ref {
            self.ledger.attach_provider_ref(hold.id, provider_ref).await?;
        }

        info!(
            task_id = %task.id,
            poster = %poster,
            fee = %task.fee_amount,
            tx_ref = %session.tx_ref,
            "💰 Escrow hold created"
        );

        Ok((
            task,
            PaymentIntent {
                hold_tx_id: hold.id,
                tx_ref: session.tx_ref,
                checkout_url: session.checkout_url,
                provider_ref: session.provider_ref,
            },
        ))
    }

    /// Accept a POSTED task. A single atomic conditional update resolves
    /// the two-doers race: the loser gets Conflict, never a silent
    /// overwrite.
    pub async fn accept_task(&self, actor: UserId, task_id: TaskId) -> Result<Task> {
        let task = self.require_task(task_id).await?;
        if task.poster_id == actor {
            return Err(EscrowError::Forbidden(
                "poster cannot accept their own task".into(),
            ));
        }

        match self.tasks.try_accept(task_id, actor).await? {
            CasOutcome::Applied(task) => Ok(task),
            CasOutcome::Stale(_) => Err(EscrowError::Conflict(
                "task is no longer available".into(),
            )),
        }
    }

    /// Doer marks work done. No money effect.
    pub async fn complete_task(&self, actor: UserId, task_id: TaskId) -> Result<Task> {
        let task = self.require_task(task_id).await?;
        if task.doer_id != Some(actor) {
            return Err(EscrowError::Forbidden(
                "only the assigned doer can mark the task completed".into(),
            ));
        }

        match self
            .tasks
            .try_transition(task_id, TaskStatus::Accepted, TaskStatus::Completed)
            .await?
        {
            CasOutcome::Applied(task) => Ok(task),
            CasOutcome::Stale(task) => Err(EscrowError::Conflict(format!(
                "task is {} and cannot be marked completed",
                task.status
            ))),
        }
    }

    /// Poster confirms completed work: task goes PAID and the escrow is
    /// released: fee to the revenue account, remainder to the doer.
    pub async fn confirm_task(&self, actor: UserId, task_id: TaskId) -> Result<Task> {
        let task = self.require_task(task_id).await?;
        if task.poster_id != actor {
            return Err(EscrowError::Forbidden(
                "only the task poster can confirm completion".into(),
            ));
        }

        self.require_funded_hold(&task).await?;

        let task = match self
            .tasks
            .try_transition(task_id, TaskStatus::Completed, TaskStatus::Paid)
            .await?
        {
            CasOutcome::Applied(task) => task,
            CasOutcome::Stale(task) => {
                return Err(EscrowError::Conflict(format!(
                    "task is {} and cannot be confirmed",
                    task.status
                )))
            }
        };

        self.release_escrow(&task).await?;
        Ok(task)
    }

    /// Poster cancels an unaccepted task. A never-funded hold is marked
    /// FAILED; a funded hold is refunded in full to the poster.
    pub async fn cancel_task(&self, actor: UserId, task_id: TaskId) -> Result<Task> {
        let task = self.require_task(task_id).await?;
        if task.poster_id != actor {
            return Err(EscrowError::Forbidden(
                "only the task poster can cancel".into(),
            ));
        }

        let task = match self
            .tasks
            .try_transition(task_id, TaskStatus::Posted, TaskStatus::Cancelled)
            .await?
        {
            CasOutcome::Applied(task) => task,
            CasOutcome::Stale(task) => {
                return Err(EscrowError::Conflict(format!(
                    "task is {}: only unaccepted tasks can be cancelled",
                    task.status
                )))
            }
        };

        self.unwind_hold(&task).await?;
        Ok(task)
    }

    /// Admin manual resolution of a stuck task to PAID or CANCELLED, with a
    /// mandatory audited reason. Performs the same ledger operations as the
    /// normal paths; never a raw balance write. The audit write is
    /// best-effort: its failure degrades the result, it does not block the
    /// resolution.
    pub async fn resolve_task(
        &self,
        admin: UserId,
        task_id: TaskId,
        resolution: Resolution,
        reason: &str,
    ) -> Result<ResolvedTask> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(EscrowError::Validation(
                "a reason is required for manual resolution".into(),
            ));
        }

        let task = self.require_task(task_id).await?;
        let target = resolution.target_status();

        if task.status.is_terminal() {
            return Err(EscrowError::Conflict(format!(
                "task is already {}",
                task.status
            )));
        }
        if resolution == Resolution::Paid && task.doer_id.is_none() {
            return Err(EscrowError::Validation(
                "cannot resolve a task with no assigned doer to PAID".into(),
            ));
        }
        if !task.status.can_transition_to(target) {
            return Err(EscrowError::Conflict(format!(
                "cannot resolve a {} task to {}",
                task.status, target
            )));
        }

        if resolution == Resolution::Paid {
            self.require_funded_hold(&task).await?;
        }

        let resolved = match self
            .tasks
            .try_transition(task_id, task.status, target)
            .await?
        {
            CasOutcome::Applied(task) => task,
            CasOutcome::Stale(task) => {
                return Err(EscrowError::Conflict(format!(
                    "task changed concurrently, now {}",
                    task.status
                )))
            }
        };

        match resolution {
            Resolution::Paid => self.release_escrow(&resolved).await?,
            Resolution::Cancelled => self.unwind_hold(&resolved).await?,
        }

        let audit = match self
            .audit
            .record(AdminAction::task_resolution(
                admin,
                task_id,
                target,
                reason.to_string(),
            ))
            .await
        {
            Ok(()) => AuditOutcome::Recorded,
            Err(e) => {
                warn!(
                    admin = %admin,
                    task_id = %task_id,
                    error = %e,
                    "⚠️ Audit record failed; resolution stands in degraded mode"
                );
                AuditOutcome::Degraded(e)
            }
        };

        info!(
            admin = %admin,
            task_id = %task_id,
            resolution = %target,
            reason = %reason,
            "🛡️ Task manually resolved"
        );

        Ok(ResolvedTask {
            task: resolved,
            audit,
        })
    }

    pub async fn get_task(&self, task_id: TaskId) -> Result<Task> {
        self.require_task(task_id).await
    }

    pub async fn tasks_by_poster(&self, poster: UserId) -> Result<Vec<Task>> {
        self.tasks.by_poster(poster).await
    }

    pub async fn tasks_by_doer(&self, doer: UserId) -> Result<Vec<Task>> {
        self.tasks.by_doer(doer).await
    }

    pub async fn open_tasks(&self, limit: usize) -> Result<Vec<Task>> {
        self.tasks.open_tasks(limit).await
    }

    async fn require_task(&self, task_id: TaskId) -> Result<Task> {
        self.tasks
            .get(task_id)
            .await?
            .ok_or_else(|| EscrowError::NotFound(format!("task {}", task_id)))
    }

    /// Releasing or paying out requires the escrow hold to have settled:
    /// unfunded escrow can never be released.
    async fn require_funded_hold(&self, task: &Task) -> Result<()> {
        let hold = self
            .ledger
            .find_by_task_and_type(task.id, TransactionType::EscrowHold)
            .await?;
        match hold {
            Some(tx) if tx.status == TransactionStatus::Completed => Ok(()),
            Some(_) => Err(EscrowError::Conflict(
                "escrow payment has not been confirmed yet".into(),
            )),
            None => Err(EscrowError::Integrity(format!(
                "task {} has no escrow hold",
                task.id
            ))),
        }
    }

    /// The four release legs, posted atomically: fee and remainder both
    /// leave the escrow wallet, the fee lands on the revenue account and
    /// the remainder on the doer. Fee rounds down; the doer gets the exact
    /// remainder, so the two always sum to the task fee.
    async fn release_escrow(&self, task: &Task) -> Result<()> {
        let doer = task.doer_id.ok_or_else(|| {
            EscrowError::Integrity(format!("task {} is PAID with no doer", task.id))
        })?;

        let (fee, doer_share) = task
            .fee_amount
            .split_fee(self.config.platform_fee_percent)
            .map_err(EscrowError::from)?;

        let escrow_wallet = self.ledger.escrow_wallet().await?;
        let revenue_wallet = self.ledger.revenue_wallet().await?;
        let doer_wallet = self.ledger.wallet_for(doer).await?;

        let metadata = json!({
            "original_amount": task.fee_amount,
            "fee_percent": self.config.platform_fee_percent,
            "poster_id": task.poster_id.to_string(),
        });

        let legs = vec![
            NewTransaction::new(
                escrow_wallet.id,
                Some(task.id),
                TransactionType::EscrowRelease,
                doer_share.negated(),
            )
            .with_metadata(metadata.clone()),
            NewTransaction::new(
                doer_wallet.id,
                Some(task.id),
                TransactionType::EscrowRelease,
                doer_share,
            )
            .with_metadata(metadata.clone()),
            NewTransaction::new(
                escrow_wallet.id,
                Some(task.id),
                TransactionType::PlatformFee,
                fee.negated(),
            )
            .with_metadata(metadata.clone()),
            NewTransaction::new(
                revenue_wallet.id,
                Some(task.id),
                TransactionType::PlatformFee,
                fee,
            )
            .with_metadata(metadata),
        ];

        if let Err(e) = self.ledger.post_completed(legs).await {
            error!(
                task_id = %task.id,
                error = %e,
                "❌ Escrow release failed after PAID transition"
            );
            return Err(e.into());
        }

        info!(
            task_id = %task.id,
            doer = %doer,
            released = %doer_share,
            fee = %fee,
            "✅ Escrow released"
        );
        Ok(())
    }

    /// Unwind the hold on cancellation: a PENDING hold is marked FAILED (no
    /// balance was ever affected), a COMPLETED hold is refunded in full to
    /// the poster with the canonical REFUND type.
    async fn unwind_hold(&self, task: &Task) -> Result<()> {
        let hold = self
            .ledger
            .find_by_task_and_type(task.id, TransactionType::EscrowHold)
            .await?;

        let hold = match hold {
            Some(hold) => hold,
            None => {
                warn!(task_id = %task.id, "Cancelled task has no escrow hold; nothing to unwind");
                return Ok(());
            }
        };

        match hold.status {
            TransactionStatus::Pending => {
                let settled = self
                    .ledger
                    .settle(hold.id, TransactionStatus::Failed, None)
                    .await?;
                if settled.status == TransactionStatus::Completed {
                    // The charge webhook won the race and funded the escrow
                    // between our read and the settle; refund instead.
                    self.refund_completed_hold(task, hold.id).await?;
                } else {
                    info!(task_id = %task.id, hold_tx_id = %hold.id, "🔓 Unfunded hold marked FAILED");
                }
            }
            TransactionStatus::Completed => {
                self.refund_completed_hold(task, hold.id).await?;
            }
            TransactionStatus::Failed => {}
        }
        Ok(())
    }

    async fn refund_completed_hold(
        &self,
        task: &Task,
        hold_tx_id: TransactionId,
    ) -> Result<()> {
        let escrow_wallet = self.ledger.escrow_wallet().await?;
        let poster_wallet = self.ledger.wallet_for(task.poster_id).await?;
        let metadata = json!({
            "refund_of": hold_tx_id.to_string(),
        });
        self.ledger
            .post_completed(vec![
                NewTransaction::new(
                    escrow_wallet.id,
                    Some(task.id),
                    TransactionType::Refund,
                    task.fee_amount.negated(),
                )
                .with_metadata(metadata.clone()),
                NewTransaction::new(
                    poster_wallet.id,
                    Some(task.id),
                    TransactionType::Refund,
                    task.fee_amount,
                )
                .with_metadata(metadata),
            ])
            .await?;
        info!(
            task_id = %task.id,
            poster = %task.poster_id,
            amount = %task.fee_amount,
            "↩️ Escrow refunded to poster"
        );
        Ok(())
    }
}
