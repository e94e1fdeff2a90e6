use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::error::{LedgerError, Result};
use crate::types::{
    Amount, NewTransaction, Transaction, TransactionId, TransactionStatus, TransactionType,
    UserId, Wallet, WalletId,
};

/// Durable wallet/transaction persistence.
///
/// The concurrency contract lives here, not in callers: every method that
/// couples a status change to a balance change runs in a single atomic unit
/// with respect to concurrent calls on the same wallet. The in-memory
/// implementation uses one write-lock critical section per operation; a
/// database-backed implementation would use row locks or a serializable
/// transaction for the same guarantees.
#[async_trait]
pub trait LedgerStorage: Send + Sync {
    async fn get_or_create_wallet(&self, user_id: UserId, currency: &str) -> Result<Wallet>;
    async fn get_wallet(&self, user_id: UserId) -> Result<Option<Wallet>>;
    async fn get_wallet_by_id(&self, wallet_id: WalletId) -> Result<Option<Wallet>>;

    /// Insert a new PENDING entry. Never touches balance.
    async fn create_transaction(&self, new_tx: NewTransaction) -> Result<Transaction>;

    /// Transition a PENDING transaction to COMPLETED or FAILED.
    ///
    /// A transaction already in a terminal state is returned unchanged (this
    /// is what makes webhook replay safe). On transition to COMPLETED the
    /// owning wallet's balance adjusts by the transaction amount in the same
    /// critical section.
    async fn settle_transaction(
        &self,
        tx_id: TransactionId,
        final_status: TransactionStatus,
        provider_ref: Option<String>,
    ) -> Result<Transaction>;

    /// Record a provider reference on a still-PENDING transaction.
    async fn attach_provider_ref(
        &self,
        tx_id: TransactionId,
        provider_ref: &str,
    ) -> Result<Transaction>;

    /// Insert a batch of entries directly in COMPLETED state, applying all
    /// balance adjustments atomically. The whole batch fails (and nothing is
    /// written) if any adjustment would drive a balance negative.
    async fn post_completed_batch(
        &self,
        entries: Vec<NewTransaction>,
    ) -> Result<Vec<Transaction>>;

    /// Atomically check available balance (balance minus PENDING
    /// withdrawals) and insert a PENDING WITHDRAWAL for the negated amount.
    async fn reserve_withdrawal(
        &self,
        wallet_id: WalletId,
        amount: Amount,
        metadata: serde_json::Value,
    ) -> Result<Transaction>;

    async fn get_transaction(&self, tx_id: TransactionId) -> Result<Option<Transaction>>;
    async fn transactions_by_task(
        &self,
        task_id: crate::types::TaskId,
    ) -> Result<Vec<Transaction>>;
    async fn transactions_by_wallet(
        &self,
        wallet_id: WalletId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Transaction>>;
    async fn pending_withdrawal_total(&self, wallet_id: WalletId) -> Result<Amount>;
}

#[derive(Default)]
struct LedgerState {
    wallets_by_user: HashMap<UserId, WalletId>,
    wallets: HashMap<WalletId, Wallet>,
    transactions: HashMap<TransactionId, Transaction>,
    by_task: HashMap<crate::types::TaskId, Vec<TransactionId>>,
    by_wallet: HashMap<WalletId, Vec<TransactionId>>,
}

impl LedgerState {
    fn insert_transaction(&mut self, tx: Transaction) {
        if let Some(task_id) = tx.task_id {
            self.by_task.entry(task_id).or_default().push(tx.id);
        }
        self.by_wallet.entry(tx.wallet_id).or_default().push(tx.id);
        self.transactions.insert(tx.id, tx);
    }

    fn apply_balance(&mut self, wallet_id: WalletId, delta: Amount) -> Result<()> {
        let wallet = self
            .wallets
            .get_mut(&wallet_id)
            .ok_or_else(|| LedgerError::WalletNotFound(wallet_id.to_string()))?;
        let new_balance = wallet
            .balance
            .checked_add(delta)
            .ok_or_else(|| LedgerError::Integrity("balance overflow".to_string()))?;
        if new_balance.is_negative() {
            return Err(LedgerError::Integrity(format!(
                "settlement would drive wallet {} negative: {} + {}",
                wallet_id, wallet.balance, delta
            )));
        }
        wallet.balance = new_balance;
        wallet.updated_at = Utc::now();
        Ok(())
    }
}

/// In-memory ledger store. One lock guards the whole state so every trait
/// method is a single critical section.
pub struct MemoryLedgerStorage {
    state: RwLock<LedgerState>,
}

impl Default for MemoryLedgerStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryLedgerStorage {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(LedgerState::default()),
        }
    }
}

fn build_transaction(new_tx: NewTransaction, status: TransactionStatus) -> Transaction {
    Transaction {
        id: TransactionId::new(),
        wallet_id: new_tx.wallet_id,
        task_id: new_tx.task_id,
        tx_type: new_tx.tx_type,
        amount: new_tx.amount,
        status,
        provider_ref: None,
        metadata: new_tx.metadata,
        created_at: Utc::now(),
    }
}

#[async_trait]
impl LedgerStorage for MemoryLedgerStorage {
    async fn get_or_create_wallet(&self, user_id: UserId, currency: &str) -> Result<Wallet> {
        let mut state = self.state.write().await;
        if let Some(wallet_id) = state.wallets_by_user.get(&user_id) {
            return Ok(state.wallets[wallet_id].clone());
        }

        let wallet = Wallet {
            id: WalletId::new(),
            user_id,
            balance: Amount::ZERO,
            currency: currency.to_string(),
            updated_at: Utc::now(),
        };
        state.wallets_by_user.insert(user_id, wallet.id);
        state.wallets.insert(wallet.id, wallet.clone());

        info!(
            user_id = %user_id,
            wallet_id = %wallet.id,
            currency = %wallet.currency,
            "👛 Wallet created"
        );
        Ok(wallet)
    }

    async fn get_wallet(&self, user_id: UserId) -> Result<Option<Wallet>> {
        let state = self.state.read().await;
        Ok(state
            .wallets_by_user
            .get(&user_id)
            .map(|id| state.wallets[id].clone()))
    }

    async fn get_wallet_by_id(&self, wallet_id: WalletId) -> Result<Option<Wallet>> {
        let state = self.state.read().await;
        Ok(state.wallets.get(&wallet_id).cloned())
    }

    async fn create_transaction(&self, new_tx: NewTransaction) -> Result<Transaction> {
        let mut state = self.state.write().await;
        if !state.wallets.contains_key(&new_tx.wallet_id) {
            return Err(LedgerError::WalletNotFound(new_tx.wallet_id.to_string()));
        }

        let tx = build_transaction(new_tx, TransactionStatus::Pending);
        state.insert_transaction(tx.clone());

        info!(
            tx_id = %tx.id,
            wallet_id = %tx.wallet_id,
            tx_type = %tx.tx_type,
            amount = %tx.amount,
            "📝 Transaction recorded (pending)"
        );
        Ok(tx)
    }

    async fn settle_transaction(
        &self,
        tx_id: TransactionId,
        final_status: TransactionStatus,
        provider_ref: Option<String>,
    ) -> Result<Transaction> {
        if !final_status.is_terminal() {
            return Err(LedgerError::Integrity(format!(
                "settlement target must be terminal, got {}",
                final_status
            )));
        }

        let mut state = self.state.write().await;
        let existing = state
            .transactions
            .get(&tx_id)
            .cloned()
            .ok_or_else(|| LedgerError::TransactionNotFound(tx_id.to_string()))?;

        // Terminal entries are immutable: replayed settlements are no-ops.
        if existing.status.is_terminal() {
            info!(
                tx_id = %tx_id,
                status = %existing.status,
                requested = %final_status,
                "🔁 Settlement replay ignored (already terminal)"
            );
            return Ok(existing);
        }

        if final_status == TransactionStatus::Completed {
            state.apply_balance(existing.wallet_id, existing.amount)?;
        }

        let tx = state
            .transactions
            .get_mut(&tx_id)
            .ok_or_else(|| LedgerError::TransactionNotFound(tx_id.to_string()))?;
        tx.status = final_status;
        if provider_ref.is_some() {
            tx.provider_ref = provider_ref;
        }
        let settled = tx.clone();

        info!(
            tx_id = %tx_id,
            wallet_id = %settled.wallet_id,
            tx_type = %settled.tx_type,
            amount = %settled.amount,
            status = %settled.status,
            provider_ref = settled.provider_ref.as_deref().unwrap_or("-"),
            "✅ Transaction settled"
        );
        Ok(settled)
    }

    async fn attach_provider_ref(
        &self,
        tx_id: TransactionId,
        provider_ref: &str,
    ) -> Result<Transaction> {
        let mut state = self.state.write().await;
        let tx = state
            .transactions
            .get_mut(&tx_id)
            .ok_or_else(|| LedgerError::TransactionNotFound(tx_id.to_string()))?;
        if tx.status.is_terminal() {
            warn!(
                tx_id = %tx_id,
                status = %tx.status,
                "Provider ref for already-settled transaction ignored"
            );
            return Ok(tx.clone());
        }
        tx.provider_ref = Some(provider_ref.to_string());
        Ok(tx.clone())
    }

    async fn post_completed_batch(
        &self,
        entries: Vec<NewTransaction>,
    ) -> Result<Vec<Transaction>> {
        let mut state = self.state.write().await;

        // Validate the whole batch before writing anything.
        let mut deltas: HashMap<WalletId, Amount> = HashMap::new();
        for entry in &entries {
            let delta = deltas.entry(entry.wallet_id).or_insert(Amount::ZERO);
            *delta = delta
                .checked_add(entry.amount)
                .ok_or_else(|| LedgerError::Integrity("batch amount overflow".to_string()))?;
        }
        for (wallet_id, delta) in &deltas {
            let wallet = state
                .wallets
                .get(wallet_id)
                .ok_or_else(|| LedgerError::WalletNotFound(wallet_id.to_string()))?;
            let new_balance = wallet
                .balance
                .checked_add(*delta)
                .ok_or_else(|| LedgerError::Integrity("balance overflow".to_string()))?;
            if new_balance.is_negative() {
                return Err(LedgerError::Integrity(format!(
                    "batch would drive wallet {} negative: {} + {}",
                    wallet_id, wallet.balance, delta
                )));
            }
        }

        for (wallet_id, delta) in deltas {
            state.apply_balance(wallet_id, delta)?;
        }

        let mut posted = Vec::with_capacity(entries.len());
        for entry in entries {
            let tx = build_transaction(entry, TransactionStatus::Completed);
            info!(
                tx_id = %tx.id,
                wallet_id = %tx.wallet_id,
                tx_type = %tx.tx_type,
                amount = %tx.amount,
                "💰 Settled entry posted"
            );
            state.insert_transaction(tx.clone());
            posted.push(tx);
        }
        Ok(posted)
    }

    async fn reserve_withdrawal(
        &self,
        wallet_id: WalletId,
        amount: Amount,
        metadata: serde_json::Value,
    ) -> Result<Transaction> {
        let mut state = self.state.write().await;
        let wallet = state
            .wallets
            .get(&wallet_id)
            .ok_or_else(|| LedgerError::WalletNotFound(wallet_id.to_string()))?;

        let pending = pending_withdrawals(&state, wallet_id);
        let available = wallet.balance.checked_sub(pending).unwrap_or(Amount::ZERO);
        if available < amount {
            return Err(LedgerError::InsufficientBalance {
                required: amount.to_string(),
                available: available.to_string(),
            });
        }

        let tx = build_transaction(
            NewTransaction::new(wallet_id, None, TransactionType::Withdrawal, amount.negated())
                .with_metadata(metadata),
            TransactionStatus::Pending,
        );
        state.insert_transaction(tx.clone());

        info!(
            tx_id = %tx.id,
            wallet_id = %wallet_id,
            amount = %amount,
            available_before = %available,
            "💸 Withdrawal reserved"
        );
        Ok(tx)
    }

    async fn get_transaction(&self, tx_id: TransactionId) -> Result<Option<Transaction>> {
        let state = self.state.read().await;
        Ok(state.transactions.get(&tx_id).cloned())
    }

    async fn transactions_by_task(
        &self,
        task_id: crate::types::TaskId,
    ) -> Result<Vec<Transaction>> {
        let state = self.state.read().await;
        Ok(state
            .by_task
            .get(&task_id)
            .map(|ids| ids.iter().map(|id| state.transactions[id].clone()).collect())
            .unwrap_or_default())
    }

    async fn transactions_by_wallet(
        &self,
        wallet_id: WalletId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Transaction>> {
        let state = self.state.read().await;
        Ok(state
            .by_wallet
            .get(&wallet_id)
            .map(|ids| {
                ids.iter()
                    .rev() // newest first
                    .skip(offset)
                    .take(limit)
                    .map(|id| state.transactions[id].clone())
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn pending_withdrawal_total(&self, wallet_id: WalletId) -> Result<Amount> {
        let state = self.state.read().await;
        Ok(pending_withdrawals(&state, wallet_id))
    }
}

fn pending_withdrawals(state: &LedgerState, wallet_id: WalletId) -> Amount {
    state
        .by_wallet
        .get(&wallet_id)
        .map(|ids| {
            ids.iter()
                .filter_map(|id| state.transactions.get(id))
                .filter(|tx| {
                    tx.tx_type == TransactionType::Withdrawal
                        && tx.status == TransactionStatus::Pending
                })
                .fold(Amount::ZERO, |acc, tx| {
                    acc.checked_add(tx.amount.abs()).unwrap_or(acc)
                })
        })
        .unwrap_or(Amount::ZERO)
}
