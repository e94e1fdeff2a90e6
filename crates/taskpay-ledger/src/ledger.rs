use std::sync::Arc;
use tracing::info;

use crate::error::Result;
use crate::storage::LedgerStorage;
use crate::types::{
    Amount, NewTransaction, TaskId, Transaction, TransactionId, TransactionStatus,
    TransactionType, UserId, Wallet,
};

/// Domain wrapper over a [`LedgerStorage`]. The source of truth for
/// balances: a wallet's balance always equals the sum of its COMPLETED
/// transaction amounts.
pub struct LedgerManager {
    storage: Arc<dyn LedgerStorage>,
    currency: String,
}

impl LedgerManager {
    pub fn new(storage: Arc<dyn LedgerStorage>, currency: impl Into<String>) -> Self {
        Self {
            storage,
            currency: currency.into(),
        }
    }

    pub fn currency(&self) -> &str {
        &self.currency
    }

    pub async fn wallet_for(&self, user_id: UserId) -> Result<Wallet> {
        self.storage
            .get_or_create_wallet(user_id, &self.currency)
            .await
    }

    /// Funds held against open tasks live on this reserved wallet.
    pub async fn escrow_wallet(&self) -> Result<Wallet> {
        self.wallet_for(UserId::escrow_account()).await
    }

    /// Collected platform fees accumulate here.
    pub async fn revenue_wallet(&self) -> Result<Wallet> {
        self.wallet_for(UserId::revenue_account()).await
    }

    pub async fn get_balance(&self, user_id: UserId) -> Result<Amount> {
        Ok(self.wallet_for(user_id).await?.balance)
    }

    /// Balance minus the magnitude of PENDING withdrawals. Reserved intent
    /// does not move balance, but it is not spendable either.
    pub async fn available_balance(&self, user_id: UserId) -> Result<Amount> {
        let wallet = self.wallet_for(user_id).await?;
        let reserved = self.storage.pending_withdrawal_total(wallet.id).await?;
        Ok(wallet
            .balance
            .checked_sub(reserved)
            .unwrap_or(Amount::ZERO))
    }

    pub async fn create_pending(&self, new_tx: NewTransaction) -> Result<Transaction> {
        self.storage.create_transaction(new_tx).await
    }

    pub async fn settle(
        &self,
        tx_id: TransactionId,
        final_status: TransactionStatus,
        provider_ref: Option<String>,
    ) -> Result<Transaction> {
        self.storage
            .settle_transaction(tx_id, final_status, provider_ref)
            .await
    }

    pub async fn attach_provider_ref(
        &self,
        tx_id: TransactionId,
        provider_ref: &str,
    ) -> Result<Transaction> {
        self.storage.attach_provider_ref(tx_id, provider_ref).await
    }

    /// Post matched debit/credit legs in one atomic unit.
    pub async fn post_completed(&self, entries: Vec<NewTransaction>) -> Result<Vec<Transaction>> {
        let posted = self.storage.post_completed_batch(entries).await?;
        info!(legs = posted.len(), "💰 Ledger legs posted");
        Ok(posted)
    }

    pub async fn reserve_withdrawal(
        &self,
        user_id: UserId,
        amount: Amount,
        metadata: serde_json::Value,
    ) -> Result<Transaction> {
        let wallet = self.wallet_for(user_id).await?;
        self.storage
            .reserve_withdrawal(wallet.id, amount, metadata)
            .await
    }

    pub async fn get_transaction(&self, tx_id: TransactionId) -> Result<Option<Transaction>> {
        self.storage.get_transaction(tx_id).await
    }

    pub async fn transactions_by_task(&self, task_id: TaskId) -> Result<Vec<Transaction>> {
        self.storage.transactions_by_task(task_id).await
    }

    /// The task's entry of a given type, if any. The escrow flows write at
    /// most one ESCROW_HOLD per task, which is what the reconciler joins on.
    pub async fn find_by_task_and_type(
        &self,
        task_id: TaskId,
        tx_type: TransactionType,
    ) -> Result<Option<Transaction>> {
        Ok(self
            .storage
            .transactions_by_task(task_id)
            .await?
            .into_iter()
            .find(|tx| tx.tx_type == tx_type))
    }

    pub async fn history(
        &self,
        user_id: UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Transaction>> {
        let wallet = self.wallet_for(user_id).await?;
        self.storage
            .transactions_by_wallet(wallet.id, limit, offset)
            .await
    }

    /// Total platform fees collected: the revenue wallet's balance.
    pub async fn platform_fee_total(&self) -> Result<Amount> {
        Ok(self.revenue_wallet().await?.balance)
    }
}
