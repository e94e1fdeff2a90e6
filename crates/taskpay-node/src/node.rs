use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

use taskpay_escrow::{
    EscrowEngine, MemoryAuditLog, MemoryTaskStore, WebhookReconciler, WithdrawalProcessor,
};
use taskpay_gateway::{HttpGateway, PaymentGateway, WebhookVerifier};
use taskpay_ledger::{LedgerManager, MemoryLedgerStorage};

use crate::api::{self, AppState};
use crate::auth::AuthConfig;
use crate::config::NodeConfig;

/// Wires the ledger, escrow engine, gateway adapter, and API surface
/// together from a [`NodeConfig`].
pub struct TaskpayNode {
    config: NodeConfig,
    state: Arc<AppState>,
}

impl TaskpayNode {
    pub fn new(config: NodeConfig) -> Result<Self> {
        let ledger = Arc::new(LedgerManager::new(
            Arc::new(MemoryLedgerStorage::new()),
            config.business.currency.clone(),
        ));
        let tasks = Arc::new(MemoryTaskStore::new());
        let audit = Arc::new(MemoryAuditLog::new());
        let gateway: Arc<dyn PaymentGateway> = Arc::new(
            HttpGateway::new(config.gateway_config())
                .context("failed to build payment gateway client")?,
        );

        let engine = Arc::new(EscrowEngine::new(
            ledger.clone(),
            tasks,
            gateway.clone(),
            audit,
            config.escrow_config(),
        ));
        let reconciler = Arc::new(WebhookReconciler::new(ledger.clone()));
        let withdrawals = Arc::new(WithdrawalProcessor::new(ledger.clone(), gateway.clone()));
        let verifier = WebhookVerifier::new(config.gateway.webhook_secret.clone());
        let auth = AuthConfig::new(config.auth.jwt_secret.clone());

        let state = Arc::new(AppState {
            engine,
            reconciler,
            withdrawals,
            ledger,
            gateway,
            verifier,
            auth,
        });

        Ok(Self { config, state })
    }

    pub fn state(&self) -> Arc<AppState> {
        self.state.clone()
    }

    pub async fn run(self) -> Result<()> {
        let addr = format!("{}:{}", self.config.api.host, self.config.api.port);
        let app = api::router(self.state);

        info!(
            node = %self.config.node.name,
            addr = %addr,
            fee_percent = self.config.business.platform_fee_percent,
            "🚀 Starting API server"
        );

        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .with_context(|| format!("failed to bind {}", addr))?;
        axum::serve(listener, app)
            .await
            .context("API server exited")?;
        Ok(())
    }
}
