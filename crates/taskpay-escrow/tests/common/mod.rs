#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use taskpay_escrow::{
    AuditSink, EscrowConfig, EscrowEngine, MemoryAuditLog, MemoryTaskStore, NewTask,
    WebhookReconciler, WithdrawalProcessor,
};
use taskpay_gateway::{
    ChargeCustomer, CheckoutSession, GatewayError, PaymentGateway, PaymentReference,
    PaymentVerification, PayoutDestination, WebhookPayload,
};
use taskpay_ledger::{Amount, LedgerManager, MemoryLedgerStorage};

/// Deterministic gateway double: records nothing external, optionally fails.
pub struct FakeGateway {
    pub fail_charges: bool,
    pub fail_payouts: bool,
    pub payouts: AtomicUsize,
}

impl Default for FakeGateway {
    fn default() -> Self {
        Self {
            fail_charges: false,
            fail_payouts: false,
            payouts: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    async fn initiate_charge(
        &self,
        reference: &PaymentReference,
        _amount: Amount,
        _payer: &ChargeCustomer,
    ) -> taskpay_gateway::Result<CheckoutSession> {
        if self.fail_charges {
            return Err(GatewayError::Request("connection refused".into()));
        }
        Ok(CheckoutSession {
            checkout_url: "https://pay.test/checkout/abc".into(),
            tx_ref: reference.to_string(),
            provider_ref: Some("prov-charge-1".into()),
        })
    }

    async fn initiate_payout(
        &self,
        _reference: &PaymentReference,
        _amount: Amount,
        _destination: &PayoutDestination,
    ) -> taskpay_gateway::Result<String> {
        if self.fail_payouts {
            return Err(GatewayError::Timeout(10));
        }
        let n = self.payouts.fetch_add(1, Ordering::SeqCst);
        Ok(format!("transfer-{}", n + 1))
    }

    async fn verify_payment(
        &self,
        provider_tx_id: &str,
    ) -> taskpay_gateway::Result<PaymentVerification> {
        Ok(PaymentVerification {
            provider_tx_id: provider_tx_id.to_string(),
            status: "successful".into(),
            tx_ref: None,
        })
    }
}

/// Audit sink that always fails, to exercise the degraded-mode path.
pub struct FailingAuditSink;

#[async_trait]
impl AuditSink for FailingAuditSink {
    async fn record(
        &self,
        _action: taskpay_escrow::AdminAction,
    ) -> std::result::Result<(), String> {
        Err("audit store unavailable".into())
    }
}

pub struct Harness {
    pub engine: Arc<EscrowEngine>,
    pub reconciler: WebhookReconciler,
    pub withdrawals: WithdrawalProcessor,
    pub ledger: Arc<LedgerManager>,
    pub audit: Arc<MemoryAuditLog>,
}

pub fn harness_with(gateway: Arc<dyn PaymentGateway>, fee_percent: u8) -> Harness {
    let ledger = Arc::new(LedgerManager::new(
        Arc::new(MemoryLedgerStorage::new()),
        "NGN",
    ));
    let tasks = Arc::new(MemoryTaskStore::new());
    let audit = Arc::new(MemoryAuditLog::new());

    let engine = Arc::new(EscrowEngine::new(
        ledger.clone(),
        tasks,
        gateway.clone(),
        audit.clone(),
        EscrowConfig {
            platform_fee_percent: fee_percent,
        },
    ));
    let reconciler = WebhookReconciler::new(ledger.clone());
    let withdrawals = WithdrawalProcessor::new(ledger.clone(), gateway);

    Harness {
        engine,
        reconciler,
        withdrawals,
        ledger,
        audit,
    }
}

pub fn harness(fee_percent: u8) -> Harness {
    harness_with(Arc::new(FakeGateway::default()), fee_percent)
}

pub fn payer() -> ChargeCustomer {
    ChargeCustomer {
        email: "0801234567@taskpay.test".into(),
        phone_number: "0801234567".into(),
        name: "Test Poster".into(),
    }
}

pub fn destination() -> PayoutDestination {
    PayoutDestination {
        account_number: "0690000040".into(),
        bank_code: "044".into(),
        account_name: "Test Doer".into(),
    }
}

pub fn new_task(fee_minor: i64) -> NewTask {
    NewTask {
        title: "Pick up laundry".into(),
        description: "Two bags, before 5pm".into(),
        fee_amount: Amount::from_minor(fee_minor),
    }
}

/// Simulate the provider confirming a charge for the given tx_ref.
pub fn charge_webhook(tx_ref: &str, status: &str) -> WebhookPayload {
    WebhookPayload {
        event: "charge.completed".into(),
        data: json!({
            "tx_ref": tx_ref,
            "status": status,
            "flw_ref": "FLW-MOCK-1",
            "id": 4451,
        }),
    }
}

/// Simulate the provider reporting a transfer outcome.
pub fn transfer_webhook(reference: &str, status: &str) -> WebhookPayload {
    WebhookPayload {
        event: "transfer.completed".into(),
        data: json!({
            "reference": reference,
            "status": status,
            "id": 7781,
        }),
    }
}
