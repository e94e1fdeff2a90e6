use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::{info, warn};

use taskpay_ledger::types::MINOR_PER_MAJOR;
use taskpay_ledger::Amount;

use crate::error::{GatewayError, Result};
use crate::reference::PaymentReference;
use crate::types::{ChargeCustomer, CheckoutSession, PaymentVerification, PayoutDestination};

/// Outbound contract the escrow engine depends on. Implementations must not
/// mutate ledger state: a failure here leaves the caller's PENDING entry
/// reconcilable, and the caller decides retry/abort.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Start a hosted payment. The reference is our correlation key.
    async fn initiate_charge(
        &self,
        reference: &PaymentReference,
        amount: Amount,
        payer: &ChargeCustomer,
    ) -> Result<CheckoutSession>;

    /// Start an external transfer; returns the provider transfer id.
    async fn initiate_payout(
        &self,
        reference: &PaymentReference,
        amount: Amount,
        destination: &PayoutDestination,
    ) -> Result<String>;

    /// Manually verify a charge by the provider's own transaction id.
    async fn verify_payment(&self, provider_tx_id: &str) -> Result<PaymentVerification>;
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub base_url: String,
    pub secret_key: String,
    pub timeout_secs: u64,
    pub currency: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.flutterwave.com/v3".to_string(),
            secret_key: String::new(),
            timeout_secs: 10,
            currency: "NGN".to_string(),
        }
    }
}

/// Envelope every provider response arrives in.
#[derive(Debug, Deserialize)]
struct ProviderEnvelope {
    status: String,
    message: Option<String>,
    #[serde(default)]
    data: serde_json::Value,
}

/// HTTP payment gateway client. One reqwest client, bounded timeout,
/// bearer-authenticated requests.
pub struct HttpGateway {
    client: reqwest::Client,
    config: GatewayConfig,
}

impl HttpGateway {
    pub fn new(config: GatewayConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| GatewayError::Request(e.to_string()))?;
        Ok(Self { client, config })
    }

    async fn post(&self, endpoint: &str, body: serde_json::Value) -> Result<serde_json::Value> {
        let url = format!("{}{}", self.config.base_url, endpoint);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.secret_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.map_transport_error(e))?;
        self.unwrap_envelope(response).await
    }

    async fn get(&self, endpoint: &str) -> Result<serde_json::Value> {
        let url = format!("{}{}", self.config.base_url, endpoint);
        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.config.secret_key)
            .send()
            .await
            .map_err(|e| self.map_transport_error(e))?;
        self.unwrap_envelope(response).await
    }

    fn map_transport_error(&self, err: reqwest::Error) -> GatewayError {
        if err.is_timeout() {
            GatewayError::Timeout(self.config.timeout_secs)
        } else {
            GatewayError::Request(err.to_string())
        }
    }

    async fn unwrap_envelope(&self, response: reqwest::Response) -> Result<serde_json::Value> {
        let http_status = response.status();
        let envelope: ProviderEnvelope = response
            .json()
            .await
            .map_err(|e| GatewayError::MalformedResponse(e.to_string()))?;

        if http_status.is_server_error() {
            return Err(GatewayError::Request(format!(
                "provider returned {}",
                http_status
            )));
        }
        if envelope.status != "success" {
            return Err(GatewayError::Provider(
                envelope
                    .message
                    .unwrap_or_else(|| format!("provider status {}", envelope.status)),
            ));
        }
        Ok(envelope.data)
    }
}

fn to_major(amount: Amount) -> f64 {
    amount.to_minor() as f64 / MINOR_PER_MAJOR as f64
}

#[async_trait]
impl PaymentGateway for HttpGateway {
    async fn initiate_charge(
        &self,
        reference: &PaymentReference,
        amount: Amount,
        payer: &ChargeCustomer,
    ) -> Result<CheckoutSession> {
        let tx_ref = reference.to_string();
        let body = json!({
            "tx_ref": tx_ref,
            "amount": to_major(amount),
            "currency": self.config.currency,
            "customer": payer,
            "customizations": {
                "title": "Task escrow payment",
                "description": format!("Escrow payment ({})", tx_ref),
            },
        });

        let data = self.post("/payments", body).await?;
        let checkout_url = data
            .get("link")
            .and_then(|v| v.as_str())
            .ok_or_else(|| GatewayError::MalformedResponse("missing checkout link".into()))?
            .to_string();
        let provider_ref = data.get("id").map(|v| v.to_string());

        info!(tx_ref = %tx_ref, amount = %amount, "💳 Charge initiated");
        Ok(CheckoutSession {
            checkout_url,
            tx_ref,
            provider_ref,
        })
    }

    async fn initiate_payout(
        &self,
        reference: &PaymentReference,
        amount: Amount,
        destination: &PayoutDestination,
    ) -> Result<String> {
        let tx_ref = reference.to_string();
        let body = json!({
            "account_bank": destination.bank_code,
            "account_number": destination.account_number,
            "amount": to_major(amount),
            "currency": self.config.currency,
            "reference": tx_ref,
            "narration": "Wallet withdrawal",
            "beneficiary_name": destination.account_name,
        });

        let data = self.post("/transfers", body).await?;
        let transfer_id = data
            .get("id")
            .map(|v| v.to_string())
            .ok_or_else(|| GatewayError::MalformedResponse("missing transfer id".into()))?;

        info!(reference = %tx_ref, amount = %amount, transfer_id = %transfer_id, "💸 Payout initiated");
        Ok(transfer_id)
    }

    async fn verify_payment(&self, provider_tx_id: &str) -> Result<PaymentVerification> {
        let data = self
            .get(&format!("/transactions/{}/verify", provider_tx_id))
            .await?;
        let status = data
            .get("status")
            .and_then(|v| v.as_str())
            .unwrap_or("unknown")
            .to_string();
        let tx_ref = data
            .get("tx_ref")
            .and_then(|v| v.as_str())
            .map(str::to_string);

        if status != "successful" {
            warn!(provider_tx_id = %provider_tx_id, status = %status, "⚠️ Payment verification not successful");
        }
        Ok(PaymentVerification {
            provider_tx_id: provider_tx_id.to_string(),
            status,
            tx_ref,
        })
    }
}
