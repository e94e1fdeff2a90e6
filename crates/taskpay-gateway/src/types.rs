use serde::{Deserialize, Serialize};

/// Customer details forwarded to the provider when opening a hosted charge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChargeCustomer {
    pub email: String,
    pub phone_number: String,
    pub name: String,
}

/// Bank/mobile-money destination for an outbound payout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayoutDestination {
    pub account_number: String,
    pub bank_code: String,
    pub account_name: String,
}

/// Result of opening a hosted payment with the provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutSession {
    /// Hosted page the payer completes the charge on.
    pub checkout_url: String,
    /// The reference we embedded; echoed back by webhooks.
    pub tx_ref: String,
    /// Provider-side id, when the provider returns one at initiation.
    pub provider_ref: Option<String>,
}

/// Provider-reported state of a charge, from manual verification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentVerification {
    pub provider_tx_id: String,
    pub status: String,
    pub tx_ref: Option<String>,
}

/// Raw webhook body: an event name plus an event-shaped data object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookPayload {
    pub event: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

/// Decoded webhook event. Providers add event types over time, so anything
/// unrecognized decodes to `Unknown` and is ignored upstream, never an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookEvent {
    Charge {
        tx_ref: String,
        successful: bool,
        provider_ref: Option<String>,
    },
    Transfer {
        reference: String,
        successful: bool,
        provider_ref: Option<String>,
    },
    Unknown(String),
}

impl WebhookPayload {
    pub fn decode(&self) -> WebhookEvent {
        match self.event.as_str() {
            "charge.completed" => WebhookEvent::Charge {
                tx_ref: str_field(&self.data, "tx_ref").unwrap_or_default(),
                successful: str_field(&self.data, "status").as_deref() == Some("successful"),
                provider_ref: str_field(&self.data, "flw_ref").or_else(|| id_field(&self.data)),
            },
            "transfer.completed" | "transfer.failed" => WebhookEvent::Transfer {
                reference: str_field(&self.data, "reference").unwrap_or_default(),
                successful: self.event == "transfer.completed"
                    && str_field(&self.data, "status").as_deref() == Some("successful"),
                provider_ref: id_field(&self.data),
            },
            other => WebhookEvent::Unknown(other.to_string()),
        }
    }
}

fn str_field(data: &serde_json::Value, key: &str) -> Option<String> {
    data.get(key).and_then(|v| v.as_str()).map(str::to_string)
}

fn id_field(data: &serde_json::Value) -> Option<String> {
    data.get("id").map(|v| match v.as_str() {
        Some(s) => s.to_string(),
        None => v.to_string(),
    })
}
