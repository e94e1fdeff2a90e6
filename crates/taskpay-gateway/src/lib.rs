//! Payment gateway adapter.
//!
//! Isolates every outbound call to the external payment provider behind a
//! narrow trait, plus webhook signature verification and the correlation
//! reference codec used to join asynchronous provider events back to the
//! ledger.

pub mod client;
pub mod error;
pub mod reference;
pub mod signature;
pub mod types;

pub use client::{GatewayConfig, HttpGateway, PaymentGateway};
pub use error::{GatewayError, Result};
pub use reference::PaymentReference;
pub use signature::WebhookVerifier;
pub use types::{
    ChargeCustomer, CheckoutSession, PaymentVerification, PayoutDestination, WebhookEvent,
    WebhookPayload,
};
