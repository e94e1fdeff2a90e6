use thiserror::Error;

/// Payment gateway error types
#[derive(Error, Debug, Clone)]
pub enum GatewayError {
    /// Transport-level failure reaching the provider
    #[error("Gateway request failed: {0}")]
    Request(String),

    /// Provider reached but rejected the request
    #[error("Provider rejected request: {0}")]
    Provider(String),

    /// Provider did not answer within the configured timeout. The local
    /// ledger entry stays PENDING for later reconciliation.
    #[error("Provider request timed out after {0}s")]
    Timeout(u64),

    /// Provider response could not be decoded
    #[error("Malformed provider response: {0}")]
    MalformedResponse(String),

    /// Webhook secret not configured; verification fails closed
    #[error("Webhook secret not configured")]
    SecretMissing,

    /// Webhook signature did not match the payload
    #[error("Invalid webhook signature")]
    SignatureInvalid,
}

/// Result type for gateway operations
pub type Result<T> = std::result::Result<T, GatewayError>;
