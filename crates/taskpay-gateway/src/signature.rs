use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::{GatewayError, Result};

type HmacSha256 = Hmac<Sha256>;

/// HMAC-SHA256 webhook signature verification.
///
/// Fails closed: with no secret configured, nothing verifies. An
/// unconfigured secret means "cannot verify", never "always valid".
#[derive(Clone)]
pub struct WebhookVerifier {
    secret: Option<String>,
}

impl WebhookVerifier {
    pub fn new(secret: Option<String>) -> Self {
        let secret = secret.filter(|s| !s.is_empty());
        Self { secret }
    }

    /// Verify `signature` (hex-encoded HMAC-SHA256) over the raw payload.
    pub fn verify(&self, payload: &[u8], signature: &str) -> Result<()> {
        let secret = self.secret.as_ref().ok_or(GatewayError::SecretMissing)?;

        let expected = hex::decode(signature.trim())
            .map_err(|_| GatewayError::SignatureInvalid)?;

        let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|_| GatewayError::SignatureInvalid)?;
        mac.update(payload);
        // verify_slice is constant-time.
        mac.verify_slice(&expected)
            .map_err(|_| GatewayError::SignatureInvalid)
    }
}
