//! Webhook signature verification.
//!
//! The gateway signs the raw request body with HMAC-SHA256 under a shared
//! secret and sends the hex digest in a header. Verification runs before
//! anything touches the payload; the comparison is constant-time via
//! `Mac::verify_slice`.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("signature header missing")]
    Missing,

    #[error("signature header is not valid hex")]
    Malformed,

    #[error("signature mismatch")]
    Mismatch,
}

pub struct WebhookVerifier {
    secret: Vec<u8>,
}

impl WebhookVerifier {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into().into_bytes(),
        }
    }

    /// Verify `header_value` against the HMAC of the raw body.
    pub fn verify(&self, raw_body: &[u8], header_value: &str) -> Result<(), SignatureError> {
        let provided = hex::decode(header_value.trim()).map_err(|_| SignatureError::Malformed)?;

        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .expect("HMAC accepts keys of any length");
        mac.update(raw_body);
        mac.verify_slice(&provided)
            .map_err(|_| SignatureError::Mismatch)
    }
}

/// Hex HMAC-SHA256 of `body` under `secret`. Counterpart of `verify`,
/// used by tests and local delivery tooling.
pub fn sign(secret: &str, body: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_learngate_test";

    #[test]
    fn test_valid_signature_accepted() {
        let body = br#"{"event":"virtualaccount.credit"}"#;
        let verifier = WebhookVerifier::new(SECRET);
        let signature = sign(SECRET, body);
        assert_eq!(verifier.verify(body, &signature), Ok(()));
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let body = br#"{"event":"virtualaccount.credit"}"#;
        let verifier = WebhookVerifier::new(SECRET);
        let signature = sign("some_other_secret", body);
        assert_eq!(verifier.verify(body, &signature), Err(SignatureError::Mismatch));
    }

    #[test]
    fn test_tampered_body_rejected() {
        let verifier = WebhookVerifier::new(SECRET);
        let signature = sign(SECRET, br#"{"amount":100}"#);
        assert_eq!(
            verifier.verify(br#"{"amount":10000}"#, &signature),
            Err(SignatureError::Mismatch)
        );
    }

    #[test]
    fn test_non_hex_header_is_malformed() {
        let verifier = WebhookVerifier::new(SECRET);
        assert_eq!(
            verifier.verify(b"{}", "not-hex-at-all"),
            Err(SignatureError::Malformed)
        );
    }

    #[test]
    fn test_header_whitespace_tolerated() {
        let body = b"{}";
        let verifier = WebhookVerifier::new(SECRET);
        let signature = format!(" {} ", sign(SECRET, body));
        assert_eq!(verifier.verify(body, &signature), Ok(()));
    }
}
