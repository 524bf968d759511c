//! Webhook HMAC signing utilities.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Prefix of the `X-Webhook-Signature` header value.
pub const SIGNATURE_PREFIX: &str = "sha256=";

/// Compute an HMAC-SHA256 signature over a webhook body.
///
/// `body` must be the exact bytes sent on the wire. Returns lowercase hex.
pub fn compute_webhook_hmac(secret: &str, body: &[u8]) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

/// Format a hex signature as an `X-Webhook-Signature` header value.
pub fn signature_header(signature: &str) -> String {
    format!("{SIGNATURE_PREFIX}{signature}")
}

/// Check a received header value against the expected signature.
pub fn verify_signature_header(secret: &str, body: &[u8], header: &str) -> bool {
    let Some(received) = header.strip_prefix(SIGNATURE_PREFIX) else {
        return false;
    };
    let Ok(received) = hex::decode(received) else {
        return false;
    };
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return false,
    };
    mac.update(body);
    mac.verify_slice(&received).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_vector() {
        let sig = compute_webhook_hmac("key", b"The quick brown fox jumps over the lazy dog");
        assert_eq!(
            sig,
            "f7bc83f430538424b13298e6aa6fb143ef4d59a14946175997479dbc2d1a3cd8"
        );
    }

    #[test]
    fn different_secrets_differ() {
        let body = br#"{"event":"job.completed"}"#;
        assert_ne!(
            compute_webhook_hmac("a", body),
            compute_webhook_hmac("b", body)
        );
    }

    #[test]
    fn header_round_trip() {
        let body = br#"{"event":"job.failed"}"#;
        let header = signature_header(&compute_webhook_hmac("s3cret", body));
        assert!(header.starts_with("sha256="));
        assert!(verify_signature_header("s3cret", body, &header));
        assert!(!verify_signature_header("other", body, &header));
        assert!(!verify_signature_header("s3cret", b"tampered", &header));
    }

    #[test]
    fn malformed_header_is_rejected() {
        assert!(!verify_signature_header("s", b"{}", "md5=abc"));
        assert!(!verify_signature_header("s", b"{}", "sha256=zz"));
    }
}
