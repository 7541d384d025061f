use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "X-Webhook-Signature";
pub const TIMESTAMP_HEADER: &str = "X-Webhook-Timestamp";
pub const EVENT_HEADER: &str = "X-Webhook-Event";
pub const REQUEST_ID_HEADER: &str = "X-Request-Id";

/// Hex-encoded HMAC-SHA256 of `payload` keyed with `secret`.
///
/// The digest covers exactly the bytes that go on the wire and nothing else,
/// so a receiver can recompute it from the raw request body.
pub fn sign(payload: &[u8], secret: &str) -> String {
    let mut mac = new_mac(secret);
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

/// Constant-time check of a hex digest produced by [`sign`].
pub fn verify(payload: &[u8], secret: &str, signature: &str) -> bool {
    let Ok(expected) = hex::decode(signature) else {
        return false;
    };

    let mut mac = new_mac(secret);
    mac.update(payload);
    mac.verify_slice(&expected).is_ok()
}

fn new_mac(secret: &str) -> HmacSha256 {
    match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => unreachable!("HMAC accepts keys of any length"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAYLOAD: &[u8] = br#"{"event":"message.sent","messageId":42,"status":"sent"}"#;

    #[test]
    fn test_signature_is_deterministic() {
        assert_eq!(sign(PAYLOAD, "secret"), sign(PAYLOAD, "secret"));
    }

    #[test]
    fn test_signature_changes_with_payload() {
        let other = br#"{"event":"message.sent","messageId":43,"status":"sent"}"#;
        assert_ne!(sign(PAYLOAD, "secret"), sign(other, "secret"));
    }

    #[test]
    fn test_signature_changes_with_secret() {
        assert_ne!(sign(PAYLOAD, "secret-a"), sign(PAYLOAD, "secret-b"));
    }

    #[test]
    fn test_known_vector() {
        // RFC 4231 test case 2
        let signature = sign(b"what do ya want for nothing?", "Jefe");
        assert_eq!(
            signature,
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn test_signature_is_lowercase_hex() {
        let signature = sign(PAYLOAD, "secret");

        assert_eq!(signature.len(), 64);
        assert!(
            signature
                .chars()
                .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
        );
    }

    #[test]
    fn test_verify() {
        let signature = sign(PAYLOAD, "secret");

        assert!(verify(PAYLOAD, "secret", &signature));
        assert!(!verify(PAYLOAD, "other", &signature));
        assert!(!verify(b"tampered", "secret", &signature));
        assert!(!verify(PAYLOAD, "secret", "not-hex"));
    }

    #[test]
    fn test_empty_secret_still_signs() {
        assert_eq!(sign(PAYLOAD, "").len(), 64);
    }
}
