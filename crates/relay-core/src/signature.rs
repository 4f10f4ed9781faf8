//! HMAC-SHA256 verification of inbound request bodies.
//!
//! The signature is the lowercase hex encoding of `HMAC-SHA256(secret, body)`
//! computed over the exact bytes received. Comparison happens in constant time.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Name of the transport header carrying the signature.
pub const SIGNATURE_HEADER: &str = "lc-svc-sig";

/// Returns `true` when `signature` authenticates `raw_body` under `secret`.
///
/// An empty secret never verifies.
#[must_use]
pub fn verify(raw_body: &[u8], signature: &str, secret: &[u8]) -> bool {
    let Some(expected) = sign(raw_body, secret) else {
        return false;
    };
    let provided = signature.as_bytes();
    expected.len() == provided.len() && bool::from(expected.as_bytes().ct_eq(provided))
}

/// Computes the hex signature of `raw_body`, or `None` for an empty secret.
#[must_use]
pub fn sign(raw_body: &[u8], secret: &[u8]) -> Option<String> {
    if secret.is_empty() {
        return None;
    }
    let mut mac = HmacSha256::new_from_slice(secret).ok()?;
    mac.update(raw_body);
    Some(hex::encode(mac.finalize().into_bytes()))
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use rstest::rstest;

    use super::*;

    const SECRET: &[u8] = b"test-secret";
    const BODY: &[u8] = br#"{"version":1,"etype":"health","data":{}}"#;

    fn signature() -> String {
        sign(BODY, SECRET).expect("non-empty secret signs")
    }

    #[test]
    fn accepts_exact_pair() {
        assert!(verify(BODY, &signature(), SECRET));
    }

    #[test]
    fn signature_is_lowercase_hex() {
        let sig = signature();
        assert_eq!(sig.len(), 64);
        assert!(sig.chars().all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
    }

    #[rstest]
    #[case::empty_secret(BODY, SECRET, b"")]
    #[case::wrong_secret(BODY, SECRET, b"other-secret")]
    #[case::different_body(b"{}", SECRET, SECRET)]
    fn rejects_mismatches(#[case] body: &[u8], #[case] signed_with: &[u8], #[case] secret: &[u8]) {
        let sig = sign(BODY, signed_with).expect("signing secret is non-empty");
        assert!(!verify(body, &sig, secret));
    }

    #[rstest]
    #[case::empty("")]
    #[case::truncated("abcdef")]
    #[case::uppercase_variant("ZZ")]
    fn rejects_malformed_signatures(#[case] sig: &str) {
        assert!(!verify(BODY, sig, SECRET));
    }

    #[test]
    fn rejects_uppercase_rendering_of_valid_signature() {
        let upper = signature().to_ascii_uppercase();
        assert!(!verify(BODY, &upper, SECRET));
    }

    proptest! {
        #[test]
        fn any_body_bit_flip_fails(index in 0..BODY.len(), bit in 0u8..8) {
            let sig = signature();
            let mut body = BODY.to_vec();
            if let Some(byte) = body.get_mut(index) {
                *byte ^= 1 << bit;
            }
            prop_assert!(!verify(&body, &sig, SECRET));
        }

        #[test]
        fn any_signature_bit_flip_fails(index in 0usize..64, bit in 0u8..8) {
            let mut sig = signature().into_bytes();
            if let Some(byte) = sig.get_mut(index) {
                *byte ^= 1 << bit;
            }
            let mutated = String::from_utf8_lossy(&sig);
            prop_assert!(!verify(BODY, &mutated, SECRET));
        }
    }
}
