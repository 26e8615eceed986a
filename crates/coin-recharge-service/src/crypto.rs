//! Cryptographic utilities for gateway request signing and callback
//! verification.
//!
//! VNPay signs with HMAC-SHA512; MoMo and ZaloPay sign with HMAC-SHA256. All
//! three send the digest as lowercase hex.

use hmac::{Hmac, Mac};
use sha2::{Sha256, Sha512};

type HmacSha256 = Hmac<Sha256>;
type HmacSha512 = Hmac<Sha512>;

/// Compute HMAC-SHA256 and return hex-encoded result.
///
/// # Panics
///
/// This function will never panic in practice. The `expect` call is guarded by
/// the invariant that HMAC accepts keys of any size per RFC 2104.
#[must_use]
pub fn hmac_sha256_hex(secret: &str, message: &str) -> String {
    // INVARIANT: HMAC accepts keys of any size per RFC 2104, so
    // `new_from_slice` only fails if the Hmac implementation is broken.
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC-SHA256 accepts any key size");
    mac.update(message.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Compute HMAC-SHA512 and return hex-encoded result.
///
/// # Panics
///
/// Never in practice, for the same reason as [`hmac_sha256_hex`].
#[must_use]
pub fn hmac_sha512_hex(secret: &str, message: &str) -> String {
    let mut mac =
        HmacSha512::new_from_slice(secret.as_bytes()).expect("HMAC-SHA512 accepts any key size");
    mac.update(message.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Constant-time string comparison to prevent timing attacks.
///
/// The length check leaks only the length, which for hex digests is public.
#[must_use]
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.bytes().zip(b.bytes()) {
        result |= x ^ y;
    }
    result == 0
}

/// Compare a received hex digest against the expected one, ignoring case.
///
/// VNPay documents uppercase digests in some SDKs and lowercase in others.
#[must_use]
pub fn digest_matches(expected: &str, received: &str) -> bool {
    constant_time_eq(expected, &received.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hmac_sha256_known_vector() {
        // RFC 4231 style check using the well-known "quick brown fox" vector.
        let result = hmac_sha256_hex("key", "The quick brown fox jumps over the lazy dog");
        assert_eq!(
            result,
            "f7bc83f430538424b13298e6aa6fb143ef4d59a14946175997479dbc2d1a3cd8"
        );
    }

    #[test]
    fn hmac_sha512_produces_correct_length() {
        let result = hmac_sha512_hex("secret", "message");
        assert_eq!(result.len(), 128); // SHA512 = 64 bytes = 128 hex chars
        assert_eq!(result, hmac_sha512_hex("secret", "message"));
        assert_ne!(result, hmac_sha512_hex("secret", "message2"));
    }

    #[test]
    fn constant_time_eq_equal_strings() {
        assert!(constant_time_eq("abc", "abc"));
        assert!(constant_time_eq("", ""));
    }

    #[test]
    fn constant_time_eq_different_strings() {
        assert!(!constant_time_eq("abc", "abd"));
        assert!(!constant_time_eq("abc", "ab"));
        assert!(!constant_time_eq("abc", "ABC"));
    }

    #[test]
    fn digest_match_ignores_received_case() {
        let digest = hmac_sha512_hex("k", "m");
        assert!(digest_matches(&digest, &digest.to_ascii_uppercase()));
        assert!(!digest_matches(&digest, "00"));
    }
}
