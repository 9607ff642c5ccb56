//! Signed command verification.
//!
//! Signature scheme: `v0=` + hex(HMAC-SHA256(secret, "v0:{timestamp}:{body}")).

use chrono::{DateTime, Utc};
use ephemera_core::{AppError, AppResult};
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

const SIGNATURE_VERSION: &str = "v0";

/// Maximum allowed distance between the signed timestamp and now.
pub const FRESHNESS_WINDOW_SECONDS: i64 = 300;

/// Signature-related header values extracted from an inbound request.
#[derive(Debug, Clone, Copy, Default)]
pub struct SignatureHeaders<'a> {
    /// Unix timestamp the sender signed.
    pub timestamp: Option<&'a str>,
    /// Versioned signature, e.g. `v0=ab12...`.
    pub signature: Option<&'a str>,
}

/// Computes the versioned signature for a timestamp and raw body.
pub fn compute_signature(
    secret: &SecretString,
    timestamp: &str,
    raw_body: &str,
) -> AppResult<String> {
    let mut mac = HmacSha256::new_from_slice(secret.expose_secret().as_bytes())
        .map_err(|error| AppError::Internal(format!("invalid signing key: {error}")))?;
    mac.update(format!("{SIGNATURE_VERSION}:{timestamp}:{raw_body}").as_bytes());

    Ok(format!(
        "{SIGNATURE_VERSION}={}",
        hex::encode(mac.finalize().into_bytes())
    ))
}

/// Returns true when the request is fresh and carries a matching signature.
#[must_use]
pub fn verify_request(
    headers: &SignatureHeaders<'_>,
    raw_body: &str,
    secret: &SecretString,
    now: DateTime<Utc>,
) -> bool {
    let (Some(timestamp), Some(signature)) = (headers.timestamp, headers.signature) else {
        return false;
    };

    let Ok(signed_at) = timestamp.trim().parse::<i64>() else {
        return false;
    };

    if now.timestamp().abs_diff(signed_at) > FRESHNESS_WINDOW_SECONDS.unsigned_abs() {
        return false;
    }

    let Ok(expected) = compute_signature(secret, timestamp, raw_body) else {
        return false;
    };

    let expected_bytes = expected.as_bytes();
    let signature_bytes = signature.as_bytes();
    if expected_bytes.len() != signature_bytes.len() {
        return false;
    }

    expected_bytes.ct_eq(signature_bytes).into()
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use proptest::prelude::*;
    use secrecy::SecretString;

    use super::{SignatureHeaders, compute_signature, verify_request};

    const NOW: i64 = 1_700_000_000;
    const BODY: &str = "token=x&text=target%3Adb1+duration%3A30&user_id=U1&user_name=bob";

    fn secret() -> SecretString {
        SecretString::new("8f742231b10e8888abcd99yyyzzz85a5".to_owned())
    }

    fn now() -> chrono::DateTime<Utc> {
        Utc.timestamp_opt(NOW, 0).single().unwrap_or_default()
    }

    fn sign(timestamp: &str, body: &str) -> String {
        compute_signature(&secret(), timestamp, body).unwrap_or_default()
    }

    #[test]
    fn signature_uses_versioned_hex_digest() {
        let signature = sign("1", "");
        assert!(signature.starts_with("v0="));
        assert_eq!(signature.len(), 3 + 64);
    }

    #[test]
    fn matching_signature_is_accepted() {
        let timestamp = NOW.to_string();
        let signature = sign(timestamp.as_str(), BODY);
        let headers = SignatureHeaders {
            timestamp: Some(timestamp.as_str()),
            signature: Some(signature.as_str()),
        };
        assert!(verify_request(&headers, BODY, &secret(), now()));
    }

    #[test]
    fn tampered_body_is_rejected() {
        let timestamp = NOW.to_string();
        let signature = sign(timestamp.as_str(), BODY);
        let headers = SignatureHeaders {
            timestamp: Some(timestamp.as_str()),
            signature: Some(signature.as_str()),
        };
        assert!(!verify_request(
            &headers,
            "text=target%3Adb2",
            &secret(),
            now()
        ));
    }

    #[test]
    fn stale_request_is_rejected_even_with_valid_signature() {
        let timestamp = (NOW - 301).to_string();
        let signature = sign(timestamp.as_str(), BODY);
        let headers = SignatureHeaders {
            timestamp: Some(timestamp.as_str()),
            signature: Some(signature.as_str()),
        };
        assert!(!verify_request(&headers, BODY, &secret(), now()));
    }

    #[test]
    fn request_at_window_edge_is_accepted() {
        let timestamp = (NOW + 300).to_string();
        let signature = sign(timestamp.as_str(), BODY);
        let headers = SignatureHeaders {
            timestamp: Some(timestamp.as_str()),
            signature: Some(signature.as_str()),
        };
        assert!(verify_request(&headers, BODY, &secret(), now()));
    }

    #[test]
    fn missing_or_malformed_headers_are_rejected() {
        let signature = sign("abc", BODY);
        assert!(!verify_request(
            &SignatureHeaders::default(),
            BODY,
            &secret(),
            now()
        ));
        assert!(!verify_request(
            &SignatureHeaders {
                timestamp: Some("abc"),
                signature: Some(signature.as_str()),
            },
            BODY,
            &secret(),
            now()
        ));
    }

    proptest! {
        #[test]
        fn verification_succeeds_iff_signature_matches(
            body in "[ -~]{0,64}",
            offset in -300_i64..=300,
            corrupt_index in 3_usize..67,
        ) {
            let timestamp = (NOW + offset).to_string();
            let signature = sign(timestamp.as_str(), body.as_str());
            let headers = SignatureHeaders {
                timestamp: Some(timestamp.as_str()),
                signature: Some(signature.as_str()),
            };
            prop_assert!(verify_request(&headers, body.as_str(), &secret(), now()));

            let mut corrupted = signature.clone().into_bytes();
            corrupted[corrupt_index] = if corrupted[corrupt_index] == b'0' { b'1' } else { b'0' };
            let corrupted = String::from_utf8(corrupted).unwrap_or_default();
            let headers = SignatureHeaders {
                timestamp: Some(timestamp.as_str()),
                signature: Some(corrupted.as_str()),
            };
            prop_assert!(!verify_request(&headers, body.as_str(), &secret(), now()));
        }
    }
}
