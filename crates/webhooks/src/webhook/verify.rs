//! Webhook signature verification.
//!
//! The signature header has the form `t=<unix seconds>,v1=<hex>[,v1=<hex>...]`
//! where each `v1` is `HMAC-SHA256(secret, "{t}.{raw body}")`. Several `v1`
//! values appear while a secret is being rotated; any match is accepted.

use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;

use dropline_core::ReceivedEvent;

use super::VerifyError;
use super::stripe::parse_event;

type HmacSha256 = Hmac<Sha256>;

/// Name of the signature header.
pub const SIGNATURE_HEADER: &str = "stripe-signature";

/// Accepted clock skew for timestamps from the future.
const FUTURE_SKEW_SECS: i64 = 60;

/// Verifies raw webhook payloads and parses them into typed events.
#[derive(Clone)]
pub struct SignatureVerifier {
    secret: Option<SecretString>,
    tolerance_secs: i64,
}

impl std::fmt::Debug for SignatureVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignatureVerifier")
            .field("signed", &self.secret.is_some())
            .field("tolerance_secs", &self.tolerance_secs)
            .finish()
    }
}

impl SignatureVerifier {
    /// Create a verifier. `None` disables authentication (non-production only).
    #[must_use]
    pub const fn new(secret: Option<SecretString>, tolerance_secs: i64) -> Self {
        Self {
            secret,
            tolerance_secs,
        }
    }

    /// Whether payloads are authenticated.
    #[must_use]
    pub const fn is_signed(&self) -> bool {
        self.secret.is_some()
    }

    /// Verify `payload` against the signature header and parse it.
    ///
    /// # Errors
    ///
    /// Returns `VerifyError::AuthenticationFailed` if the signature is missing,
    /// stale or wrong, and `VerifyError::MalformedPayload` if the body is not a
    /// valid event.
    pub fn verify(
        &self,
        payload: &[u8],
        signature: Option<&str>,
    ) -> Result<ReceivedEvent, VerifyError> {
        self.verify_at(payload, signature, chrono::Utc::now().timestamp())
    }

    /// [`verify`](Self::verify) against an explicit clock.
    ///
    /// # Errors
    ///
    /// See [`verify`](Self::verify).
    pub fn verify_at(
        &self,
        payload: &[u8],
        signature: Option<&str>,
        now: i64,
    ) -> Result<ReceivedEvent, VerifyError> {
        match &self.secret {
            Some(secret) => {
                let header = signature.ok_or_else(|| {
                    VerifyError::AuthenticationFailed("missing signature header".to_string())
                })?;
                check_signature(
                    secret.expose_secret().as_bytes(),
                    payload,
                    header,
                    now,
                    self.tolerance_secs,
                )?;
            }
            None => {
                tracing::warn!("Webhook signing secret not configured; accepting unsigned payload");
            }
        }

        parse_event(payload)
    }
}

fn new_mac(secret: &[u8]) -> Result<HmacSha256, VerifyError> {
    HmacSha256::new_from_slice(secret)
        .map_err(|e| VerifyError::AuthenticationFailed(format!("invalid signing secret: {e}")))
}

fn check_signature(
    secret: &[u8],
    payload: &[u8],
    header: &str,
    now: i64,
    tolerance_secs: i64,
) -> Result<(), VerifyError> {
    let mut timestamp = None;
    let mut candidates = Vec::new();

    for part in header.split(',') {
        let part = part.trim();
        if let Some(t) = part.strip_prefix("t=") {
            timestamp = Some(t);
        } else if let Some(sig) = part.strip_prefix("v1=") {
            candidates.push(sig);
        }
    }

    let timestamp_str = timestamp.ok_or_else(|| {
        VerifyError::AuthenticationFailed("signature header has no timestamp".to_string())
    })?;
    if candidates.is_empty() {
        return Err(VerifyError::AuthenticationFailed(
            "signature header has no v1 signature".to_string(),
        ));
    }

    let timestamp: i64 = timestamp_str.parse().map_err(|_| {
        VerifyError::AuthenticationFailed("invalid timestamp in signature header".to_string())
    })?;

    let Some(age) = now.checked_sub(timestamp) else {
        tracing::warn!(timestamp, "Webhook rejected: timestamp out of range");
        return Err(VerifyError::AuthenticationFailed(
            "timestamp outside tolerance".to_string(),
        ));
    };
    if age > tolerance_secs {
        tracing::warn!(age, tolerance_secs, "Webhook rejected: timestamp too old");
        return Err(VerifyError::AuthenticationFailed(
            "timestamp outside tolerance".to_string(),
        ));
    }
    if age < -FUTURE_SKEW_SECS {
        tracing::warn!(age, "Webhook rejected: timestamp in the future");
        return Err(VerifyError::AuthenticationFailed(
            "timestamp outside tolerance".to_string(),
        ));
    }

    let mut mac = new_mac(secret)?;
    mac.update(timestamp_str.as_bytes());
    mac.update(b".");
    mac.update(payload);

    // verify_slice compares in constant time.
    let matched = candidates
        .iter()
        .filter_map(|sig| hex::decode(sig).ok())
        .any(|bytes| mac.clone().verify_slice(&bytes).is_ok());

    if matched {
        Ok(())
    } else {
        Err(VerifyError::AuthenticationFailed(
            "signature mismatch".to_string(),
        ))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use dropline_core::PaymentEvent;

    use super::*;

    const SECRET: &str = "whsec_test_9fK2mQ7xLp4TzR8v";
    const NOW: i64 = 1_760_000_000;
    const BODY: &[u8] = br#"{"id":"evt_1","type":"invoice.paid","data":{"object":{}}}"#;

    fn signature_header(secret: &str, timestamp: i64, payload: &[u8]) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(format!("{timestamp}.").as_bytes());
        mac.update(payload);
        format!("t={timestamp},v1={}", hex::encode(mac.finalize().into_bytes()))
    }

    fn verifier() -> SignatureVerifier {
        SignatureVerifier::new(Some(SecretString::from(SECRET)), 300)
    }

    #[test]
    fn test_valid_signature_accepted() {
        let header = signature_header(SECRET, NOW, BODY);
        let event = verifier().verify_at(BODY, Some(&header), NOW).unwrap();
        assert_eq!(event.id, "evt_1");
        assert!(matches!(event.event, PaymentEvent::Unknown { .. }));
    }

    #[test]
    fn test_tampered_body_rejected() {
        let header = signature_header(SECRET, NOW, BODY);
        let tampered = br#"{"id":"evt_2","type":"invoice.paid","data":{"object":{}}}"#;
        let result = verifier().verify_at(tampered, Some(&header), NOW);
        assert!(matches!(result, Err(VerifyError::AuthenticationFailed(_))));
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let header = signature_header("whsec_other_Q8s7Ld2", NOW, BODY);
        let result = verifier().verify_at(BODY, Some(&header), NOW);
        assert!(matches!(result, Err(VerifyError::AuthenticationFailed(_))));
    }

    #[test]
    fn test_missing_header_rejected() {
        let result = verifier().verify_at(BODY, None, NOW);
        assert!(matches!(result, Err(VerifyError::AuthenticationFailed(_))));
    }

    #[test]
    fn test_header_without_signature_rejected() {
        let result = verifier().verify_at(BODY, Some("t=1760000000"), NOW);
        assert!(matches!(result, Err(VerifyError::AuthenticationFailed(_))));
    }

    #[test]
    fn test_old_timestamp_rejected() {
        let header = signature_header(SECRET, NOW - 301, BODY);
        let result = verifier().verify_at(BODY, Some(&header), NOW);
        assert!(matches!(result, Err(VerifyError::AuthenticationFailed(_))));
    }

    #[test]
    fn test_future_timestamp_within_skew_accepted() {
        let header = signature_header(SECRET, NOW + 30, BODY);
        assert!(verifier().verify_at(BODY, Some(&header), NOW).is_ok());

        let header = signature_header(SECRET, NOW + 120, BODY);
        assert!(verifier().verify_at(BODY, Some(&header), NOW).is_err());
    }

    #[test]
    fn test_extreme_timestamps_rejected() {
        let sig = "ab".repeat(32);
        for timestamp in [i64::MIN, i64::MAX] {
            let header = format!("t={timestamp},v1={sig}");
            let result = verifier().verify_at(BODY, Some(&header), NOW);
            assert_eq!(
                result.unwrap_err(),
                VerifyError::AuthenticationFailed("timestamp outside tolerance".to_string())
            );
        }
    }

    #[test]
    fn test_rotated_secret_any_v1_matches() {
        let good = signature_header(SECRET, NOW, BODY);
        let good_sig = good.split("v1=").nth(1).unwrap();
        let header = format!("t={NOW},v1={},v1={good_sig}", "ab".repeat(32));
        assert!(verifier().verify_at(BODY, Some(&header), NOW).is_ok());
    }

    #[test]
    fn test_non_hex_signature_rejected() {
        let header = format!("t={NOW},v1=not-hex");
        let result = verifier().verify_at(BODY, Some(&header), NOW);
        assert!(matches!(result, Err(VerifyError::AuthenticationFailed(_))));
    }

    #[test]
    fn test_valid_signature_malformed_json() {
        let body = b"{not json";
        let header = signature_header(SECRET, NOW, body);
        let result = verifier().verify_at(body, Some(&header), NOW);
        assert!(matches!(result, Err(VerifyError::MalformedPayload(_))));
    }

    #[test]
    fn test_unsigned_mode_parses_directly() {
        let verifier = SignatureVerifier::new(None, 300);
        assert!(!verifier.is_signed());
        let event = verifier.verify_at(BODY, None, NOW).unwrap();
        assert_eq!(event.id, "evt_1");
    }

    #[test]
    fn test_debug_hides_secret() {
        assert!(!format!("{:?}", verifier()).contains(SECRET));
    }
}
