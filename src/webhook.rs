// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Webhook signature verification.
//!
//! ## Protocol
//!
//! 1. `x-signature`, `x-timestamp` and the raw body must all be present
//! 2. A webhook secret must be configured
//! 3. The timestamp must be within 300 seconds of now, in either direction
//! 4. `x-signature` must equal `hex(HMAC-SHA256(secret, raw_body))`,
//!    compared in constant time
//! 5. The body is decoded as a JSON object
//!
//! Nothing is retained between calls.

use std::sync::Arc;

use axum::http::HeaderMap;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use tracing::{debug, warn};

use crate::{
    client::VerificationClient,
    clock::{Clock, SystemClock},
    error::{DiditError, Result},
    models::JsonObject,
};

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "x-signature";
pub const TIMESTAMP_HEADER: &str = "x-timestamp";

/// Maximum distance between the sender's timestamp and our clock.
pub const WEBHOOK_TOLERANCE_SECONDS: u64 = 300;

/// One inbound delivery, borrowed from the request that carried it.
#[derive(Debug, Clone, Copy)]
pub struct WebhookEnvelope<'a> {
    pub signature: &'a str,
    pub timestamp: &'a str,
    pub raw_body: &'a [u8],
}

impl<'a> WebhookEnvelope<'a> {
    /// Pull the signature headers out of a request. Lookup is
    /// case-insensitive and takes the first value; absent or non-UTF-8
    /// headers come back empty and fail verification as missing data.
    pub fn from_parts(headers: &'a HeaderMap, raw_body: &'a [u8]) -> Self {
        Self {
            signature: header_str(headers, SIGNATURE_HEADER),
            timestamp: header_str(headers, TIMESTAMP_HEADER),
            raw_body,
        }
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> &'a str {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
}

/// Verifies DiDiT webhook deliveries against a shared secret.
#[derive(Clone)]
pub struct WebhookVerifier {
    secret: Option<String>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for WebhookVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookVerifier")
            .field("secret", &self.secret.as_ref().map(|_| "<redacted>"))
            .field("clock", &self.clock)
            .finish()
    }
}

impl WebhookVerifier {
    pub fn new(secret: Option<String>, clock: Arc<dyn Clock>) -> Self {
        Self { secret, clock }
    }

    /// Verifier on the wall clock.
    pub fn with_secret(secret: impl Into<String>) -> Self {
        Self::new(Some(secret.into()), Arc::new(SystemClock))
    }

    /// Run the full check and decode the payload.
    pub fn verify(&self, envelope: WebhookEnvelope<'_>) -> Result<JsonObject> {
        if envelope.signature.is_empty()
            || envelope.timestamp.is_empty()
            || envelope.raw_body.is_empty()
        {
            return Err(DiditError::Validation(
                "Missing required webhook verification data".to_string(),
            ));
        }

        let secret = self.secret.as_deref().filter(|s| !s.is_empty()).ok_or_else(|| {
            DiditError::Config("webhook_secret is required for webhook verification".to_string())
        })?;

        let sent_at: i64 = envelope
            .timestamp
            .trim()
            .parse()
            .map_err(|_| DiditError::Validation("Request timestamp is invalid".to_string()))?;
        if self.clock.now().abs_diff(sent_at) > WEBHOOK_TOLERANCE_SECONDS {
            warn!(sent_at, "Rejected stale webhook");
            return Err(DiditError::Validation("Request timestamp is stale".to_string()));
        }

        let expected = sign_payload(secret, envelope.raw_body)?;
        let signature_ok: bool = expected
            .as_bytes()
            .ct_eq(envelope.signature.as_bytes())
            .into();
        if !signature_ok {
            warn!("Rejected webhook with invalid signature");
            return Err(DiditError::Validation("Invalid webhook signature".to_string()));
        }

        serde_json::from_slice(envelope.raw_body)
            .map_err(|e| DiditError::decode("webhook payload", e))
    }
}

/// Lowercase hex HMAC-SHA256 of `payload` under `secret`.
pub fn sign_payload(secret: &str, payload: &[u8]) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| DiditError::Config(format!("invalid webhook secret: {e}")))?;
    mac.update(payload);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

impl VerificationClient {
    /// Verify a delivery given its signature headers and raw body.
    pub fn verify_webhook_signature(
        &self,
        signature: &str,
        timestamp: &str,
        raw_body: &[u8],
    ) -> Result<JsonObject> {
        self.webhooks().verify(WebhookEnvelope {
            signature,
            timestamp,
            raw_body,
        })
    }

    /// Verify an inbound webhook request and return its decoded payload.
    pub fn process_webhook(&self, headers: &HeaderMap, body: &[u8]) -> Result<JsonObject> {
        if body.is_empty() {
            return Err(DiditError::Validation("Request content is empty".to_string()));
        }

        let payload = self
            .webhooks()
            .verify(WebhookEnvelope::from_parts(headers, body))?;

        if self.config().debug {
            debug!(
                target: "didit",
                payload = %serde_json::Value::Object(payload.clone()),
                "Webhook verified and processed"
            );
        }

        Ok(payload)
    }
}

#[cfg(test)]
mod tests {
    use axum::http::{HeaderName, HeaderValue};
    use serde_json::json;

    use super::*;
    use crate::{clock::ManualClock, config::ClientConfig};

    const NOW: i64 = 1_704_110_400;
    const SECRET: &str = "test-webhook-secret";

    fn payload() -> Vec<u8> {
        serde_json::to_vec(&json!({
            "event": "verification.completed",
            "session_id": "test-session-id",
            "status": "approved"
        }))
        .unwrap()
    }

    fn verifier() -> WebhookVerifier {
        WebhookVerifier::new(Some(SECRET.to_string()), Arc::new(ManualClock::new(NOW)))
    }

    fn envelope<'a>(signature: &'a str, timestamp: &'a str, body: &'a [u8]) -> WebhookEnvelope<'a> {
        WebhookEnvelope {
            signature,
            timestamp,
            raw_body: body,
        }
    }

    fn client() -> VerificationClient {
        let config = ClientConfig::new("id", "secret").with_webhook_secret(SECRET);
        VerificationClient::new(config)
            .unwrap()
            .with_clock(Arc::new(ManualClock::new(NOW)))
    }

    #[test]
    fn sign_payload_matches_reference_vector() {
        // RFC 4231 test case 2.
        assert_eq!(
            sign_payload("Jefe", b"what do ya want for nothing?").unwrap(),
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn valid_signature_returns_payload() {
        let body = payload();
        let signature = sign_payload(SECRET, &body).unwrap();
        let result = verifier()
            .verify(envelope(&signature, &NOW.to_string(), &body))
            .expect("webhook should verify");

        assert_eq!(result["event"], "verification.completed");
        assert_eq!(result["session_id"], "test-session-id");
        assert_eq!(result["status"], "approved");
    }

    #[test]
    fn payload_survives_verification_structurally() {
        let original = json!({
            "session_id": "s-1",
            "decision": { "kyc": { "status": "Approved", "warnings": [] } },
            "vendor_data": null,
            "created_at": 1_704_110_000
        });
        let body = serde_json::to_vec(&original).unwrap();
        let signature = sign_payload(SECRET, &body).unwrap();

        let decoded = verifier()
            .verify(envelope(&signature, &NOW.to_string(), &body))
            .unwrap();
        assert_eq!(serde_json::Value::Object(decoded), original);
    }

    #[test]
    fn with_secret_checks_freshness_against_the_system_clock() {
        let verifier = WebhookVerifier::with_secret(SECRET);
        let body = payload();
        let signature = sign_payload(SECRET, &body).unwrap();

        let now = SystemClock.now().to_string();
        assert!(verifier.verify(envelope(&signature, &now, &body)).is_ok());

        let err = verifier
            .verify(envelope(&signature, &NOW.to_string(), &body))
            .unwrap_err();
        assert_eq!(err.to_string(), "Request timestamp is stale");
    }

    #[test]
    fn bad_signature_is_rejected() {
        let body = payload();
        let err = verifier()
            .verify(envelope("bad", &NOW.to_string(), &body))
            .unwrap_err();
        assert_eq!(err.to_string(), "Invalid webhook signature");

        let mut flipped = sign_payload(SECRET, &body).unwrap();
        flipped.replace_range(0..1, if flipped.starts_with('0') { "1" } else { "0" });
        let err = verifier()
            .verify(envelope(&flipped, &NOW.to_string(), &body))
            .unwrap_err();
        assert_eq!(err.to_string(), "Invalid webhook signature");
    }

    #[test]
    fn freshness_window_is_inclusive_at_300_seconds() {
        let body = payload();
        let signature = sign_payload(SECRET, &body).unwrap();
        let verifier = verifier();

        for offset in [-300, 0, 300] {
            let ts = (NOW + offset).to_string();
            assert!(verifier.verify(envelope(&signature, &ts, &body)).is_ok(), "offset {offset}");
        }

        for offset in [-301, 301, -3600] {
            let ts = (NOW + offset).to_string();
            let err = verifier.verify(envelope(&signature, &ts, &body)).unwrap_err();
            assert_eq!(err.to_string(), "Request timestamp is stale", "offset {offset}");
        }
    }

    #[test]
    fn non_numeric_timestamp_is_rejected() {
        let body = payload();
        let signature = sign_payload(SECRET, &body).unwrap();
        let err = verifier()
            .verify(envelope(&signature, "yesterday", &body))
            .unwrap_err();
        assert_eq!(err.to_string(), "Request timestamp is invalid");
    }

    #[test]
    fn missing_fields_are_checked_before_the_secret() {
        let body = payload();
        let no_secret = WebhookVerifier::new(None, Arc::new(ManualClock::new(NOW)));

        for (sig, ts, raw) in [("", "1", &body[..]), ("s", "", &body[..]), ("s", "1", &b""[..])] {
            let err = no_secret.verify(envelope(sig, ts, raw)).unwrap_err();
            assert_eq!(err.to_string(), "Missing required webhook verification data");
        }

        let err = no_secret
            .verify(envelope("s", &NOW.to_string(), &body))
            .unwrap_err();
        assert!(matches!(err, DiditError::Config(_)));
    }

    #[test]
    fn malformed_json_with_valid_signature_is_a_decode_error() {
        let body = b"{not json".to_vec();
        let signature = sign_payload(SECRET, &body).unwrap();
        let err = verifier()
            .verify(envelope(&signature, &NOW.to_string(), &body))
            .unwrap_err();
        assert!(matches!(err, DiditError::Decode { .. }));
    }

    #[test]
    fn process_webhook_reads_headers_case_insensitively() {
        let body = payload();
        let mut headers = HeaderMap::new();
        headers.insert(
            HeaderName::from_bytes(b"X-Signature").unwrap(),
            HeaderValue::from_str(&sign_payload(SECRET, &body).unwrap()).unwrap(),
        );
        headers.append(
            HeaderName::from_bytes(b"X-Timestamp").unwrap(),
            HeaderValue::from_str(&NOW.to_string()).unwrap(),
        );
        headers.append(
            HeaderName::from_bytes(b"X-Timestamp").unwrap(),
            HeaderValue::from_static("0"),
        );

        let result = client().process_webhook(&headers, &body).expect("verified");
        assert_eq!(result["session_id"], "test-session-id");
    }

    #[test]
    fn process_webhook_rejects_empty_body_and_missing_headers() {
        let err = client().process_webhook(&HeaderMap::new(), b"").unwrap_err();
        assert_eq!(err.to_string(), "Request content is empty");

        let err = client()
            .process_webhook(&HeaderMap::new(), &payload())
            .unwrap_err();
        assert_eq!(err.to_string(), "Missing required webhook verification data");
    }

    #[test]
    fn client_verify_delegates_to_verifier() {
        let body = payload();
        let signature = sign_payload(SECRET, &body).unwrap();
        let result = client()
            .verify_webhook_signature(&signature, &NOW.to_string(), &body)
            .unwrap();
        assert_eq!(result.len(), 3);
    }
}
