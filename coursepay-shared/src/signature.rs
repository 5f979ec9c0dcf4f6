/// Webhook signature verification
///
/// Mercado Pago signs each notification with HMAC-SHA256 over a manifest
/// built from the payment id, the delivery's `x-request-id` header and a
/// timestamp:
///
/// ```text
/// x-signature: ts=1704908010,v1=618c85345248dd820d5fd456117c2ab2ef8eda45a0282ff693eac24131a5e839
/// manifest:    id:<data.id>;request-id:<x-request-id>;ts:<ts>;
/// ```
///
/// Parts whose value is absent are left out of the manifest. Alphanumeric
/// ids are lower-cased before signing.
///
/// `ts` must fall within the verifier's tolerance of the current time, so a
/// captured delivery cannot be replayed indefinitely. The gateway sends it
/// in seconds or milliseconds; both are accepted.
///
/// Verification proves the delivery came from the gateway. It does not make
/// the body trustworthy for status; the reconciler still re-fetches.

use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::time::Duration;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Default accepted clock distance for `ts`
pub const DEFAULT_TOLERANCE: Duration = Duration::from_secs(300);

// Timestamps above this are milliseconds (1e11 s is the year 5138)
const MILLIS_THRESHOLD: i64 = 100_000_000_000;

/// Signature errors (all map to 401)
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    /// No `x-signature` header
    #[error("Missing x-signature header")]
    MissingHeader,

    /// Header present but not `ts=..,v1=..`
    #[error("Malformed x-signature header")]
    Malformed,

    /// Digest does not match
    #[error("Webhook signature mismatch")]
    Mismatch,

    /// `ts` is outside the tolerance window
    #[error("Webhook signature timestamp outside tolerance")]
    Stale,

    /// The body names a different payment than the signed query id
    #[error("Webhook body id does not match the signed id")]
    IdMismatch,

    /// The secret was refused as an HMAC key
    #[error("Webhook secret is not a usable HMAC key")]
    InvalidKey,
}

/// Verifies `x-signature` headers with a shared secret
#[derive(Clone)]
pub struct SignatureVerifier {
    secret: String,
    tolerance: Duration,
}

impl std::fmt::Debug for SignatureVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignatureVerifier").finish_non_exhaustive()
    }
}

struct ParsedHeader<'a> {
    ts: &'a str,
    v1: &'a str,
}

fn parse_header(header: &str) -> Result<ParsedHeader<'_>, SignatureError> {
    let mut ts = None;
    let mut v1 = None;

    for part in header.split(',') {
        let Some((key, value)) = part.split_once('=') else {
            continue;
        };
        match key.trim() {
            "ts" => ts = Some(value.trim()),
            "v1" => v1 = Some(value.trim()),
            _ => {}
        }
    }

    match (ts, v1) {
        (Some(ts), Some(v1)) if !ts.is_empty() && !v1.is_empty() => Ok(ParsedHeader { ts, v1 }),
        _ => Err(SignatureError::Malformed),
    }
}

fn manifest(data_id: Option<&str>, request_id: Option<&str>, ts: &str) -> String {
    let mut manifest = String::new();
    if let Some(id) = data_id.filter(|id| !id.is_empty()) {
        let id = if id.chars().all(|c| c.is_ascii_alphanumeric()) {
            id.to_ascii_lowercase()
        } else {
            id.to_string()
        };
        manifest.push_str(&format!("id:{id};"));
    }
    if let Some(request_id) = request_id.filter(|r| !r.is_empty()) {
        manifest.push_str(&format!("request-id:{request_id};"));
    }
    manifest.push_str(&format!("ts:{ts};"));
    manifest
}

impl SignatureVerifier {
    /// Creates a verifier for the given webhook secret
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            tolerance: DEFAULT_TOLERANCE,
        }
    }

    /// Sets the accepted clock distance for `ts`
    pub fn with_tolerance(mut self, tolerance: Duration) -> Self {
        self.tolerance = tolerance;
        self
    }

    fn mac(&self, manifest: &str) -> Result<HmacSha256, SignatureError> {
        let mut mac =
            HmacSha256::new_from_slice(self.secret.as_bytes()).map_err(|_| SignatureError::InvalidKey)?;
        mac.update(manifest.as_bytes());
        Ok(mac)
    }

    /// Produces the hex `v1` digest for a manifest
    pub fn sign(&self, data_id: Option<&str>, request_id: Option<&str>, ts: &str) -> Result<String, SignatureError> {
        Ok(hex::encode(self.mac(&manifest(data_id, request_id, ts))?.finalize().into_bytes()))
    }

    /// Checks an `x-signature` header against the delivery, at the current time
    pub fn verify(
        &self,
        signature: Option<&str>,
        request_id: Option<&str>,
        data_id: Option<&str>,
    ) -> Result<(), SignatureError> {
        self.verify_at(signature, request_id, data_id, Utc::now().timestamp())
    }

    /// Checks an `x-signature` header against the delivery, at `now` (unix seconds)
    pub fn verify_at(
        &self,
        signature: Option<&str>,
        request_id: Option<&str>,
        data_id: Option<&str>,
        now: i64,
    ) -> Result<(), SignatureError> {
        let header = parse_header(signature.ok_or(SignatureError::MissingHeader)?)?;
        let expected = hex::decode(header.v1).map_err(|_| SignatureError::Malformed)?;

        self.mac(&manifest(data_id, request_id, header.ts))?
            .verify_slice(&expected)
            .map_err(|_| SignatureError::Mismatch)?;

        let ts: i64 = header.ts.parse().map_err(|_| SignatureError::Malformed)?;
        let ts_secs = if ts >= MILLIS_THRESHOLD { ts / 1000 } else { ts };
        let tolerance = i64::try_from(self.tolerance.as_secs()).unwrap_or(i64::MAX);
        if now.saturating_sub(ts_secs).saturating_abs() > tolerance {
            return Err(SignatureError::Stale);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: i64 = 1_700_000_000;

    fn signed_header(verifier: &SignatureVerifier, id: Option<&str>, request_id: Option<&str>, ts: &str) -> String {
        format!("ts={ts},v1={}", verifier.sign(id, request_id, ts).unwrap())
    }

    #[test]
    fn test_manifest_layout() {
        assert_eq!(
            manifest(Some("123"), Some("req-1"), "1700000000"),
            "id:123;request-id:req-1;ts:1700000000;"
        );
        assert_eq!(manifest(None, None, "1"), "ts:1;");
        assert_eq!(manifest(Some("ABC1"), None, "1"), "id:abc1;ts:1;");
    }

    #[test]
    fn test_round_trip_accepts() {
        let verifier = SignatureVerifier::new("secret");
        let header = signed_header(&verifier, Some("123"), Some("req-1"), "1700000000");

        assert_eq!(
            verifier.verify_at(Some(&header), Some("req-1"), Some("123"), NOW + 10),
            Ok(())
        );
    }

    #[test]
    fn test_tampered_id_is_rejected() {
        let verifier = SignatureVerifier::new("secret");
        let header = signed_header(&verifier, Some("123"), Some("req-1"), "1700000000");

        assert_eq!(
            verifier.verify_at(Some(&header), Some("req-1"), Some("999"), NOW),
            Err(SignatureError::Mismatch)
        );
    }

    #[test]
    fn test_wrong_secret_is_rejected() {
        let header = signed_header(&SignatureVerifier::new("other"), Some("1"), None, "1700000000");

        assert_eq!(
            SignatureVerifier::new("secret").verify_at(Some(&header), None, Some("1"), NOW),
            Err(SignatureError::Mismatch)
        );
    }

    #[test]
    fn test_timestamp_outside_tolerance_is_stale() {
        let verifier = SignatureVerifier::new("secret").with_tolerance(Duration::from_secs(60));
        let header = signed_header(&verifier, Some("1"), None, "1700000000");

        assert_eq!(verifier.verify_at(Some(&header), None, Some("1"), NOW + 60), Ok(()));
        assert_eq!(
            verifier.verify_at(Some(&header), None, Some("1"), NOW + 61),
            Err(SignatureError::Stale)
        );
        assert_eq!(
            verifier.verify_at(Some(&header), None, Some("1"), NOW - 61),
            Err(SignatureError::Stale)
        );
    }

    #[test]
    fn test_millisecond_timestamps() {
        let verifier = SignatureVerifier::new("secret");
        let header = signed_header(&verifier, Some("1"), None, "1700000000123");

        assert_eq!(verifier.verify_at(Some(&header), None, Some("1"), NOW), Ok(()));
        assert_eq!(
            verifier.verify_at(Some(&header), None, Some("1"), NOW + 3600),
            Err(SignatureError::Stale)
        );
    }

    #[test]
    fn test_header_errors() {
        let verifier = SignatureVerifier::new("secret");
        assert_eq!(
            verifier.verify_at(None, None, Some("1"), NOW),
            Err(SignatureError::MissingHeader)
        );
        assert_eq!(
            verifier.verify_at(Some("v1=abcd"), None, Some("1"), NOW),
            Err(SignatureError::Malformed)
        );
        assert_eq!(
            verifier.verify_at(Some("ts=1,v1=zz"), None, Some("1"), NOW),
            Err(SignatureError::Malformed)
        );
    }

    #[test]
    fn test_debug_hides_secret() {
        let debug = format!("{:?}", SignatureVerifier::new("very-secret"));
        assert!(!debug.contains("very-secret"));
    }
}
