//! Canonical payload construction.
//!
//! A request is validated, resolved against the tier lattice and turned into
//! a `LicensePayload`, which serializes to compact camelCase JSON. The bytes
//! depend only on field values: struct fields serialize in declaration order
//! and every map is a `BTreeMap`, so the same payload always yields the same
//! bytes and a signature over them can be re-checked anywhere.

use crate::clock::Clock;
use crate::errors::ValidationErrors;
use crate::policy::{tiers, validation};
use crate::protocol::models::{LicensePayload, LicenseRequest};
use crate::KeywardenError;
use base64::{engine::general_purpose::STANDARD, Engine};
use uuid::Uuid;

/// Canonical payload bytes and their base64 transport form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalPayload {
    /// UTF-8 JSON bytes that get signed.
    pub bytes: Vec<u8>,
    /// Standard base64 of `bytes`, as embedded in the envelope.
    pub encoded: String,
}

/// Build a payload from a request.
///
/// # Errors
/// Every violated request rule, itemized.
pub fn build_payload(request: &LicenseRequest, clock: &dyn Clock) -> Result<LicensePayload, ValidationErrors> {
    let now = clock.now_utc();
    let features = tiers::resolve_features(request.tier, &request.features);

    let issues = validation::validate_request(request, &features, now);
    if !issues.is_empty() {
        return Err(ValidationErrors::new(issues));
    }

    let defaults = tiers::default_limits(request.tier);
    // Custom tier limits are guaranteed present by validation.
    let max_api_calls_per_month = request
        .max_api_calls_per_month
        .or(defaults.map(|d| d.max_api_calls_per_month))
        .unwrap_or_default();
    let max_concurrent_connections = request
        .max_concurrent_connections
        .or(defaults.map(|d| d.max_concurrent_connections))
        .unwrap_or_default();

    let licensee = &request.licensee;
    Ok(LicensePayload {
        license_id: request.license_id.unwrap_or_else(Uuid::new_v4),
        licensed_to: licensee.organization.trim().to_string(),
        contact_person: licensee.contact_person.trim().to_string(),
        contact_email: licensee.contact_email.trim().to_string(),
        secondary_contact_person: non_blank(licensee.secondary_contact_person.as_deref()),
        secondary_contact_email: non_blank(licensee.secondary_contact_email.as_deref()),
        valid_from: request.valid_from,
        valid_to: request.valid_to,
        tier: request.tier,
        max_api_calls_per_month,
        max_concurrent_connections,
        features_included: features,
        issued_at: now,
        metadata: request.metadata.clone(),
    })
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Serialize a payload to its canonical bytes.
pub fn encode_payload(payload: &LicensePayload) -> Result<CanonicalPayload, KeywardenError> {
    let bytes = serde_json::to_vec(payload)
        .map_err(|e| KeywardenError::SigningFailed(format!("Failed to serialize payload: {}", e)))?;
    let encoded = STANDARD.encode(&bytes);
    Ok(CanonicalPayload { bytes, encoded })
}

/// Parse canonical bytes back into a payload.
pub fn decode_payload(bytes: &[u8]) -> Result<LicensePayload, KeywardenError> {
    serde_json::from_slice(bytes)
        .map_err(|e| KeywardenError::MalformedEnvelope(format!("Unreadable license payload: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::MockClock;
    use crate::protocol::models::{LicenseFeature, LicenseTier, Licensee};
    use chrono::{TimeZone, Utc};

    fn clock() -> MockClock {
        MockClock::from_rfc3339("2025-01-01T00:00:00Z")
    }

    fn request() -> LicenseRequest {
        LicenseRequest::new(
            Licensee::new("Acme Corp", "Wile E. Coyote", "wile@acme.test"),
            Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
            LicenseTier::Professional,
        )
        .with_license_id(Uuid::parse_str("2f1c7c4e-5d1b-4c8e-9a57-3f0a9f2d6b11").unwrap())
        .with_metadata("region", "eu-west")
        .with_metadata("crm", "ACME-42")
    }

    #[test]
    fn test_builds_professional_defaults() {
        let payload = build_payload(&request(), &clock()).unwrap();
        assert_eq!(payload.tier, LicenseTier::Professional);
        assert_eq!(payload.max_api_calls_per_month, 100_000);
        assert_eq!(payload.max_concurrent_connections, 100);
        assert!(payload.has_feature("BasicApiGateway"));
        assert!(payload.has_feature("LoadBalancing"));
        assert!(!payload.has_feature("SingleSignOn"));
        assert_eq!(payload.issued_at, clock().now_utc());
    }

    #[test]
    fn test_explicit_limits_win() {
        let payload = build_payload(&request().with_limits(5, 2), &clock()).unwrap();
        assert_eq!(payload.max_api_calls_per_month, 5);
        assert_eq!(payload.max_concurrent_connections, 2);
    }

    #[test]
    fn test_custom_tier_uses_exact_features() {
        let mut req = request().with_limits(1_000, 5);
        req.tier = LicenseTier::Custom;
        req.features = vec![LicenseFeature::new("LoadBalancing", "", LicenseTier::Professional)];

        let payload = build_payload(&req, &clock()).unwrap();
        assert_eq!(payload.features_included.len(), 1);
        assert!(!payload.has_feature("BasicApiGateway"));
    }

    #[test]
    fn test_invalid_request_is_itemized() {
        let mut req = request();
        req.licensee.organization = String::new();
        req.valid_to = req.valid_from;

        let errors = build_payload(&req, &clock()).unwrap_err();
        assert_eq!(errors.len(), 2);
        assert!(errors.has_rule("required"));
        assert!(errors.has_rule("window.order"));
    }

    #[test]
    fn test_encoding_is_deterministic() {
        let payload = build_payload(&request(), &clock()).unwrap();
        let first = encode_payload(&payload).unwrap();
        let second = encode_payload(&payload.clone()).unwrap();
        assert_eq!(first, second);

        let rebuilt = build_payload(&request(), &clock()).unwrap();
        assert_eq!(encode_payload(&rebuilt).unwrap().bytes, first.bytes);
    }

    #[test]
    fn test_encoding_is_compact_camel_case_in_field_order() {
        let payload = build_payload(&request(), &clock()).unwrap();
        let text = String::from_utf8(encode_payload(&payload).unwrap().bytes).unwrap();

        assert!(!text.contains(": ") && !text.contains('\n'));
        let order = [
            "\"licenseId\"",
            "\"licensedTo\"",
            "\"contactPerson\"",
            "\"contactEmail\"",
            "\"secondaryContactPerson\"",
            "\"secondaryContactEmail\"",
            "\"validFrom\"",
            "\"validTo\"",
            "\"tier\"",
            "\"maxApiCallsPerMonth\"",
            "\"maxConcurrentConnections\"",
            "\"featuresIncluded\"",
            "\"issuedAt\"",
            "\"metadata\"",
        ];
        let positions: Vec<usize> = order.iter().map(|k| text.find(k).unwrap()).collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));

        // Metadata keys sorted regardless of insertion order
        assert!(text.contains(r#""metadata":{"crm":"ACME-42","region":"eu-west"}"#));
    }

    #[test]
    fn test_decode_roundtrip() {
        let payload = build_payload(&request(), &clock()).unwrap();
        let canonical = encode_payload(&payload).unwrap();
        assert_eq!(decode_payload(&canonical.bytes).unwrap(), payload);
        assert_eq!(STANDARD.decode(&canonical.encoded).unwrap(), canonical.bytes);
    }

    #[test]
    fn test_decode_garbage() {
        assert!(matches!(
            decode_payload(b"{\"licenseId\":1}"),
            Err(KeywardenError::MalformedEnvelope(_))
        ));
    }
}
