//! Signed license envelope: the portable artifact and its JSON codec.
//!
//! ```json
//! {
//!   "licenseData": "<base64 canonical payload JSON>",
//!   "signature": "<base64 RSA-SHA256 signature>",
//!   "signatureAlgorithm": "RS256",
//!   "publicKeyThumbprint": "<hex sha256 of DER public key>",
//!   "formatVersion": "1.0",
//!   "createdAt": "<ISO-8601 UTC>",
//!   "checksum": "<hex sha256 of the base64 payload string>"
//! }
//! ```

use crate::clock::Clock;
use crate::crypto::digest;
use crate::crypto::signing::SIGNATURE_ALGORITHM;
use crate::KeywardenError;
use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Envelope format versions this crate can read and write.
pub const SUPPORTED_FORMAT_VERSIONS: &[&str] = &["1.0"];

/// The portable signed license.
///
/// [`from_json`] reads fields as optional so that a missing one surfaces as
/// `MalformedEnvelope` naming the field rather than a bare serde error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedLicenseEnvelope {
    /// Base64 canonical payload bytes.
    pub license_data: String,
    /// Base64 signature over the payload bytes.
    pub signature: String,
    /// Signature algorithm tag, always `RS256`.
    pub signature_algorithm: String,
    /// Hex SHA-256 thumbprint of the signing public key.
    pub public_key_thumbprint: String,
    /// Envelope format version.
    pub format_version: String,
    /// When the envelope was packed.
    pub created_at: DateTime<Utc>,
    /// Hex SHA-256 of `license_data`.
    pub checksum: String,
}

/// An envelope's decoded contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnpackedEnvelope {
    /// Canonical payload bytes.
    pub payload_bytes: Vec<u8>,
    /// Raw signature bytes.
    pub signature: Vec<u8>,
    /// Thumbprint of the key that signed.
    pub thumbprint: String,
    /// Whether the recorded checksum matches the payload as transported.
    pub checksum_valid: bool,
    /// Envelope format version.
    pub format_version: String,
    /// When the envelope was packed.
    pub created_at: DateTime<Utc>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireEnvelope {
    license_data: Option<String>,
    signature: Option<String>,
    signature_algorithm: Option<String>,
    public_key_thumbprint: Option<String>,
    format_version: Option<String>,
    created_at: Option<DateTime<Utc>>,
    checksum: Option<String>,
}

fn required(value: Option<String>, field: &str) -> Result<String, KeywardenError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(KeywardenError::MalformedEnvelope(format!("missing field {}", field))),
    }
}

/// Build an envelope around signed payload bytes.
///
/// # Errors
/// * `UnsupportedFormatVersion` - `format_version` is not one this crate writes
pub fn pack(
    payload_bytes: &[u8],
    signature: &[u8],
    thumbprint: &str,
    format_version: &str,
    clock: &dyn Clock,
) -> Result<SignedLicenseEnvelope, KeywardenError> {
    if !SUPPORTED_FORMAT_VERSIONS.contains(&format_version) {
        return Err(KeywardenError::UnsupportedFormatVersion {
            version: format_version.to_string(),
        });
    }

    let license_data = STANDARD.encode(payload_bytes);
    let checksum = digest::checksum(&license_data);
    Ok(SignedLicenseEnvelope {
        license_data,
        signature: STANDARD.encode(signature),
        signature_algorithm: SIGNATURE_ALGORITHM.to_string(),
        public_key_thumbprint: thumbprint.to_string(),
        format_version: format_version.to_string(),
        created_at: clock.now_utc(),
        checksum,
    })
}

/// Decode an envelope.
///
/// A checksum that is well-formed but does not match is reported through
/// [`UnpackedEnvelope::checksum_valid`], not as an error, so that callers can
/// tell corruption apart from an unreadable artifact.
///
/// # Errors
/// * `UnsupportedFormatVersion` - Unknown `formatVersion`
/// * `MalformedEnvelope` - Empty field, invalid base64, unknown algorithm or
///   a checksum that is not a SHA-256 hex digest
pub fn unpack(envelope: &SignedLicenseEnvelope) -> Result<UnpackedEnvelope, KeywardenError> {
    if !SUPPORTED_FORMAT_VERSIONS.contains(&envelope.format_version.as_str()) {
        return Err(KeywardenError::UnsupportedFormatVersion {
            version: envelope.format_version.clone(),
        });
    }

    for (field, value) in [
        ("licenseData", &envelope.license_data),
        ("signature", &envelope.signature),
        ("signatureAlgorithm", &envelope.signature_algorithm),
        ("publicKeyThumbprint", &envelope.public_key_thumbprint),
        ("checksum", &envelope.checksum),
    ] {
        if value.trim().is_empty() {
            return Err(KeywardenError::MalformedEnvelope(format!("missing field {}", field)));
        }
    }

    if envelope.signature_algorithm != SIGNATURE_ALGORITHM {
        return Err(KeywardenError::MalformedEnvelope(format!(
            "unsupported signature algorithm {} (expected {})",
            envelope.signature_algorithm, SIGNATURE_ALGORITHM
        )));
    }

    let payload_bytes = STANDARD
        .decode(&envelope.license_data)
        .map_err(|e| KeywardenError::MalformedEnvelope(format!("licenseData is not base64: {}", e)))?;
    let signature = STANDARD
        .decode(&envelope.signature)
        .map_err(|e| KeywardenError::MalformedEnvelope(format!("signature is not base64: {}", e)))?;
    let checksum_valid = digest::checksum_matches(&envelope.license_data, &envelope.checksum)?;

    Ok(UnpackedEnvelope {
        payload_bytes,
        signature,
        thumbprint: envelope.public_key_thumbprint.clone(),
        checksum_valid,
        format_version: envelope.format_version.clone(),
        created_at: envelope.created_at,
    })
}

/// Serialize an envelope to pretty-printed JSON.
pub fn to_json(envelope: &SignedLicenseEnvelope) -> Result<String, KeywardenError> {
    serde_json::to_string_pretty(envelope)
        .map_err(|e| KeywardenError::MalformedEnvelope(format!("Failed to serialize envelope: {}", e)))
}

/// Parse an envelope from JSON.
///
/// # Errors
/// * `MalformedEnvelope` - Not JSON, or a required field is absent or empty
pub fn from_json(json: &str) -> Result<SignedLicenseEnvelope, KeywardenError> {
    let wire: WireEnvelope = serde_json::from_str(json)
        .map_err(|e| KeywardenError::MalformedEnvelope(format!("Invalid envelope JSON: {}", e)))?;

    Ok(SignedLicenseEnvelope {
        license_data: required(wire.license_data, "licenseData")?,
        signature: required(wire.signature, "signature")?,
        signature_algorithm: required(wire.signature_algorithm, "signatureAlgorithm")?,
        public_key_thumbprint: required(wire.public_key_thumbprint, "publicKeyThumbprint")?,
        format_version: required(wire.format_version, "formatVersion")?,
        created_at: wire
            .created_at
            .ok_or_else(|| KeywardenError::MalformedEnvelope("missing field createdAt".to_string()))?,
        checksum: required(wire.checksum, "checksum")?,
    })
}
