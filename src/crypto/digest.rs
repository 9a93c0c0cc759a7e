//! SHA-256 checksums and public-key thumbprints.
//!
//! All digests are rendered as lowercase hex.

use crate::KeywardenError;
use rsa::pkcs1::EncodeRsaPublicKey;
use rsa::RsaPublicKey;
use sha2::{Digest, Sha256};

/// Compute SHA-256 of `data` and return it hex-encoded (lowercase).
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Checksum of the base64-encoded payload string carried in an envelope.
///
/// Hashes the transport text, not the decoded bytes, so corruption is caught
/// before any base64 decoding or signature work.
pub fn checksum(encoded_payload: &str) -> String {
    sha256_hex(encoded_payload.as_bytes())
}

/// Compare a recorded checksum against the encoded payload.
///
/// # Returns
/// * `Ok(true)` / `Ok(false)` - Checksum matches or not
/// * `Err(MalformedEnvelope)` - Checksum is not 64 hex characters
pub fn checksum_matches(encoded_payload: &str, recorded: &str) -> Result<bool, KeywardenError> {
    if recorded.len() != 64 || !recorded.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(KeywardenError::MalformedEnvelope(
            "checksum must be 64 hex characters".to_string(),
        ));
    }
    Ok(checksum(encoded_payload).eq_ignore_ascii_case(recorded))
}

/// Stable identifier of a public key: SHA-256 over its PKCS#1 DER encoding.
pub fn thumbprint(public_key: &RsaPublicKey) -> Result<String, KeywardenError> {
    let der = public_key
        .to_pkcs1_der()
        .map_err(|e| KeywardenError::InvalidKey(format!("Failed to encode public key: {}", e)))?;
    Ok(sha256_hex(der.as_bytes()))
}
