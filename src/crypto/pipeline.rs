//! Envelope verification pipeline composing all checks.
//!
//! 1. Unpack the envelope (format version, required fields, base64)
//! 2. Recompute the checksum over the transported payload text
//! 3. Resolve the signing key by thumbprint
//! 4. Verify the RS256 signature over the payload bytes
//! 5. Decode the payload
//! 6. Check the validity window against the clock
//! 7. Apply the lifecycle status, when the caller knows it
//!
//! Every failure is a result, never an error: an artifact the verifier cannot
//! read is simply not a valid license.

use crate::clock::{Clock, SystemClock};
use crate::crypto::keyring::PublicKeyResolver;
use crate::crypto::signing;
use crate::policy::status::LicenseStatus;
use crate::protocol::canonical::decode_payload;
use crate::protocol::envelope::{self, SignedLicenseEnvelope};
use crate::protocol::models::LicensePayload;
use crate::KeywardenError;
use std::fmt;
use std::sync::Arc;

/// Why an envelope did not verify.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VerificationFailure {
    /// Missing field, bad base64 or unknown algorithm.
    MalformedEnvelope,
    /// `formatVersion` not understood.
    UnsupportedFormatVersion,
    /// Recorded checksum does not match the payload.
    ChecksumMismatch,
    /// No public key known for the thumbprint.
    UnknownKey,
    /// Signature does not validate.
    SignatureMismatch,
    /// Signed bytes are not a license payload.
    PayloadUnreadable,
    /// `validFrom` is still in the future.
    NotYetValid,
    /// `validTo` has passed.
    Expired,
    /// Lifecycle status is Suspended.
    Suspended,
    /// Lifecycle status is Revoked.
    Revoked,
    /// Lifecycle status is Archived.
    Archived,
    /// The issuer has no record of the license.
    NotFound,
}

impl VerificationFailure {
    /// Stable reason code.
    pub fn code(self) -> &'static str {
        match self {
            VerificationFailure::MalformedEnvelope => "MALFORMED_ENVELOPE",
            VerificationFailure::UnsupportedFormatVersion => "UNSUPPORTED_FORMAT_VERSION",
            VerificationFailure::ChecksumMismatch => "CHECKSUM_MISMATCH",
            VerificationFailure::UnknownKey => "UNKNOWN_KEY",
            VerificationFailure::SignatureMismatch => "SIGNATURE_MISMATCH",
            VerificationFailure::PayloadUnreadable => "PAYLOAD_UNREADABLE",
            VerificationFailure::NotYetValid => "NOT_YET_VALID",
            VerificationFailure::Expired => "EXPIRED",
            VerificationFailure::Suspended => "SUSPENDED",
            VerificationFailure::Revoked => "REVOKED",
            VerificationFailure::Archived => "ARCHIVED",
            VerificationFailure::NotFound => "NOT_FOUND",
        }
    }

    fn from_status(status: LicenseStatus) -> Option<Self> {
        match status {
            LicenseStatus::Active => None,
            LicenseStatus::Suspended => Some(VerificationFailure::Suspended),
            LicenseStatus::Expired => Some(VerificationFailure::Expired),
            LicenseStatus::Revoked => Some(VerificationFailure::Revoked),
            LicenseStatus::Archived => Some(VerificationFailure::Archived),
            LicenseStatus::NotFound => Some(VerificationFailure::NotFound),
        }
    }
}

impl fmt::Display for VerificationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Outcome of verifying an envelope.
#[derive(Debug, Clone)]
pub struct VerificationResult {
    /// Whether the license is authentic and currently honored.
    pub valid: bool,

    /// Set whenever `valid` is false.
    pub reason: Option<VerificationFailure>,

    /// Decoded payload, present once the signature has verified. Kept on
    /// window and status failures so callers can report on the license.
    pub payload: Option<LicensePayload>,

    /// Thumbprint the envelope claims, once it could be read.
    pub thumbprint: Option<String>,
}

impl VerificationResult {
    fn rejected(reason: VerificationFailure) -> Self {
        Self {
            valid: false,
            reason: Some(reason),
            payload: None,
            thumbprint: None,
        }
    }

    fn with_thumbprint(mut self, thumbprint: &str) -> Self {
        self.thumbprint = Some(thumbprint.to_string());
        self
    }

    /// Apply the issuer's lifecycle status to an otherwise valid result.
    ///
    /// Earlier failures win: an expired license stays `Expired` even when its
    /// record says `Revoked`.
    pub fn with_status(mut self, status: LicenseStatus) -> Self {
        if self.valid {
            if let Some(failure) = VerificationFailure::from_status(status) {
                self.valid = false;
                self.reason = Some(failure);
            }
        }
        self
    }

    /// The failure code, if any.
    pub fn reason_code(&self) -> Option<&'static str> {
        self.reason.map(VerificationFailure::code)
    }
}

/// Verifies envelopes against a set of known public keys.
pub struct EnvelopeVerifier {
    resolver: Arc<dyn PublicKeyResolver>,
    clock: Arc<dyn Clock>,
}

impl EnvelopeVerifier {
    /// Verifier using wall-clock time.
    pub fn new(resolver: Arc<dyn PublicKeyResolver>) -> Self {
        Self::with_clock(resolver, Arc::new(SystemClock))
    }

    /// Verifier with an injected clock.
    pub fn with_clock(resolver: Arc<dyn PublicKeyResolver>, clock: Arc<dyn Clock>) -> Self {
        Self { resolver, clock }
    }

    /// Run the full verification pipeline.
    ///
    /// # Arguments
    /// * `envelope` - The artifact to check
    /// * `status` - Lifecycle status from the issuer's records, if known
    pub fn verify(
        &self,
        envelope: &SignedLicenseEnvelope,
        status: Option<LicenseStatus>,
    ) -> VerificationResult {
        let result = self.verify_inner(envelope, status);
        match result.reason {
            None => tracing::debug!(thumbprint = ?result.thumbprint, "Envelope verified"),
            Some(reason) => tracing::debug!(
                reason = reason.code(),
                thumbprint = ?result.thumbprint,
                "Envelope rejected"
            ),
        }
        result
    }

    /// Parse JSON and verify.
    pub fn verify_json(&self, json: &str, status: Option<LicenseStatus>) -> VerificationResult {
        match envelope::from_json(json) {
            Ok(envelope) => self.verify(&envelope, status),
            Err(_) => VerificationResult::rejected(VerificationFailure::MalformedEnvelope),
        }
    }

    fn verify_inner(
        &self,
        envelope: &SignedLicenseEnvelope,
        status: Option<LicenseStatus>,
    ) -> VerificationResult {
        // 1. Unpack
        let unpacked = match envelope::unpack(envelope) {
            Ok(unpacked) => unpacked,
            Err(KeywardenError::UnsupportedFormatVersion { .. }) => {
                return VerificationResult::rejected(VerificationFailure::UnsupportedFormatVersion)
            }
            Err(_) => return VerificationResult::rejected(VerificationFailure::MalformedEnvelope),
        };
        let thumbprint = unpacked.thumbprint.as_str();

        // 2. Checksum, before any signature work
        if !unpacked.checksum_valid {
            return VerificationResult::rejected(VerificationFailure::ChecksumMismatch)
                .with_thumbprint(thumbprint);
        }

        // 3. Key lookup
        let Some(public_key) = self.resolver.resolve(thumbprint) else {
            return VerificationResult::rejected(VerificationFailure::UnknownKey).with_thumbprint(thumbprint);
        };

        // 4. Signature
        if !signing::verify(&unpacked.payload_bytes, &unpacked.signature, &public_key) {
            return VerificationResult::rejected(VerificationFailure::SignatureMismatch)
                .with_thumbprint(thumbprint);
        }

        // 5. Payload
        let payload = match decode_payload(&unpacked.payload_bytes) {
            Ok(payload) => payload,
            Err(_) => {
                return VerificationResult::rejected(VerificationFailure::PayloadUnreadable)
                    .with_thumbprint(thumbprint)
            }
        };

        // 6. Validity window
        let now = self.clock.now_utc();
        let window_failure = if now < payload.valid_from {
            Some(VerificationFailure::NotYetValid)
        } else if now >= payload.valid_to {
            Some(VerificationFailure::Expired)
        } else {
            None
        };

        let result = VerificationResult {
            valid: window_failure.is_none(),
            reason: window_failure,
            payload: Some(payload),
            thumbprint: Some(thumbprint.to_string()),
        };

        // 7. Lifecycle status
        match status {
            Some(status) => result.with_status(status),
            None => result,
        }
    }
}
