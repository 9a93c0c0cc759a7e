//! License issuance: request in, signed envelope out.
//!
//! Two flavours share one pipeline (build payload, sign, pack):
//! - [`LicenseIssuer`] signs with a [`KeyStore`] it holds, and exposes the
//!   store's administrative operations (rotation, export, import).
//! - [`StatelessIssuer`] signs with a PEM private key supplied on every call
//!   and never keeps it.

use crate::clock::{Clock, SystemClock};
use crate::config::{KeywardenConfig, DEFAULT_FORMAT_VERSION, SUPPORTED_KEY_SIZES};
use crate::crypto::keyring::{KeyHistory, KeyRing};
use crate::crypto::pipeline::EnvelopeVerifier;
use crate::crypto::signing;
use crate::keys::pem;
use crate::keys::store::KeyStore;
use crate::policy::tiers;
use crate::protocol::canonical::{build_payload, encode_payload};
use crate::protocol::envelope::{self, SignedLicenseEnvelope};
use crate::protocol::models::{LicenseFeature, LicensePayload, LicenseRequest, LicenseTier};
use crate::KeywardenError;
use chrono::{DateTime, Utc};
use rsa::traits::PublicKeyParts;
use rsa::{RsaPrivateKey, RsaPublicKey};
use std::sync::Arc;
use zeroize::Zeroizing;

/// Metadata key a renewal uses to point at the license it replaces.
pub const RENEWED_FROM_METADATA_KEY: &str = "renewedFrom";

/// A freshly signed license.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedLicense {
    /// The portable artifact.
    pub envelope: SignedLicenseEnvelope,
    /// The payload the envelope carries, for the caller to store or display.
    pub payload: LicensePayload,
}

impl IssuedLicense {
    /// The envelope as JSON.
    pub fn to_json(&self) -> Result<String, KeywardenError> {
        envelope::to_json(&self.envelope)
    }
}

/// Build, sign and pack. `sign` returns the signature and the thumbprint of
/// the key that produced it.
fn seal(
    request: &LicenseRequest,
    clock: &dyn Clock,
    format_version: &str,
    sign: impl FnOnce(&[u8]) -> Result<(Vec<u8>, String), KeywardenError>,
) -> Result<IssuedLicense, KeywardenError> {
    let payload = build_payload(request, clock)?;
    let canonical = encode_payload(&payload)?;
    tracing::debug!(
        license_id = %payload.license_id,
        bytes = canonical.bytes.len(),
        "Built canonical payload"
    );

    let (signature, thumbprint) = sign(&canonical.bytes)?;
    let envelope = envelope::pack(&canonical.bytes, &signature, &thumbprint, format_version, clock)?;

    tracing::info!(
        license_id = %payload.license_id,
        tier = %payload.tier,
        thumbprint = %thumbprint,
        "Issued license"
    );
    Ok(IssuedLicense { envelope, payload })
}

/// Issuer backed by a key store.
///
/// Create one instance per deployment and share it; the key store guards its
/// key pair internally.
pub struct LicenseIssuer {
    keys: Arc<KeyStore>,
    clock: Arc<dyn Clock>,
    format_version: String,
}

impl LicenseIssuer {
    /// Issuer over an existing key store, using the system clock.
    pub fn new(keys: Arc<KeyStore>) -> Self {
        Self::with_clock(keys, Arc::new(SystemClock))
    }

    /// Issuer with an injected clock.
    pub fn with_clock(keys: Arc<KeyStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            keys,
            clock,
            format_version: DEFAULT_FORMAT_VERSION.to_string(),
        }
    }

    /// Open (or initialize) the configured key store and build an issuer on it.
    ///
    /// # Errors
    /// Any error of [`KeyStore::open`].
    pub fn from_config(config: &KeywardenConfig) -> Result<Self, KeywardenError> {
        let keys = Arc::new(KeyStore::open(config)?);
        let mut issuer = Self::new(keys);
        issuer.format_version = config.format_version.clone();
        Ok(issuer)
    }

    /// The key store this issuer signs with.
    pub fn key_store(&self) -> &Arc<KeyStore> {
        &self.keys
    }

    /// The clock used for issuance timestamps.
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Validate, build, sign and pack a license.
    ///
    /// # Errors
    /// * `Validation` - The request breaks one or more payload rules
    /// * `SigningFailed` - The key store could not sign
    pub fn issue(&self, request: &LicenseRequest) -> Result<IssuedLicense, KeywardenError> {
        seal(request, self.clock.as_ref(), &self.format_version, |bytes| {
            let signed = self.keys.sign(bytes)?;
            Ok((signed.signature, signed.thumbprint))
        })
    }

    /// Check a raw signature against the active public key.
    pub fn verify_signature(&self, payload: &[u8], signature: &[u8]) -> Result<bool, KeywardenError> {
        self.keys.verify(payload, signature)
    }

    /// A verifier that accepts licenses signed by the active key or by any
    /// key this issuer's store has retired.
    pub fn verifier(&self) -> EnvelopeVerifier {
        self.verifier_with(KeyRing::new())
    }

    /// Like [`verifier`](Self::verifier), additionally trusting `extra` keys.
    pub fn verifier_with(&self, extra: KeyRing) -> EnvelopeVerifier {
        let history = KeyHistory::with_keys(self.keys.clone(), extra);
        EnvelopeVerifier::with_clock(Arc::new(history), self.clock.clone())
    }

    /// Public key in PEM.
    pub fn export_public_key_pem(&self) -> Result<String, KeywardenError> {
        self.keys.export_public_key_pem()
    }

    /// Private key in PEM, encrypted when a password is given.
    pub fn export_private_key_pem(&self, password: Option<&str>) -> Result<Zeroizing<String>, KeywardenError> {
        self.keys.export_private_key_pem(password)
    }

    /// Replace the signing key with an imported one. Returns the retired public key.
    pub fn import_private_key_pem(
        &self,
        private_pem: &str,
        password: Option<&str>,
    ) -> Result<RsaPublicKey, KeywardenError> {
        self.keys.import_private_key_pem(private_pem, password)
    }

    /// Generate and persist a new signing key. Returns the retired public key.
    ///
    /// Licenses signed before the rotation keep verifying through
    /// [`verifier`](Self::verifier); a resolver holding only the active key
    /// rejects them as signed by an unknown key.
    pub fn regenerate_keys(&self) -> Result<RsaPublicKey, KeywardenError> {
        self.keys.rotate()
    }
}

/// Issuer that is handed its private key on every call.
pub struct StatelessIssuer {
    clock: Arc<dyn Clock>,
    format_version: String,
}

impl Default for StatelessIssuer {
    fn default() -> Self {
        Self::new()
    }
}

impl StatelessIssuer {
    /// Stateless issuer using the system clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Stateless issuer with an injected clock.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            format_version: DEFAULT_FORMAT_VERSION.to_string(),
        }
    }

    /// Issue a license signed with the given private key.
    ///
    /// # Errors
    /// * `InvalidKey` - The PEM is not a usable RSA private key
    /// * `DecryptionError` - Encrypted PEM with a wrong or missing password
    /// * `Validation` - The request breaks one or more payload rules
    pub fn issue_with_pem(
        &self,
        request: &LicenseRequest,
        private_pem: &str,
        password: Option<&str>,
    ) -> Result<IssuedLicense, KeywardenError> {
        let private_key = parse_private_key(private_pem, password)?;
        self.issue_with_key(request, &private_key)
    }

    /// Issue a license signed with an already parsed private key.
    pub fn issue_with_key(
        &self,
        request: &LicenseRequest,
        private_key: &RsaPrivateKey,
    ) -> Result<IssuedLicense, KeywardenError> {
        seal(request, self.clock.as_ref(), &self.format_version, |bytes| {
            let signature = signing::sign(bytes, private_key)?;
            let thumbprint = crate::crypto::digest::thumbprint(&private_key.to_public_key())?;
            Ok((signature, thumbprint))
        })
    }

    /// Check that a PEM private key parses, is large enough and can sign.
    ///
    /// # Errors
    /// * `InvalidKey` - Unparseable, too small, or fails a sign/verify round-trip
    /// * `DecryptionError` - Encrypted PEM with a wrong or missing password
    pub fn validate_private_key(&self, private_pem: &str, password: Option<&str>) -> Result<(), KeywardenError> {
        let private_key = parse_private_key(private_pem, password)?;
        signing::self_test(&private_key)
    }

    /// Check that a PEM public key parses and is large enough.
    pub fn validate_public_key(&self, public_pem: &str) -> Result<RsaPublicKey, KeywardenError> {
        let public_key = pem::public_key_from_pem(public_pem)?;
        check_modulus(public_key.size())?;
        Ok(public_key)
    }

    /// Check a raw signature against a PEM public key.
    ///
    /// # Errors
    /// * `InvalidKey` - The public key PEM is unusable; a signature mismatch is `Ok(false)`
    pub fn verify_signature(
        &self,
        payload: &[u8],
        signature: &[u8],
        public_pem: &str,
    ) -> Result<bool, KeywardenError> {
        let public_key = self.validate_public_key(public_pem)?;
        Ok(signing::verify(payload, signature, &public_key))
    }

    /// Public key PEM matching a private key PEM.
    pub fn public_key_pem_for(&self, private_pem: &str, password: Option<&str>) -> Result<String, KeywardenError> {
        let private_key = parse_private_key(private_pem, password)?;
        pem::public_key_to_pem(&private_key.to_public_key())
    }
}

fn parse_private_key(private_pem: &str, password: Option<&str>) -> Result<RsaPrivateKey, KeywardenError> {
    let private_key = pem::private_key_from_pem(private_pem, password).map_err(|e| match e {
        KeywardenError::KeyCorrupt(reason) => KeywardenError::InvalidKey(reason),
        other => other,
    })?;
    check_modulus(private_key.size())?;
    Ok(private_key)
}

fn check_modulus(size_bytes: usize) -> Result<(), KeywardenError> {
    let minimum = SUPPORTED_KEY_SIZES.iter().copied().min().unwrap_or(2048);
    if size_bytes * 8 < minimum {
        return Err(KeywardenError::InvalidKey(format!(
            "RSA modulus of {} bits is below the {}-bit minimum",
            size_bytes * 8,
            minimum
        )));
    }
    Ok(())
}

/// What changes when a license is renewed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenewalOptions {
    /// New start of validity.
    pub valid_from: DateTime<Utc>,
    /// New end of validity.
    pub valid_to: DateTime<Utc>,
    /// New tier; the previous tier when absent.
    pub tier: Option<LicenseTier>,
    /// Replacement feature list; carried over when absent.
    pub features: Option<Vec<LicenseFeature>>,
    /// Replacement limits (API calls per month, concurrent connections).
    pub limits: Option<(u64, u32)>,
}

impl RenewalOptions {
    /// Same tier, features and limits over a new window.
    pub fn new(valid_from: DateTime<Utc>, valid_to: DateTime<Utc>) -> Self {
        Self {
            valid_from,
            valid_to,
            tier: None,
            features: None,
            limits: None,
        }
    }

    /// Move the license to another tier.
    pub fn with_tier(mut self, tier: LicenseTier) -> Self {
        self.tier = Some(tier);
        self
    }

    /// Replace the feature list.
    pub fn with_features(mut self, features: Vec<LicenseFeature>) -> Self {
        self.features = Some(features);
        self
    }

    /// Replace the numeric limits.
    pub fn with_limits(mut self, max_api_calls_per_month: u64, max_concurrent_connections: u32) -> Self {
        self.limits = Some((max_api_calls_per_month, max_concurrent_connections));
        self
    }
}

/// Request for the license that renews `previous`.
///
/// Licensee identity and metadata are cloned and a fresh license id will be
/// assigned. Without overrides, a renewal on the same tier keeps the previous
/// features and limits. A move to another standard tier takes that tier's
/// defaults and keeps only the non-catalog extras; a move to `Custom` keeps
/// everything.
pub fn renewal_request(previous: &LicensePayload, options: &RenewalOptions) -> LicenseRequest {
    let tier = options.tier.unwrap_or(previous.tier);
    let same_tier = tier == previous.tier;

    let features = match &options.features {
        Some(features) => features.clone(),
        None if same_tier || !tier.is_standard() => previous.features_included.clone(),
        None => previous
            .features_included
            .iter()
            .filter(|f| !tiers::is_catalog_feature(&f.name))
            .cloned()
            .collect(),
    };

    let limits = options.limits.or_else(|| {
        (same_tier || !tier.is_standard())
            .then_some((previous.max_api_calls_per_month, previous.max_concurrent_connections))
    });

    let mut request = LicenseRequest::new(previous.licensee(), options.valid_from, options.valid_to, tier);
    request.features = features;
    if let Some((calls, connections)) = limits {
        request = request.with_limits(calls, connections);
    }
    request.metadata = previous.metadata.clone();
    request
        .metadata
        .insert(RENEWED_FROM_METADATA_KEY.to_string(), previous.license_id.to_string());
    request
}
