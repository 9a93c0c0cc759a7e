//! # Keywarden
//!
//! **Offline RSA license issuance and verification for Rust.**
//!
//! Keywarden turns a license request into a tamper-evident artifact that any
//! holder of the issuer's public key can verify without calling home.
//!
//! ## Features
//!
//! - **RS256 signatures**: RSASSA-PKCS1-v1_5 over SHA-256 of a canonical payload
//! - **Deterministic payloads**: compact camelCase JSON with a fixed field order
//! - **Transport checksum**: SHA-256 of the encoded payload, checked before the signature
//! - **Key rotation aware**: envelopes name their key by thumbprint; verifiers resolve it
//! - **Encrypted key storage**: PKCS#8 PBES2 (PBKDF2-SHA256 + AES-256-CBC) at rest and on export
//! - **Tier lattice**: Community ⊆ Professional ⊆ Enterprise, with Custom as an escape hatch
//!
//! ## Quickstart
//!
//! ```no_run
//! use chrono::{TimeZone, Utc};
//! use keywarden::{KeywardenConfig, LicenseIssuer, LicenseRequest, LicenseTier, Licensee};
//!
//! fn main() -> Result<(), keywarden::KeywardenError> {
//!     let config = KeywardenConfig::new("my-product")?;
//!     let issuer = LicenseIssuer::from_config(&config)?;
//!
//!     let request = LicenseRequest::new(
//!         Licensee::new("Acme Corp", "Wile E. Coyote", "wile@acme.test"),
//!         Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
//!         Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
//!         LicenseTier::Professional,
//!     );
//!     let issued = issuer.issue(&request)?;
//!     println!("{}", issued.to_json()?);
//!
//!     let result = issuer.verifier().verify(&issued.envelope, None);
//!     assert!(result.valid);
//!     Ok(())
//! }
//! ```
//!
//! ## Threat Model
//!
//! Keywarden protects against:
//! - **License forgery**: only the private key holder can produce a valid signature
//! - **Payload tampering**: any change to the signed bytes fails verification
//! - **Transport corruption**: caught by the checksum before any RSA work
//!
//! Keywarden does **not** prevent binary patching of the verifying program,
//! and it does not distribute keys: verifiers must obtain the public key
//! through a channel they trust.
//!
//! ## Layout
//!
//! - [`keys`]: key store, PEM codec, key files
//! - [`crypto`]: digests, signatures, key resolution, verification pipeline
//! - [`protocol`]: payload models, canonical encoding, envelope codec
//! - [`policy`]: tiers, request rules, lifecycle, access checks
//! - [`issuer`] and [`service`]: orchestration
//! - [`registry`]: collaborator traits for records and audit

#![warn(missing_docs)]

// Core modules
pub mod clock;
pub mod config;
pub mod errors;

// Key material
pub mod keys;

// Crypto layer
pub mod crypto;

// Protocol layer
pub mod protocol;

// Policy layer
pub mod policy;

// Collaborators
pub mod registry;

// Orchestration (main public API)
pub mod issuer;
pub mod service;

// Re-exports for public API
pub use clock::{Clock, SystemClock};
pub use config::KeywardenConfig;
pub use crypto::keyring::{KeyHistory, KeyRing, PublicKeyResolver};
pub use crypto::pipeline::{EnvelopeVerifier, VerificationFailure, VerificationResult};
pub use errors::{KeywardenError, ValidationErrors, ValidationIssue};
pub use issuer::{renewal_request, IssuedLicense, LicenseIssuer, RenewalOptions, StatelessIssuer};
pub use keys::store::{KeyPair, KeyStore};
pub use policy::access::{check_access, check_feature, UsageCaps};
pub use policy::status::{LicenseStatus, StatusAction};
pub use protocol::envelope::SignedLicenseEnvelope;
pub use protocol::models::{LicenseFeature, LicensePayload, LicenseRequest, LicenseTier, Licensee};
pub use registry::{
    AuditEntry, AuditLog, AuditOperation, LicenseRecord, LicenseRepository, MemoryAuditLog,
    MemoryLicenseRepository,
};
pub use service::{IssuanceOutcome, LicenseService};

#[cfg(any(test, feature = "test-seams"))]
pub use clock::MockClock;
