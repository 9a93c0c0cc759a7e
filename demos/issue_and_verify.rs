//! Issue a license, verify it, then rotate the signing key.
//!
//! Keys are kept in a throwaway directory, so every run starts fresh.
//!
//! # Running
//!
//! ```bash
//! cargo run --example issue_and_verify
//! ```
//!
//! # Note
//!
//! A real verifier ships only the exported public key (see
//! `export_public_key_pem`) and never has access to the key directory.

use chrono::{Duration, Utc};
use keywarden::protocol::envelope;
use keywarden::{
    EnvelopeVerifier, KeyRing, KeywardenConfig, LicenseIssuer, LicenseRequest, LicenseTier,
    Licensee, VerificationResult,
};
use std::sync::Arc;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let key_dir = tempfile::TempDir::new()?;
    let config = KeywardenConfig::for_directory(key_dir.path());

    // First use generates and persists a 2048-bit key pair
    let issuer = LicenseIssuer::from_config(&config)?;
    println!("Signing key: {}", issuer.key_store().thumbprint()?);

    let now = Utc::now();
    let request = LicenseRequest::new(
        Licensee::new("Acme Corp", "Wile E. Coyote", "wile@acme.test"),
        now - Duration::days(1),
        now + Duration::days(365),
        LicenseTier::Professional,
    );
    let issued = issuer.issue(&request)?;
    let json = issued.to_json()?;
    println!("Issued license {}:\n{}", issued.payload.license_id, json);

    // The verifier side: only the public key and the JSON text
    let mut ring = KeyRing::new();
    ring.insert_pem(&issuer.export_public_key_pem()?)?;
    let verifier = EnvelopeVerifier::new(Arc::new(ring));
    report("Offline check", &verifier.verify_json(&json, None));

    // Any edit to the signed data is caught
    let mut tampered = envelope::from_json(&json)?;
    tampered.license_data.insert(0, 'A');
    report("Tampered copy", &verifier.verify(&tampered, None));

    // After rotation the issuer still honors what it signed before
    let retired = issuer.regenerate_keys()?;
    println!("Rotated to key: {}", issuer.key_store().thumbprint()?);
    report("Old license, issuer verifier", &issuer.verifier().verify(&issued.envelope, None));

    let mut stale = KeyRing::new();
    stale.insert(retired)?;
    let renewed = issuer.issue(&request)?;
    report(
        "New license, verifier with only the old key",
        &EnvelopeVerifier::new(Arc::new(stale)).verify(&renewed.envelope, None),
    );

    Ok(())
}

fn report(label: &str, result: &VerificationResult) {
    match (&result.payload, result.reason) {
        (Some(payload), None) if result.valid => println!(
            "✓ {}: valid, {} tier for {} until {}",
            label, payload.tier, payload.licensed_to, payload.valid_to
        ),
        (_, reason) => println!(
            "✗ {}: rejected ({})",
            label,
            reason.map(|r| r.to_string()).unwrap_or_else(|| "unknown".to_string())
        ),
    }
}
