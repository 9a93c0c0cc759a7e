//! Shared helpers for integration tests.

#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use keywarden::keys::pem;
use keywarden::{
    Clock, KeyStore, LicenseIssuer, LicenseRequest, LicenseTier, Licensee,
};
use rsa::RsaPrivateKey;
use std::sync::{Arc, Mutex};

pub const KEY_A_PEM: &str = include_str!("../fixtures/signing_key_a.pem");
pub const KEY_A_ENCRYPTED_PEM: &str = include_str!("../fixtures/signing_key_a_encrypted.pem");
pub const KEY_A_PUBLIC_PEM: &str = include_str!("../fixtures/signing_key_a_public.pem");
pub const KEY_B_PEM: &str = include_str!("../fixtures/signing_key_b.pem");

/// Password of `signing_key_a_encrypted.pem`.
pub const FIXTURE_PASSWORD: &str = "fixture-password";

/// Thumbprint of fixture key A's public half.
pub const KEY_A_THUMBPRINT: &str = "cad41ea4d78d9807f787607be6e4f8a692f1214495370853a69ba11ab26cc41d";

/// Settable clock for tests outside the crate.
#[derive(Debug)]
pub struct FixedClock(Mutex<DateTime<Utc>>);

impl FixedClock {
    pub fn at(now: DateTime<Utc>) -> Arc<Self> {
        Arc::new(Self(Mutex::new(now)))
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.0.lock().unwrap() = now;
    }
}

impl Clock for FixedClock {
    fn now_utc(&self) -> DateTime<Utc> {
        *self.0.lock().unwrap()
    }
}

pub fn utc(y: i32, m: u32, d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
}

pub fn key_a() -> RsaPrivateKey {
    pem::private_key_from_pem(KEY_A_PEM, None).unwrap()
}

pub fn key_b() -> RsaPrivateKey {
    pem::private_key_from_pem(KEY_B_PEM, None).unwrap()
}

/// Issuer over an in-memory store holding `key`.
pub fn issuer_with(key: RsaPrivateKey, clock: Arc<FixedClock>) -> LicenseIssuer {
    LicenseIssuer::with_clock(Arc::new(KeyStore::from_private_key(key).unwrap()), clock)
}

/// The Acme Corp reference request: Professional, 2025-01-01 to 2026-01-01.
pub fn acme_request() -> LicenseRequest {
    LicenseRequest::new(
        Licensee::new("Acme Corp", "Wile E. Coyote", "wile@acme.test"),
        utc(2025, 1, 1),
        utc(2026, 1, 1),
        LicenseTier::Professional,
    )
}
