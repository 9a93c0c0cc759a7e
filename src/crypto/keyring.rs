//! Thumbprint-addressed public keys for verification across key rotations.

use crate::crypto::digest;
use crate::keys::store::KeyStore;
use crate::KeywardenError;
use rsa::RsaPublicKey;
use std::collections::HashMap;
use std::sync::Arc;

/// Looks up the public key that produced a signature.
pub trait PublicKeyResolver: Send + Sync {
    /// The public key whose thumbprint is `thumbprint`, if known.
    fn resolve(&self, thumbprint: &str) -> Option<RsaPublicKey>;
}

impl PublicKeyResolver for RsaPublicKey {
    fn resolve(&self, thumbprint: &str) -> Option<RsaPublicKey> {
        let own = digest::thumbprint(self).ok()?;
        own.eq_ignore_ascii_case(thumbprint).then(|| self.clone())
    }
}

/// Resolves the store's active key only.
impl PublicKeyResolver for KeyStore {
    fn resolve(&self, thumbprint: &str) -> Option<RsaPublicKey> {
        let own = self.thumbprint().ok()?;
        if own.eq_ignore_ascii_case(thumbprint) {
            self.public_key().ok()
        } else {
            None
        }
    }
}

impl<R: PublicKeyResolver + ?Sized> PublicKeyResolver for Arc<R> {
    fn resolve(&self, thumbprint: &str) -> Option<RsaPublicKey> {
        (**self).resolve(thumbprint)
    }
}

/// Any number of public key generations, keyed by thumbprint.
#[derive(Debug, Clone, Default)]
pub struct KeyRing {
    keys: HashMap<String, RsaPublicKey>,
}

impl KeyRing {
    /// An empty ring.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a key and return its thumbprint. Re-adding a key is a no-op.
    pub fn insert(&mut self, public_key: RsaPublicKey) -> Result<String, KeywardenError> {
        let thumbprint = digest::thumbprint(&public_key)?;
        self.keys.insert(thumbprint.clone(), public_key);
        Ok(thumbprint)
    }

    pub(crate) fn insert_known(&mut self, thumbprint: String, public_key: RsaPublicKey) {
        self.keys.insert(thumbprint.to_ascii_lowercase(), public_key);
    }

    /// Add a key given as PEM (PKCS#1 or SPKI).
    pub fn insert_pem(&mut self, pem: &str) -> Result<String, KeywardenError> {
        self.insert(crate::keys::pem::public_key_from_pem(pem)?)
    }

    /// Drop a key generation.
    pub fn remove(&mut self, thumbprint: &str) -> Option<RsaPublicKey> {
        self.keys.remove(&thumbprint.to_ascii_lowercase())
    }

    /// Whether a thumbprint is known.
    pub fn contains(&self, thumbprint: &str) -> bool {
        self.keys.contains_key(&thumbprint.to_ascii_lowercase())
    }

    /// Number of key generations held.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Whether the ring holds no keys.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl PublicKeyResolver for KeyRing {
    fn resolve(&self, thumbprint: &str) -> Option<RsaPublicKey> {
        self.keys.get(&thumbprint.to_ascii_lowercase()).cloned()
    }
}

/// Every key a store has signed with: the active key, the keys it retired,
/// and any extra keys the caller trusts (e.g. from a previous deployment).
#[derive(Clone)]
pub struct KeyHistory {
    store: Arc<KeyStore>,
    extra: KeyRing,
}

impl KeyHistory {
    /// The store's active and retired keys.
    pub fn new(store: Arc<KeyStore>) -> Self {
        Self::with_keys(store, KeyRing::new())
    }

    /// The store's keys plus `extra`.
    pub fn with_keys(store: Arc<KeyStore>, extra: KeyRing) -> Self {
        Self { store, extra }
    }
}

impl PublicKeyResolver for KeyHistory {
    fn resolve(&self, thumbprint: &str) -> Option<RsaPublicKey> {
        self.store
            .resolve(thumbprint)
            .or_else(|| self.store.retired_key(thumbprint))
            .or_else(|| self.extra.resolve(thumbprint))
    }
}
