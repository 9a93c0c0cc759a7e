//! RSA key material: PEM codec, file backend and the key store.

pub mod file;
pub mod pem;
pub mod store;

#[cfg(test)]
pub(crate) mod test_support {
    //! Fixed RSA-2048 keys so unit tests never pay for key generation.

    use once_cell::sync::Lazy;
    use rsa::pkcs8::DecodePrivateKey;
    use rsa::RsaPrivateKey;

    pub(crate) const TEST_KEY_A_PEM: &str = include_str!("../../tests/fixtures/signing_key_a.pem");
    pub(crate) const TEST_KEY_B_PEM: &str = include_str!("../../tests/fixtures/signing_key_b.pem");

    static KEY_A: Lazy<RsaPrivateKey> =
        Lazy::new(|| RsaPrivateKey::from_pkcs8_pem(TEST_KEY_A_PEM).expect("fixture key A"));
    static KEY_B: Lazy<RsaPrivateKey> =
        Lazy::new(|| RsaPrivateKey::from_pkcs8_pem(TEST_KEY_B_PEM).expect("fixture key B"));

    pub(crate) fn test_private_key() -> RsaPrivateKey {
        KEY_A.clone()
    }

    pub(crate) fn other_private_key() -> RsaPrivateKey {
        KEY_B.clone()
    }
}
