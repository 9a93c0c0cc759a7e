//! RSASSA-PKCS1-v1_5 signatures over SHA-256 ("RS256").

use crate::KeywardenError;
use rsa::pkcs1v15::{Signature, SigningKey, VerifyingKey};
use rsa::signature::{SignatureEncoding, Signer, Verifier};
use rsa::{RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;

/// Algorithm tag stamped on every envelope.
pub const SIGNATURE_ALGORITHM: &str = "RS256";

/// Sign `payload` with PKCS#1 v1.5 over its SHA-256 digest.
///
/// Returns the raw signature bytes; callers base64-encode for transport.
/// PKCS#1 v1.5 is deterministic: the same key and payload always give the
/// same signature.
pub fn sign(payload: &[u8], private_key: &RsaPrivateKey) -> Result<Vec<u8>, KeywardenError> {
    let signing_key = SigningKey::<Sha256>::new(private_key.clone());
    let signature = signing_key
        .try_sign(payload)
        .map_err(|e| KeywardenError::SigningFailed(e.to_string()))?;
    Ok(signature.to_vec())
}

/// Check a PKCS#1 v1.5 / SHA-256 signature.
///
/// A mismatch, a truncated signature or garbage bytes are all a plain `false`.
pub fn verify(payload: &[u8], signature: &[u8], public_key: &RsaPublicKey) -> bool {
    let Ok(signature) = Signature::try_from(signature) else {
        return false;
    };
    VerifyingKey::<Sha256>::new(public_key.clone())
        .verify(payload, &signature)
        .is_ok()
}

/// Sign and immediately verify a fixed message to prove a key pair works.
pub fn self_test(private_key: &RsaPrivateKey) -> Result<(), KeywardenError> {
    const SELF_TEST: &[u8] = b"keywarden-key-self-test";
    let signature = sign(SELF_TEST, private_key)?;
    if !verify(SELF_TEST, &signature, &private_key.to_public_key()) {
        return Err(KeywardenError::InvalidKey(
            "key failed sign/verify round-trip".to_string(),
        ));
    }
    Ok(())
}
