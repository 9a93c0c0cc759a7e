//! Keywarden configuration.

use crate::KeywardenError;
use std::path::{Path, PathBuf};

/// Default RSA modulus size for newly generated key pairs.
pub const DEFAULT_KEY_SIZE_BITS: usize = 2048;

/// RSA modulus sizes the key store will generate.
pub const SUPPORTED_KEY_SIZES: &[usize] = &[2048, 4096];

/// Envelope format version written by this crate.
pub const DEFAULT_FORMAT_VERSION: &str = "1.0";

/// Lower bound on PBKDF2 rounds for password-protected private keys.
pub const MIN_PBKDF2_ITERATIONS: u32 = 10_000;

/// Default PBKDF2 rounds for password-protected private keys.
pub const DEFAULT_PBKDF2_ITERATIONS: u32 = 100_000;

/// Configuration for a stateful key store and the issuer built on it.
#[derive(Debug, Clone)]
pub struct KeywardenConfig {
    /// Namespace used to derive the default key directory
    /// (`dirs::data_dir()/<namespace>/keys`).
    pub namespace: String,

    /// Directory holding `private_key.pem` and `public_key.pem`.
    pub key_store_dir: PathBuf,

    /// Modulus size used when the store has to generate a key pair.
    pub key_size_bits: usize,

    /// Envelope format version stamped on issued licenses.
    pub format_version: String,

    /// When set, `private_key.pem` is persisted as an encrypted PKCS#8 block.
    /// SECURITY: keep this out of logs and version control.
    pub private_key_password: Option<String>,

    /// PBKDF2-SHA256 rounds for encrypted private key exports.
    pub pbkdf2_iterations: u32,
}

impl KeywardenConfig {
    /// Configuration rooted in the platform data directory.
    pub fn new(namespace: &str) -> Result<Self, KeywardenError> {
        let base_dir = dirs::data_dir().ok_or_else(|| {
            KeywardenError::ConfigError("Could not find data directory".to_string())
        })?;

        Ok(Self::for_directory(base_dir.join(namespace).join("keys")).with_namespace(namespace))
    }

    /// Configuration pinned to an explicit key directory.
    pub fn for_directory(key_store_dir: impl AsRef<Path>) -> Self {
        Self {
            namespace: "keywarden".to_string(),
            key_store_dir: key_store_dir.as_ref().to_path_buf(),
            key_size_bits: DEFAULT_KEY_SIZE_BITS,
            format_version: DEFAULT_FORMAT_VERSION.to_string(),
            private_key_password: None,
            pbkdf2_iterations: DEFAULT_PBKDF2_ITERATIONS,
        }
    }

    fn with_namespace(mut self, namespace: &str) -> Self {
        self.namespace = namespace.to_string();
        self
    }

    /// Encrypt the persisted private key with a password.
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.private_key_password = Some(password.into());
        self
    }

    /// Override the generated key size.
    pub fn with_key_size(mut self, bits: usize) -> Self {
        self.key_size_bits = bits;
        self
    }

    /// Validate configuration for obvious errors.
    pub fn validate(&self) -> Result<(), KeywardenError> {
        if self.namespace.is_empty() {
            return Err(KeywardenError::ConfigError(
                "namespace cannot be empty".to_string(),
            ));
        }
        if self.key_store_dir.as_os_str().is_empty() {
            return Err(KeywardenError::ConfigError(
                "key_store_dir cannot be empty".to_string(),
            ));
        }
        if !SUPPORTED_KEY_SIZES.contains(&self.key_size_bits) {
            return Err(KeywardenError::ConfigError(format!(
                "key_size_bits must be one of {:?}, got {}",
                SUPPORTED_KEY_SIZES, self.key_size_bits
            )));
        }
        if !crate::protocol::envelope::SUPPORTED_FORMAT_VERSIONS
            .contains(&self.format_version.as_str())
        {
            return Err(KeywardenError::ConfigError(format!(
                "format_version {} is not supported",
                self.format_version
            )));
        }
        if self.pbkdf2_iterations < MIN_PBKDF2_ITERATIONS {
            return Err(KeywardenError::ConfigError(format!(
                "pbkdf2_iterations must be at least {}, got {}",
                MIN_PBKDF2_ITERATIONS, self.pbkdf2_iterations
            )));
        }
        if matches!(self.private_key_password.as_deref(), Some("")) {
            return Err(KeywardenError::ConfigError(
                "private_key_password cannot be empty when set".to_string(),
            ));
        }
        Ok(())
    }
}
