//! Keywarden error types.

use std::fmt;
use thiserror::Error;

/// Errors that can occur while issuing, storing or verifying licenses.
#[derive(Debug, Error)]
pub enum KeywardenError {
    /// Configuration is invalid.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// A parameter is outside the supported range (e.g. key size).
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// No persisted key pair exists in the key store.
    #[error("Key not found: {0}")]
    KeyNotFound(String),

    /// Persisted or supplied PEM could not be parsed.
    #[error("Key corrupt: {0}")]
    KeyCorrupt(String),

    /// Key store I/O failed.
    #[error("Key store I/O error: {0}")]
    KeyIO(String),

    /// Password-protected export failed.
    #[error("Private key encryption failed: {0}")]
    EncryptionError(String),

    /// Password-protected import failed (usually a wrong password).
    #[error("Private key decryption failed: {0}")]
    DecryptionError(String),

    /// A caller-supplied key is not a usable RSA key.
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// The license request violates one or more payload rules.
    #[error("License request rejected: {0}")]
    Validation(ValidationErrors),

    /// Producing a signature failed.
    #[error("Signing failed: {0}")]
    SigningFailed(String),

    /// The envelope is missing fields or carries undecodable data.
    #[error("Malformed envelope: {0}")]
    MalformedEnvelope(String),

    /// The envelope format version is not understood.
    #[error("Unsupported envelope format version: {version}")]
    UnsupportedFormatVersion {
        /// The version string found in the envelope.
        version: String,
    },

    /// A lifecycle action is not permitted from the current status.
    #[error("Cannot {action} a license that is {from}")]
    InvalidTransition {
        /// Status the license was in.
        from: String,
        /// Action that was attempted.
        action: String,
    },

    /// The license is not valid for the requested use.
    #[error("Invalid or expired license")]
    InvalidLicense,

    /// A required feature is not part of the license.
    #[error("Required feature missing: {name}")]
    FeatureMissing {
        /// The feature that was required but missing.
        name: String,
    },

    /// A usage limit carried by the license would be exceeded.
    #[error("Usage limit exceeded: {0}")]
    UsageLimitExceeded(String),

    /// No record exists for the license.
    #[error("License not found: {license_id}")]
    LicenseNotFound {
        /// The license that was looked up.
        license_id: String,
    },

    /// Persistence or audit collaborator failed.
    #[error("Registry error: {0}")]
    Registry(String),
}

/// A single violated rule on a license request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    /// Request field the rule applies to (camelCase, as in the payload).
    pub field: &'static str,
    /// Short machine-readable rule code.
    pub rule: &'static str,
    /// Human-readable explanation.
    pub message: String,
}

impl ValidationIssue {
    pub(crate) fn new(field: &'static str, rule: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            rule,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Every rule a license request violated, in the order they were checked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationErrors(Vec<ValidationIssue>);

impl ValidationErrors {
    pub(crate) fn new(issues: Vec<ValidationIssue>) -> Self {
        Self(issues)
    }

    /// The individual violations.
    pub fn issues(&self) -> &[ValidationIssue] {
        &self.0
    }

    /// Whether a given rule code was violated.
    pub fn has_rule(&self, rule: &str) -> bool {
        self.0.iter().any(|issue| issue.rule == rule)
    }

    /// Number of violations.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always false for errors produced by the payload builder.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, issue) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{}", issue)?;
        }
        Ok(())
    }
}

impl From<ValidationErrors> for KeywardenError {
    fn from(errors: ValidationErrors) -> Self {
        KeywardenError::Validation(errors)
    }
}
