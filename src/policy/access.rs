//! Feature and usage cap enforcement on verified licenses.
//!
//! This module enforces access policies based on:
//! - Verification outcome (the envelope must have verified)
//! - Required features (all must be present)
//! - Usage caps (monthly API calls, concurrent connections)

use crate::crypto::pipeline::VerificationResult;
use crate::protocol::models::{LicenseFeature, LicensePayload};
use crate::KeywardenError;

/// Look up a required feature on a payload.
///
/// # Returns
/// * `Ok(feature)` - The feature is granted
/// * `Err(FeatureMissing)` - It is not
pub fn check_feature<'a>(payload: &'a LicensePayload, name: &str) -> Result<&'a LicenseFeature, KeywardenError> {
    payload.feature(name).ok_or_else(|| KeywardenError::FeatureMissing {
        name: name.to_string(),
    })
}

/// Check that a verification result meets all access requirements.
///
/// # Arguments
/// * `result` - Outcome of envelope verification
/// * `required_features` - Feature names that must all be present
///
/// # Returns
/// * `Ok(caps)` - Access granted; the license's usage caps
/// * `Err(InvalidLicense)` - The envelope did not verify
/// * `Err(FeatureMissing)` - Required feature not found
pub fn check_access(
    result: &VerificationResult,
    required_features: &[&str],
) -> Result<UsageCaps, KeywardenError> {
    // 1. Check license is valid
    let payload = match (&result.payload, result.valid) {
        (Some(payload), true) => payload,
        _ => return Err(KeywardenError::InvalidLicense),
    };

    // 2. Check all required features are present
    for required in required_features {
        check_feature(payload, required)?;
    }

    Ok(UsageCaps::from_payload(payload))
}

/// Numeric limits carried by a license.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsageCaps {
    /// Monthly API call limit.
    pub max_api_calls_per_month: u64,

    /// Concurrent connection limit.
    pub max_concurrent_connections: u32,
}

impl UsageCaps {
    /// Extract caps from a payload.
    pub fn from_payload(payload: &LicensePayload) -> Self {
        Self {
            max_api_calls_per_month: payload.max_api_calls_per_month,
            max_concurrent_connections: payload.max_concurrent_connections,
        }
    }

    /// Whether `additional` calls fit in this month's allowance.
    ///
    /// # Arguments
    /// * `current` - Calls already made this month
    /// * `additional` - How many new calls to check for
    pub fn allows_api_calls(&self, current: u64, additional: u64) -> bool {
        current
            .checked_add(additional)
            .is_some_and(|total| total <= self.max_api_calls_per_month)
    }

    /// Whether `connections` simultaneous connections are permitted.
    pub fn allows_connections(&self, connections: u32) -> bool {
        connections <= self.max_concurrent_connections
    }

    /// Like [`allows_api_calls`](Self::allows_api_calls), as a `Result`.
    pub fn ensure_api_calls(&self, current: u64, additional: u64) -> Result<(), KeywardenError> {
        if self.allows_api_calls(current, additional) {
            Ok(())
        } else {
            Err(KeywardenError::UsageLimitExceeded(format!(
                "{} + {} API calls exceeds the monthly limit of {}",
                current, additional, self.max_api_calls_per_month
            )))
        }
    }
}
