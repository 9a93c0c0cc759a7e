//! License lifecycle state machine.
//!
//! ```text
//!   Active ──suspend──▶ Suspended
//!   Active ◀─reactivate─ Suspended
//!   Active ──revoke───▶ Revoked   (terminal)
//!   Active ──expire───▶ Expired   (no rights, record kept)
//!   Active ──archive──▶ Archived  (terminal, superseded by a renewal)
//! ```
//!
//! Status lives beside the envelope, never inside it: changing it does not
//! touch the signature.

use crate::KeywardenError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of an issued license.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LicenseStatus {
    /// Issued and honored.
    Active,
    /// Temporarily not honored; may be reactivated.
    Suspended,
    /// Validity window has passed.
    Expired,
    /// Permanently withdrawn.
    Revoked,
    /// Superseded by a renewal.
    Archived,
    /// No record exists for the license.
    NotFound,
}

/// A lifecycle operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StatusAction {
    /// Active to Suspended.
    Suspend,
    /// Suspended to Active.
    Reactivate,
    /// Active to Revoked.
    Revoke,
    /// Active to Expired.
    Expire,
    /// Active to Archived.
    Archive,
}

impl LicenseStatus {
    /// Only an active license grants rights.
    pub fn grants_rights(self) -> bool {
        matches!(self, LicenseStatus::Active)
    }

    /// No action leads out of this status.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            LicenseStatus::Revoked | LicenseStatus::Archived | LicenseStatus::Expired | LicenseStatus::NotFound
        )
    }

    /// Status reached by applying `action`.
    ///
    /// # Errors
    /// * `InvalidTransition` - `action` is not permitted from this status
    pub fn transition(self, action: StatusAction) -> Result<LicenseStatus, KeywardenError> {
        let next = match (self, action) {
            (LicenseStatus::Active, StatusAction::Suspend) => LicenseStatus::Suspended,
            (LicenseStatus::Suspended, StatusAction::Reactivate) => LicenseStatus::Active,
            (LicenseStatus::Active, StatusAction::Revoke) => LicenseStatus::Revoked,
            (LicenseStatus::Active, StatusAction::Expire) => LicenseStatus::Expired,
            (LicenseStatus::Active, StatusAction::Archive) => LicenseStatus::Archived,
            (from, action) => {
                return Err(KeywardenError::InvalidTransition {
                    from: from.to_string(),
                    action: action.to_string(),
                })
            }
        };
        Ok(next)
    }

    /// Status name.
    pub fn as_str(self) -> &'static str {
        match self {
            LicenseStatus::Active => "Active",
            LicenseStatus::Suspended => "Suspended",
            LicenseStatus::Expired => "Expired",
            LicenseStatus::Revoked => "Revoked",
            LicenseStatus::Archived => "Archived",
            LicenseStatus::NotFound => "NotFound",
        }
    }
}

impl fmt::Display for LicenseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for StatusAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StatusAction::Suspend => "suspend",
            StatusAction::Reactivate => "reactivate",
            StatusAction::Revoke => "revoke",
            StatusAction::Expire => "expire",
            StatusAction::Archive => "archive",
        })
    }
}
