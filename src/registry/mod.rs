//! Collaborators that record issued licenses and their history.
//!
//! The signing core never depends on these: a license is valid the moment
//! its envelope is signed. The [`LicenseService`](crate::service::LicenseService)
//! writes here afterwards and reports whether it managed to.

pub mod memory;

use crate::policy::status::{LicenseStatus, StatusAction};
use crate::protocol::envelope::SignedLicenseEnvelope;
use crate::protocol::models::LicensePayload;
use crate::KeywardenError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

pub use memory::{MemoryAuditLog, MemoryLicenseRepository};

/// A license as the issuing side remembers it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LicenseRecord {
    /// The signed payload.
    pub payload: LicensePayload,
    /// The artifact handed to the consumer.
    pub envelope: SignedLicenseEnvelope,
    /// Current lifecycle status.
    pub status: LicenseStatus,
    /// Consumer the license was issued to.
    pub consumer_id: String,
    /// Product the license covers.
    pub product_id: String,
    /// License this one renewed, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub renewed_from: Option<Uuid>,
}

impl LicenseRecord {
    /// Shorthand for `payload.license_id`.
    pub fn license_id(&self) -> Uuid {
        self.payload.license_id
    }
}

/// What happened to a license.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AuditOperation {
    /// A new license was signed.
    Issue,
    /// A license was signed to replace an earlier one.
    Renew,
    /// A lifecycle transition.
    Status(StatusAction),
}

impl fmt::Display for AuditOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuditOperation::Issue => f.write_str("issue"),
            AuditOperation::Renew => f.write_str("renew"),
            AuditOperation::Status(action) => write!(f, "{}", action),
        }
    }
}

/// One line of the audit trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    /// What was done.
    pub operation: AuditOperation,
    /// Who did it.
    pub actor: String,
    /// Which license.
    pub license_id: Uuid,
    /// Status before; `None` for a new license.
    pub previous_status: Option<LicenseStatus>,
    /// Status after.
    pub new_status: LicenseStatus,
    /// When.
    pub timestamp: DateTime<Utc>,
}

/// Storage for issued licenses.
pub trait LicenseRepository: Send + Sync {
    /// Store a new record.
    ///
    /// # Errors
    /// * `Registry` - A record with the same license id exists, or storage failed
    fn save(&self, record: LicenseRecord) -> Result<(), KeywardenError>;

    /// Overwrite the status of a stored record.
    fn update_status(&self, license_id: Uuid, status: LicenseStatus) -> Result<(), KeywardenError>;

    /// Look up a record.
    fn find_by_id(&self, license_id: Uuid) -> Result<Option<LicenseRecord>, KeywardenError>;

    /// All records of a consumer, oldest issuance first.
    fn find_by_consumer(&self, consumer_id: &str) -> Result<Vec<LicenseRecord>, KeywardenError>;

    /// All records of a product, oldest issuance first.
    fn find_by_product(&self, product_id: &str) -> Result<Vec<LicenseRecord>, KeywardenError>;

    /// All records currently in `status`, oldest issuance first.
    fn find_by_status(&self, status: LicenseStatus) -> Result<Vec<LicenseRecord>, KeywardenError>;
}

/// Append-only trail of license operations.
pub trait AuditLog: Send + Sync {
    /// Record an entry.
    fn append(&self, entry: AuditEntry) -> Result<(), KeywardenError>;
}
