//! In-process registry backends.

use crate::policy::status::LicenseStatus;
use crate::registry::{AuditEntry, AuditLog, LicenseRecord, LicenseRepository};
use crate::KeywardenError;
use std::collections::HashMap;
use std::sync::{Mutex, RwLock};
use uuid::Uuid;

fn poisoned(what: &str) -> KeywardenError {
    KeywardenError::Registry(format!("{} lock poisoned", what))
}

/// Licenses held in a map.
#[derive(Debug, Default)]
pub struct MemoryLicenseRepository {
    records: RwLock<HashMap<Uuid, LicenseRecord>>,
}

impl MemoryLicenseRepository {
    /// An empty repository.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.records.read().map(|r| r.len()).unwrap_or(0)
    }

    /// Whether nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn select(&self, keep: impl Fn(&LicenseRecord) -> bool) -> Result<Vec<LicenseRecord>, KeywardenError> {
        let records = self.records.read().map_err(|_| poisoned("repository"))?;
        let mut found: Vec<LicenseRecord> = records.values().filter(|r| keep(r)).cloned().collect();
        found.sort_by_key(|r| (r.payload.issued_at, r.license_id()));
        Ok(found)
    }
}

impl LicenseRepository for MemoryLicenseRepository {
    fn save(&self, record: LicenseRecord) -> Result<(), KeywardenError> {
        let mut records = self.records.write().map_err(|_| poisoned("repository"))?;
        let license_id = record.license_id();
        if records.contains_key(&license_id) {
            return Err(KeywardenError::Registry(format!(
                "license {} is already recorded",
                license_id
            )));
        }
        records.insert(license_id, record);
        Ok(())
    }

    fn update_status(&self, license_id: Uuid, status: LicenseStatus) -> Result<(), KeywardenError> {
        let mut records = self.records.write().map_err(|_| poisoned("repository"))?;
        let record = records
            .get_mut(&license_id)
            .ok_or_else(|| KeywardenError::Registry(format!("license {} is not recorded", license_id)))?;
        record.status = status;
        Ok(())
    }

    fn find_by_id(&self, license_id: Uuid) -> Result<Option<LicenseRecord>, KeywardenError> {
        let records = self.records.read().map_err(|_| poisoned("repository"))?;
        Ok(records.get(&license_id).cloned())
    }

    fn find_by_consumer(&self, consumer_id: &str) -> Result<Vec<LicenseRecord>, KeywardenError> {
        self.select(|r| r.consumer_id == consumer_id)
    }

    fn find_by_product(&self, product_id: &str) -> Result<Vec<LicenseRecord>, KeywardenError> {
        self.select(|r| r.product_id == product_id)
    }

    fn find_by_status(&self, status: LicenseStatus) -> Result<Vec<LicenseRecord>, KeywardenError> {
        self.select(|r| r.status == status)
    }
}

/// Audit entries held in a vector.
#[derive(Debug, Default)]
pub struct MemoryAuditLog {
    entries: Mutex<Vec<AuditEntry>>,
}

impl MemoryAuditLog {
    /// An empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all entries in append order.
    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries.lock().map(|e| e.clone()).unwrap_or_default()
    }
}

impl AuditLog for MemoryAuditLog {
    fn append(&self, entry: AuditEntry) -> Result<(), KeywardenError> {
        tracing::debug!(
            operation = %entry.operation,
            license_id = %entry.license_id,
            actor = %entry.actor,
            "Audit entry"
        );
        self.entries.lock().map_err(|_| poisoned("audit log"))?.push(entry);
        Ok(())
    }
}
