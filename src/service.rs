//! License management service: issuance plus lifecycle bookkeeping.
//!
//! Signing and recording are separate outcomes. Once an envelope is signed it
//! is returned to the caller even if the repository or audit log then fails;
//! the failure is logged and reported through [`IssuanceOutcome::recorded`]
//! for the caller to reconcile.

use crate::clock::Clock;
use crate::crypto::keyring::KeyRing;
use crate::crypto::pipeline::VerificationResult;
use crate::issuer::{renewal_request, IssuedLicense, LicenseIssuer, RenewalOptions};
use crate::policy::status::{LicenseStatus, StatusAction};
use crate::protocol::envelope::SignedLicenseEnvelope;
use crate::protocol::models::{LicensePayload, LicenseRequest};
use crate::registry::{AuditEntry, AuditLog, AuditOperation, LicenseRecord, LicenseRepository};
use crate::KeywardenError;
use chrono::{DateTime, Utc};
use rsa::RsaPublicKey;
use std::sync::{Arc, RwLock};
use uuid::Uuid;

/// Actor recorded for time-driven expiry.
pub const EXPIRY_ACTOR: &str = "system:expiry";

/// Result of issuing through the service.
#[derive(Debug, Clone)]
pub struct IssuanceOutcome {
    /// The signed artifact. Valid regardless of `recorded`.
    pub envelope: SignedLicenseEnvelope,
    /// The payload inside the envelope.
    pub payload: LicensePayload,
    /// Whether the record and audit entries were all written.
    pub recorded: bool,
}

/// Issues licenses and keeps their lifecycle state.
pub struct LicenseService {
    issuer: Arc<LicenseIssuer>,
    repository: Arc<dyn LicenseRepository>,
    audit: Arc<dyn AuditLog>,
    trusted: RwLock<KeyRing>,
}

impl LicenseService {
    /// Wire the service to its collaborators.
    pub fn new(
        issuer: Arc<LicenseIssuer>,
        repository: Arc<dyn LicenseRepository>,
        audit: Arc<dyn AuditLog>,
    ) -> Self {
        Self {
            issuer,
            repository,
            audit,
            trusted: RwLock::new(KeyRing::new()),
        }
    }

    /// The issuer used for signing.
    pub fn issuer(&self) -> &Arc<LicenseIssuer> {
        &self.issuer
    }

    /// Also accept licenses signed by `public_key`, e.g. the key of a previous
    /// deployment. Keys retired by this service's own store are always
    /// accepted. Returns the key's thumbprint.
    pub fn trust_key(&self, public_key: RsaPublicKey) -> Result<String, KeywardenError> {
        let thumbprint = self
            .trusted
            .write()
            .map_err(|_| KeywardenError::Registry("trusted key lock poisoned".to_string()))?
            .insert(public_key)?;
        tracing::info!(thumbprint = %thumbprint, "Trusting additional verification key");
        Ok(thumbprint)
    }

    /// Issue a license to a consumer for a product and record it as Active.
    ///
    /// # Errors
    /// Only issuance errors (`Validation`, `SigningFailed`, ...). Bookkeeping
    /// failures show up as `recorded == false`.
    pub fn issue_for(
        &self,
        consumer_id: &str,
        product_id: &str,
        request: &LicenseRequest,
        actor: &str,
    ) -> Result<IssuanceOutcome, KeywardenError> {
        let issued = self.issuer.issue(request)?;
        let recorded = self.record_issued(&issued, consumer_id, product_id, None, actor);
        Ok(outcome(issued, recorded))
    }

    /// Issue the successor of an existing license.
    ///
    /// The previous license must be Active or Expired. An Active predecessor
    /// is archived once the successor is signed; an Expired one keeps its
    /// status.
    ///
    /// # Errors
    /// * `LicenseNotFound` - No record for `license_id`
    /// * `InvalidTransition` - The previous license is Suspended, Revoked or Archived
    /// * Any issuance error
    pub fn renew(
        &self,
        license_id: Uuid,
        options: &RenewalOptions,
        actor: &str,
    ) -> Result<IssuanceOutcome, KeywardenError> {
        let previous = self.find(license_id)?;
        if !matches!(previous.status, LicenseStatus::Active | LicenseStatus::Expired) {
            return Err(KeywardenError::InvalidTransition {
                from: previous.status.to_string(),
                action: "renew".to_string(),
            });
        }

        let request = renewal_request(&previous.payload, options);
        let issued = self.issuer.issue(&request)?;

        let mut recorded = self.record_issued(
            &issued,
            &previous.consumer_id,
            &previous.product_id,
            Some(license_id),
            actor,
        );

        if previous.status == LicenseStatus::Active {
            if let Err(e) = self.apply(&previous, StatusAction::Archive, actor) {
                tracing::warn!(
                    license_id = %license_id,
                    error = %e,
                    "Renewed license could not be archived"
                );
                recorded = false;
            }
        }

        Ok(outcome(issued, recorded))
    }

    /// Active to Suspended.
    pub fn suspend(&self, license_id: Uuid, actor: &str) -> Result<LicenseStatus, KeywardenError> {
        self.transition(license_id, StatusAction::Suspend, actor)
    }

    /// Suspended to Active.
    pub fn reactivate(&self, license_id: Uuid, actor: &str) -> Result<LicenseStatus, KeywardenError> {
        self.transition(license_id, StatusAction::Reactivate, actor)
    }

    /// Active to Revoked.
    pub fn revoke(&self, license_id: Uuid, actor: &str) -> Result<LicenseStatus, KeywardenError> {
        self.transition(license_id, StatusAction::Revoke, actor)
    }

    /// Move every Active license whose `validTo` is at or before `now` to
    /// Expired. Returns the ids that were expired.
    ///
    /// A license whose update fails is logged and skipped; the sweep carries
    /// on and the next sweep picks it up again.
    ///
    /// # Errors
    /// Only when the Active licenses cannot be listed.
    pub fn expire_due(&self, now: DateTime<Utc>) -> Result<Vec<Uuid>, KeywardenError> {
        let mut expired = Vec::new();
        let mut failed = 0usize;
        for record in self.repository.find_by_status(LicenseStatus::Active)? {
            if record.payload.valid_to > now {
                continue;
            }
            match self.apply(&record, StatusAction::Expire, EXPIRY_ACTOR) {
                Ok(_) => expired.push(record.license_id()),
                Err(e) => {
                    failed += 1;
                    tracing::warn!(
                        license_id = %record.license_id(),
                        error = %e,
                        "Could not expire license"
                    );
                }
            }
        }
        if !expired.is_empty() || failed > 0 {
            tracing::info!(
                count = expired.len(),
                failed = failed,
                "Expired licenses past their validity window"
            );
        }
        Ok(expired)
    }

    /// Current status; `NotFound` when there is no record.
    pub fn status(&self, license_id: Uuid) -> Result<LicenseStatus, KeywardenError> {
        Ok(self
            .repository
            .find_by_id(license_id)?
            .map(|r| r.status)
            .unwrap_or(LicenseStatus::NotFound))
    }

    /// Verify an envelope and apply the recorded status of the license it carries.
    ///
    /// Accepts the issuer's active key, keys it has retired, and keys added
    /// with [`trust_key`](Self::trust_key).
    pub fn verify(&self, envelope: &SignedLicenseEnvelope) -> VerificationResult {
        let trusted = match self.trusted.read() {
            Ok(ring) => ring.clone(),
            Err(_) => {
                tracing::warn!("Trusted key lock poisoned; verifying with issuer keys only");
                KeyRing::new()
            }
        };
        let result = self.issuer.verifier_with(trusted).verify(envelope, None);
        let Some(license_id) = result.payload.as_ref().map(|p| p.license_id) else {
            return result;
        };

        match self.status(license_id) {
            Ok(status) => result.with_status(status),
            Err(e) => {
                tracing::warn!(license_id = %license_id, error = %e, "Status lookup failed");
                result.with_status(LicenseStatus::NotFound)
            }
        }
    }

    fn find(&self, license_id: Uuid) -> Result<LicenseRecord, KeywardenError> {
        self.repository
            .find_by_id(license_id)?
            .ok_or_else(|| KeywardenError::LicenseNotFound {
                license_id: license_id.to_string(),
            })
    }

    fn transition(
        &self,
        license_id: Uuid,
        action: StatusAction,
        actor: &str,
    ) -> Result<LicenseStatus, KeywardenError> {
        let record = self.find(license_id)?;
        self.apply(&record, action, actor)
    }

    fn apply(
        &self,
        record: &LicenseRecord,
        action: StatusAction,
        actor: &str,
    ) -> Result<LicenseStatus, KeywardenError> {
        let license_id = record.license_id();
        let next = record.status.transition(action)?;
        self.repository.update_status(license_id, next)?;
        tracing::info!(
            license_id = %license_id,
            from = %record.status,
            to = %next,
            actor = actor,
            "License status changed"
        );

        let entry = AuditEntry {
            operation: AuditOperation::Status(action),
            actor: actor.to_string(),
            license_id,
            previous_status: Some(record.status),
            new_status: next,
            timestamp: self.issuer.clock().now_utc(),
        };
        if let Err(e) = self.audit.append(entry) {
            tracing::warn!(license_id = %license_id, error = %e, "Audit entry not written");
        }
        Ok(next)
    }

    fn record_issued(
        &self,
        issued: &IssuedLicense,
        consumer_id: &str,
        product_id: &str,
        renewed_from: Option<Uuid>,
        actor: &str,
    ) -> bool {
        let license_id = issued.payload.license_id;
        let record = LicenseRecord {
            payload: issued.payload.clone(),
            envelope: issued.envelope.clone(),
            status: LicenseStatus::Active,
            consumer_id: consumer_id.to_string(),
            product_id: product_id.to_string(),
            renewed_from,
        };

        let mut recorded = true;
        if let Err(e) = self.repository.save(record) {
            tracing::warn!(license_id = %license_id, error = %e, "Signed license not recorded");
            recorded = false;
        }

        let entry = AuditEntry {
            operation: if renewed_from.is_some() {
                AuditOperation::Renew
            } else {
                AuditOperation::Issue
            },
            actor: actor.to_string(),
            license_id,
            previous_status: None,
            new_status: LicenseStatus::Active,
            timestamp: issued.payload.issued_at,
        };
        if let Err(e) = self.audit.append(entry) {
            tracing::warn!(license_id = %license_id, error = %e, "Audit entry not written");
            recorded = false;
        }
        recorded
    }
}

fn outcome(issued: IssuedLicense, recorded: bool) -> IssuanceOutcome {
    IssuanceOutcome {
        envelope: issued.envelope,
        payload: issued.payload,
        recorded,
    }
}
