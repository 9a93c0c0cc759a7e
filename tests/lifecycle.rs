//! License lifecycle through the service, as a consuming application sees it.

mod common;

use common::*;
use keywarden::{
    check_access, AuditOperation, KeywardenError, LicenseRepository, LicenseService,
    LicenseStatus, LicenseTier, MemoryAuditLog, MemoryLicenseRepository, RenewalOptions,
    StatusAction, VerificationFailure,
};
use std::sync::Arc;

struct World {
    clock: Arc<FixedClock>,
    repository: Arc<MemoryLicenseRepository>,
    audit: Arc<MemoryAuditLog>,
    service: LicenseService,
}

fn world() -> World {
    let clock = FixedClock::at(utc(2025, 1, 1));
    let issuer = Arc::new(issuer_with(key_a(), clock.clone()));
    let repository = Arc::new(MemoryLicenseRepository::new());
    let audit = Arc::new(MemoryAuditLog::new());
    let service = LicenseService::new(issuer, repository.clone(), audit.clone());
    World {
        clock,
        repository,
        audit,
        service,
    }
}

#[test]
fn test_gateway_admission_follows_status() {
    let w = world();
    let issued = w
        .service
        .issue_for("consumer-42", "gateway", &acme_request(), "admin@vendor.test")
        .unwrap();
    assert!(issued.recorded);

    let required = ["BasicApiGateway", "LoadBalancing"];
    let caps = check_access(&w.service.verify(&issued.envelope), &required).unwrap();
    assert_eq!(caps.max_api_calls_per_month, 100_000);
    assert!(caps.ensure_api_calls(99_999, 1).is_ok());
    assert!(matches!(
        caps.ensure_api_calls(100_000, 1),
        Err(KeywardenError::UsageLimitExceeded(_))
    ));
    assert!(matches!(
        check_access(&w.service.verify(&issued.envelope), &["SingleSignOn"]),
        Err(KeywardenError::FeatureMissing { name }) if name == "SingleSignOn"
    ));

    let id = issued.payload.license_id;
    w.service.suspend(id, "support@vendor.test").unwrap();
    let result = w.service.verify(&issued.envelope);
    assert_eq!(result.reason, Some(VerificationFailure::Suspended));
    assert!(matches!(check_access(&result, &required), Err(KeywardenError::InvalidLicense)));

    w.service.reactivate(id, "support@vendor.test").unwrap();
    assert!(check_access(&w.service.verify(&issued.envelope), &required).is_ok());

    w.service.revoke(id, "legal@vendor.test").unwrap();
    assert_eq!(
        w.service.verify(&issued.envelope).reason,
        Some(VerificationFailure::Revoked)
    );
    assert!(matches!(
        w.service.reactivate(id, "support@vendor.test"),
        Err(KeywardenError::InvalidTransition { .. })
    ));

    let operations: Vec<AuditOperation> = w.audit.entries().iter().map(|e| e.operation).collect();
    assert_eq!(
        operations,
        vec![
            AuditOperation::Issue,
            AuditOperation::Status(StatusAction::Suspend),
            AuditOperation::Status(StatusAction::Reactivate),
            AuditOperation::Status(StatusAction::Revoke),
        ]
    );
}

#[test]
fn test_unrecorded_license_verifies_as_not_found() {
    let w = world();
    let stray = w.service.issuer().issue(&acme_request()).unwrap();

    let result = w.service.verify(&stray.envelope);
    assert!(!result.valid);
    assert_eq!(result.reason, Some(VerificationFailure::NotFound));
    assert_eq!(w.service.status(stray.payload.license_id).unwrap(), LicenseStatus::NotFound);
}

#[test]
fn test_expiry_sweep_then_renewal() {
    let w = world();
    let first = w
        .service
        .issue_for("consumer-42", "gateway", &acme_request(), "admin")
        .unwrap();
    let id = first.payload.license_id;

    // Still inside the window: nothing to expire
    assert!(w.service.expire_due(utc(2025, 12, 31)).unwrap().is_empty());

    w.clock.set(utc(2026, 1, 2));
    assert_eq!(w.service.expire_due(utc(2026, 1, 1)).unwrap(), vec![id]);
    assert_eq!(w.service.status(id).unwrap(), LicenseStatus::Expired);
    assert_eq!(
        w.service.verify(&first.envelope).reason,
        Some(VerificationFailure::Expired)
    );

    let options = RenewalOptions::new(utc(2026, 1, 1), utc(2027, 1, 1)).with_tier(LicenseTier::Enterprise);
    let renewed = w.service.renew(id, &options, "sales").unwrap();
    assert!(renewed.recorded);
    assert_eq!(renewed.payload.tier, LicenseTier::Enterprise);
    assert!(renewed.payload.has_feature("SingleSignOn"));
    assert_eq!(renewed.payload.licensed_to, "Acme Corp");
    assert_eq!(renewed.payload.metadata["renewedFrom"], id.to_string());
    assert!(w.service.verify(&renewed.envelope).valid);

    // An expired predecessor keeps its status
    assert_eq!(w.service.status(id).unwrap(), LicenseStatus::Expired);

    let history = w.repository.find_by_consumer("consumer-42").unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[1].renewed_from, Some(id));
    assert_eq!(history[1].product_id, "gateway");
}

#[test]
fn test_renewing_active_license_archives_it() {
    let w = world();
    let first = w
        .service
        .issue_for("consumer-7", "gateway", &acme_request(), "admin")
        .unwrap();
    let id = first.payload.license_id;

    let options = RenewalOptions::new(utc(2026, 1, 1), utc(2027, 1, 1));
    let renewed = w.service.renew(id, &options, "sales").unwrap();
    assert_eq!(renewed.payload.tier, LicenseTier::Professional);
    assert_eq!(renewed.payload.features_included, first.payload.features_included);

    assert_eq!(w.service.status(id).unwrap(), LicenseStatus::Archived);
    assert_eq!(
        w.service.verify(&first.envelope).reason,
        Some(VerificationFailure::Archived)
    );
    assert!(matches!(
        w.service.renew(id, &options, "sales"),
        Err(KeywardenError::InvalidTransition { .. })
    ));
}

#[test]
fn test_missing_license_operations() {
    let w = world();
    let unknown = uuid::Uuid::new_v4();
    assert!(matches!(
        w.service.suspend(unknown, "admin"),
        Err(KeywardenError::LicenseNotFound { .. })
    ));
    let options = RenewalOptions::new(utc(2026, 1, 1), utc(2027, 1, 1));
    assert!(matches!(
        w.service.renew(unknown, &options, "admin"),
        Err(KeywardenError::LicenseNotFound { .. })
    ));
    assert!(w.audit.entries().is_empty());
}
