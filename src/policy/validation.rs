//! License request rules, checked before anything is serialized or signed.
//!
//! All rules run; the caller gets every violation at once.

use crate::errors::ValidationIssue;
use crate::policy::tiers;
use crate::protocol::models::{LicenseFeature, LicenseRequest};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashSet;

/// `validTo` at or before `now - EXPIRY_GRACE_DAYS` is rejected as already expired.
pub const EXPIRY_GRACE_DAYS: i64 = 1;

/// Check a request against the payload rules.
///
/// `resolved_features` is the list the payload would carry after tier
/// resolution; an empty list is itself a violation.
pub fn validate_request(
    request: &LicenseRequest,
    resolved_features: &[LicenseFeature],
    now: DateTime<Utc>,
) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();
    let licensee = &request.licensee;

    require_text(&mut issues, "licensedTo", &licensee.organization);
    require_text(&mut issues, "contactPerson", &licensee.contact_person);
    require_text(&mut issues, "contactEmail", &licensee.contact_email);

    let has_secondary_email = licensee
        .secondary_contact_email
        .as_deref()
        .is_some_and(|e| !e.trim().is_empty());
    let has_secondary_person = licensee
        .secondary_contact_person
        .as_deref()
        .is_some_and(|p| !p.trim().is_empty());
    if has_secondary_email && !has_secondary_person {
        issues.push(ValidationIssue::new(
            "secondaryContactPerson",
            "secondaryContact.incomplete",
            "a secondary contact email requires a secondary contact name",
        ));
    }

    if request.valid_from >= request.valid_to {
        issues.push(ValidationIssue::new(
            "validTo",
            "window.order",
            format!(
                "validTo ({}) must be after validFrom ({})",
                request.valid_to.to_rfc3339(),
                request.valid_from.to_rfc3339()
            ),
        ));
    }

    if request.valid_to <= now - Duration::days(EXPIRY_GRACE_DAYS) {
        issues.push(ValidationIssue::new(
            "validTo",
            "window.expired",
            format!("validTo ({}) is already in the past", request.valid_to.to_rfc3339()),
        ));
    }

    if tiers::default_limits(request.tier).is_none() {
        if request.max_api_calls_per_month.is_none() {
            issues.push(ValidationIssue::new(
                "maxApiCallsPerMonth",
                "limits.required",
                format!("{} licenses must state an API call limit", request.tier),
            ));
        }
        if request.max_concurrent_connections.is_none() {
            issues.push(ValidationIssue::new(
                "maxConcurrentConnections",
                "limits.required",
                format!("{} licenses must state a connection limit", request.tier),
            ));
        }
    }

    let mut seen = HashSet::new();
    for feature in &request.features {
        if feature.name.trim().is_empty() {
            issues.push(ValidationIssue::new(
                "featuresIncluded",
                "features.name",
                "feature names must not be empty",
            ));
        } else if !seen.insert(feature.name.as_str()) {
            issues.push(ValidationIssue::new(
                "featuresIncluded",
                "features.duplicate",
                format!("feature {} listed more than once", feature.name),
            ));
        }
    }

    if resolved_features.is_empty() {
        issues.push(ValidationIssue::new(
            "featuresIncluded",
            "features.required",
            "a license must include at least one feature",
        ));
    }

    issues
}

fn require_text(issues: &mut Vec<ValidationIssue>, field: &'static str, value: &str) {
    if value.trim().is_empty() {
        issues.push(ValidationIssue::new(field, "required", "must not be empty"));
    }
}
