//! License business objects: tiers, features, requests and the signed payload.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Ordinal license grade. Declaration order is the rank:
/// Community < Professional < Enterprise < Custom.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum LicenseTier {
    /// Free tier with the basic gateway feature set.
    Community,
    /// Community plus traffic management and analytics.
    Professional,
    /// Professional plus enterprise integration and compliance.
    Enterprise,
    /// Exactly the features the issuer lists; no defaults.
    Custom,
}

impl LicenseTier {
    /// All tiers in rank order.
    pub const ALL: [LicenseTier; 4] = [
        LicenseTier::Community,
        LicenseTier::Professional,
        LicenseTier::Enterprise,
        LicenseTier::Custom,
    ];

    /// Whether a license of this tier satisfies a feature gated at `minimum`.
    pub fn includes(self, minimum: LicenseTier) -> bool {
        self >= minimum
    }

    /// Whether this tier derives its defaults from the tier lattice.
    pub fn is_standard(self) -> bool {
        !matches!(self, LicenseTier::Custom)
    }

    /// Tier name as written in payloads.
    pub fn as_str(self) -> &'static str {
        match self {
            LicenseTier::Community => "Community",
            LicenseTier::Professional => "Professional",
            LicenseTier::Enterprise => "Enterprise",
            LicenseTier::Custom => "Custom",
        }
    }
}

impl fmt::Display for LicenseTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for LicenseTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        LicenseTier::ALL
            .into_iter()
            .find(|tier| tier.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown license tier: {}", s))
    }
}

/// A named capability granted by a license.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LicenseFeature {
    /// Capability name, e.g. `LoadBalancing`.
    pub name: String,

    /// Human-readable description.
    #[serde(default)]
    pub description: String,

    /// Lowest tier that includes this feature by default.
    pub minimum_tier: LicenseTier,

    /// Optional per-feature quotas, keyed by limit name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub usage_limits: BTreeMap<String, u64>,
}

impl LicenseFeature {
    /// A feature with no usage limits.
    pub fn new(name: impl Into<String>, description: impl Into<String>, minimum_tier: LicenseTier) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            minimum_tier,
            usage_limits: BTreeMap::new(),
        }
    }

    /// Attach a usage limit.
    pub fn with_limit(mut self, limit: impl Into<String>, value: u64) -> Self {
        self.usage_limits.insert(limit.into(), value);
        self
    }
}

/// Who a license is issued to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Licensee {
    /// Licensed organization.
    pub organization: String,
    /// Primary contact name.
    pub contact_person: String,
    /// Primary contact email.
    pub contact_email: String,
    /// Secondary contact name.
    pub secondary_contact_person: Option<String>,
    /// Secondary contact email.
    pub secondary_contact_email: Option<String>,
}

impl Licensee {
    /// Licensee with a primary contact only.
    pub fn new(
        organization: impl Into<String>,
        contact_person: impl Into<String>,
        contact_email: impl Into<String>,
    ) -> Self {
        Self {
            organization: organization.into(),
            contact_person: contact_person.into(),
            contact_email: contact_email.into(),
            secondary_contact_person: None,
            secondary_contact_email: None,
        }
    }

    /// Add a secondary contact.
    pub fn with_secondary_contact(mut self, person: impl Into<String>, email: impl Into<String>) -> Self {
        self.secondary_contact_person = Some(person.into());
        self.secondary_contact_email = Some(email.into());
        self
    }
}

/// Input to license generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LicenseRequest {
    /// Pre-assigned identifier; a random v4 UUID is used when absent.
    pub license_id: Option<Uuid>,
    /// Licensee identity.
    pub licensee: Licensee,
    /// Start of validity.
    pub valid_from: DateTime<Utc>,
    /// End of validity.
    pub valid_to: DateTime<Utc>,
    /// License grade.
    pub tier: LicenseTier,
    /// Monthly API call limit; tier default when absent.
    pub max_api_calls_per_month: Option<u64>,
    /// Concurrent connection limit; tier default when absent.
    pub max_concurrent_connections: Option<u32>,
    /// Custom tier: the complete feature list. Other tiers: extras on top of
    /// the tier defaults.
    pub features: Vec<LicenseFeature>,
    /// Free-form metadata carried into the payload.
    pub metadata: BTreeMap<String, String>,
}

impl LicenseRequest {
    /// Request with tier-default limits and features.
    pub fn new(
        licensee: Licensee,
        valid_from: DateTime<Utc>,
        valid_to: DateTime<Utc>,
        tier: LicenseTier,
    ) -> Self {
        Self {
            license_id: None,
            licensee,
            valid_from,
            valid_to,
            tier,
            max_api_calls_per_month: None,
            max_concurrent_connections: None,
            features: Vec::new(),
            metadata: BTreeMap::new(),
        }
    }

    /// Add a feature.
    pub fn with_feature(mut self, feature: LicenseFeature) -> Self {
        self.features.push(feature);
        self
    }

    /// Override both numeric limits.
    pub fn with_limits(mut self, max_api_calls_per_month: u64, max_concurrent_connections: u32) -> Self {
        self.max_api_calls_per_month = Some(max_api_calls_per_month);
        self.max_concurrent_connections = Some(max_concurrent_connections);
        self
    }

    /// Add a metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Pin the license id.
    pub fn with_license_id(mut self, license_id: Uuid) -> Self {
        self.license_id = Some(license_id);
        self
    }
}

/// The signed business object.
///
/// Field declaration order is the canonical serialization order; maps are
/// `BTreeMap` so their keys serialize sorted. Do not reorder fields: it would
/// change the bytes every existing signature was computed over.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LicensePayload {
    /// Unique per issuance.
    pub license_id: Uuid,
    /// Licensed organization.
    pub licensed_to: String,
    /// Primary contact name.
    pub contact_person: String,
    /// Primary contact email.
    pub contact_email: String,
    /// Secondary contact name.
    #[serde(default)]
    pub secondary_contact_person: Option<String>,
    /// Secondary contact email.
    #[serde(default)]
    pub secondary_contact_email: Option<String>,
    /// Start of validity.
    pub valid_from: DateTime<Utc>,
    /// End of validity.
    pub valid_to: DateTime<Utc>,
    /// License grade.
    pub tier: LicenseTier,
    /// Monthly API call limit.
    pub max_api_calls_per_month: u64,
    /// Concurrent connection limit.
    pub max_concurrent_connections: u32,
    /// Granted capabilities.
    pub features_included: Vec<LicenseFeature>,
    /// When the payload was built.
    pub issued_at: DateTime<Utc>,
    /// Free-form metadata.
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl LicensePayload {
    /// Whether a feature of this name is granted.
    pub fn has_feature(&self, name: &str) -> bool {
        self.feature(name).is_some()
    }

    /// Look up a granted feature by name.
    pub fn feature(&self, name: &str) -> Option<&LicenseFeature> {
        self.features_included.iter().find(|f| f.name == name)
    }

    /// Whether `now` falls inside `[valid_from, valid_to)`.
    pub fn is_within_validity(&self, now: DateTime<Utc>) -> bool {
        self.valid_from <= now && now < self.valid_to
    }

    /// The licensee identity this payload was issued to.
    pub fn licensee(&self) -> Licensee {
        Licensee {
            organization: self.licensed_to.clone(),
            contact_person: self.contact_person.clone(),
            contact_email: self.contact_email.clone(),
            secondary_contact_person: self.secondary_contact_person.clone(),
            secondary_contact_email: self.secondary_contact_email.clone(),
        }
    }
}
