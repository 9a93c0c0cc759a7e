//! Tier lattice: default feature sets and limits per license tier.
//!
//! Each standard tier adds features on top of the tier below it, so the
//! default sets are monotonic: Community ⊆ Professional ⊆ Enterprise.
//! `Custom` sits outside the lattice and gets no defaults at all.

use crate::protocol::models::{LicenseFeature, LicenseTier};
use once_cell::sync::Lazy;

/// Default numeric limits of a standard tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierLimits {
    /// Monthly API call limit.
    pub max_api_calls_per_month: u64,
    /// Concurrent connection limit.
    pub max_concurrent_connections: u32,
}

struct FeatureSpec {
    name: &'static str,
    description: &'static str,
    tier: LicenseTier,
    usage_limits: &'static [(&'static str, u64)],
}

/// Features added at each tier, lowest tier first.
const CATALOG: &[FeatureSpec] = &[
    FeatureSpec {
        name: "BasicApiGateway",
        description: "Request routing and reverse proxying for registered APIs",
        tier: LicenseTier::Community,
        usage_limits: &[],
    },
    FeatureSpec {
        name: "ApiKeyAuthentication",
        description: "Consumer authentication with API keys",
        tier: LicenseTier::Community,
        usage_limits: &[],
    },
    FeatureSpec {
        name: "RateLimiting",
        description: "Per-consumer request rate limiting",
        tier: LicenseTier::Community,
        usage_limits: &[("rules", 10)],
    },
    FeatureSpec {
        name: "LoadBalancing",
        description: "Traffic distribution across upstream instances",
        tier: LicenseTier::Professional,
        usage_limits: &[],
    },
    FeatureSpec {
        name: "ResponseCaching",
        description: "Gateway-side caching of upstream responses",
        tier: LicenseTier::Professional,
        usage_limits: &[],
    },
    FeatureSpec {
        name: "AdvancedAnalytics",
        description: "Usage metrics, dashboards and exports",
        tier: LicenseTier::Professional,
        usage_limits: &[("retentionDays", 90)],
    },
    FeatureSpec {
        name: "OAuthIntegration",
        description: "OAuth 2.0 and OpenID Connect token validation",
        tier: LicenseTier::Professional,
        usage_limits: &[],
    },
    FeatureSpec {
        name: "SingleSignOn",
        description: "SAML single sign-on for the management console",
        tier: LicenseTier::Enterprise,
        usage_limits: &[],
    },
    FeatureSpec {
        name: "AuditLogging",
        description: "Tamper-evident audit trail of administrative actions",
        tier: LicenseTier::Enterprise,
        usage_limits: &[],
    },
    FeatureSpec {
        name: "CustomPlugins",
        description: "Loading of customer-built gateway plugins",
        tier: LicenseTier::Enterprise,
        usage_limits: &[],
    },
    FeatureSpec {
        name: "MultiRegionDeployment",
        description: "Active-active gateway clusters across regions",
        tier: LicenseTier::Enterprise,
        usage_limits: &[],
    },
    FeatureSpec {
        name: "PrioritySupport",
        description: "Support with a guaranteed response time",
        tier: LicenseTier::Enterprise,
        usage_limits: &[],
    },
];

static FEATURES: Lazy<Vec<LicenseFeature>> = Lazy::new(|| {
    CATALOG
        .iter()
        .map(|spec| {
            spec.usage_limits.iter().fold(
                LicenseFeature::new(spec.name, spec.description, spec.tier),
                |feature, (limit, value)| feature.with_limit(*limit, *value),
            )
        })
        .collect()
});

/// Every catalog feature, lowest tier first.
pub fn catalog() -> &'static [LicenseFeature] {
    &FEATURES
}

/// Whether `name` is a catalog feature.
pub fn is_catalog_feature(name: &str) -> bool {
    FEATURES.iter().any(|f| f.name == name)
}

/// Default feature set of a tier. Empty for `Custom`.
pub fn default_features(tier: LicenseTier) -> Vec<LicenseFeature> {
    if !tier.is_standard() {
        return Vec::new();
    }
    FEATURES
        .iter()
        .filter(|f| tier.includes(f.minimum_tier))
        .cloned()
        .collect()
}

/// Default numeric limits of a tier. `None` for `Custom`.
pub fn default_limits(tier: LicenseTier) -> Option<TierLimits> {
    match tier {
        LicenseTier::Community => Some(TierLimits {
            max_api_calls_per_month: 10_000,
            max_concurrent_connections: 10,
        }),
        LicenseTier::Professional => Some(TierLimits {
            max_api_calls_per_month: 100_000,
            max_concurrent_connections: 100,
        }),
        LicenseTier::Enterprise => Some(TierLimits {
            max_api_calls_per_month: 1_000_000,
            max_concurrent_connections: 1_000,
        }),
        LicenseTier::Custom => None,
    }
}

/// Resolve the feature list a payload will carry.
///
/// Standard tiers get their defaults followed by any caller extras whose
/// names are not already present. `Custom` gets exactly the caller list.
pub fn resolve_features(tier: LicenseTier, requested: &[LicenseFeature]) -> Vec<LicenseFeature> {
    if !tier.is_standard() {
        return requested.to_vec();
    }

    let mut features = default_features(tier);
    for extra in requested {
        if !features.iter().any(|f| f.name == extra.name) {
            features.push(extra.clone());
        }
    }
    features
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(tier: LicenseTier) -> Vec<String> {
        default_features(tier).into_iter().map(|f| f.name).collect()
    }

    #[test]
    fn test_tier_sets_are_monotonic() {
        let standard = [
            LicenseTier::Community,
            LicenseTier::Professional,
            LicenseTier::Enterprise,
        ];
        for pair in standard.windows(2) {
            let lower = names(pair[0]);
            let upper = names(pair[1]);
            assert!(upper.len() > lower.len());
            for name in &lower {
                assert!(upper.contains(name), "{} missing from {}", name, pair[1]);
            }
        }
    }

    #[test]
    fn test_professional_has_gateway_and_load_balancing() {
        let professional = names(LicenseTier::Professional);
        assert!(professional.contains(&"BasicApiGateway".to_string()));
        assert!(professional.contains(&"LoadBalancing".to_string()));
        assert!(!names(LicenseTier::Community).contains(&"LoadBalancing".to_string()));
    }

    #[test]
    fn test_custom_has_no_defaults() {
        assert!(default_features(LicenseTier::Custom).is_empty());
        assert!(default_limits(LicenseTier::Custom).is_none());
    }

    #[test]
    fn test_default_limits_grow_with_tier() {
        let community = default_limits(LicenseTier::Community).unwrap();
        let professional = default_limits(LicenseTier::Professional).unwrap();
        let enterprise = default_limits(LicenseTier::Enterprise).unwrap();
        assert!(community.max_api_calls_per_month < professional.max_api_calls_per_month);
        assert!(professional.max_concurrent_connections < enterprise.max_concurrent_connections);
    }

    #[test]
    fn test_catalog_limits_attached() {
        let rate_limiting = catalog().iter().find(|f| f.name == "RateLimiting").unwrap();
        assert_eq!(rate_limiting.usage_limits.get("rules"), Some(&10));
    }

    #[test]
    fn test_resolve_features_appends_extras_once() {
        let extra = LicenseFeature::new("GraphQLFederation", "Federated schemas", LicenseTier::Custom);
        let duplicate_default = LicenseFeature::new("BasicApiGateway", "dup", LicenseTier::Community);

        let resolved = resolve_features(LicenseTier::Community, &[extra.clone(), duplicate_default]);
        assert_eq!(resolved.len(), default_features(LicenseTier::Community).len() + 1);
        assert_eq!(resolved.last(), Some(&extra));
    }

    #[test]
    fn test_resolve_features_custom_is_exact() {
        let only = LicenseFeature::new("LoadBalancing", "", LicenseTier::Professional);
        let resolved = resolve_features(LicenseTier::Custom, std::slice::from_ref(&only));
        assert_eq!(resolved, vec![only]);
    }
}
