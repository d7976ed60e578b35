//! Plan catalog
//!
//! Static table of what each tier unlocks. Lookups never fail: an unknown
//! plan id resolves to the Free definition.

use leadforge_shared::{Feature, PlanTier, Quota};
use serde::Serialize;

/// Feature flags for a tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FeatureFlags {
    pub crm: bool,
    pub email_campaign: bool,
    pub multimedia_campaign: bool,
    pub automation: bool,
    pub analytics: bool,
    pub verification: bool,
}

impl FeatureFlags {
    pub fn get(&self, feature: Feature) -> bool {
        match feature {
            Feature::Crm => self.crm,
            Feature::EmailCampaign => self.email_campaign,
            Feature::MultimediaCampaign => self.multimedia_campaign,
            Feature::Automation => self.automation,
            Feature::Analytics => self.analytics,
            Feature::Verification => self.verification,
        }
    }
}

/// Immutable definition of a subscription tier
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlanDefinition {
    pub tier: PlanTier,
    pub features: FeatureFlags,
    pub max_contacts: Quota,
    pub max_emails: Quota,
}

impl PlanDefinition {
    pub fn allows(&self, feature: Feature) -> bool {
        self.features.get(feature)
    }
}

static PLANS: [PlanDefinition; 4] = [
    PlanDefinition {
        tier: PlanTier::Free,
        features: FeatureFlags {
            crm: false,
            email_campaign: true,
            multimedia_campaign: false,
            automation: false,
            analytics: false,
            verification: false,
        },
        max_contacts: Quota::Limited(500),
        max_emails: Quota::Limited(1_000),
    },
    PlanDefinition {
        tier: PlanTier::Essentials,
        features: FeatureFlags {
            crm: false,
            email_campaign: true,
            multimedia_campaign: true,
            automation: false,
            analytics: true,
            verification: false,
        },
        max_contacts: Quota::Limited(2_500),
        max_emails: Quota::Limited(10_000),
    },
    PlanDefinition {
        tier: PlanTier::Standard,
        features: FeatureFlags {
            crm: true,
            email_campaign: true,
            multimedia_campaign: true,
            automation: true,
            analytics: true,
            verification: true,
        },
        max_contacts: Quota::Limited(10_000),
        max_emails: Quota::Limited(50_000),
    },
    PlanDefinition {
        tier: PlanTier::Premium,
        features: FeatureFlags {
            crm: true,
            email_campaign: true,
            multimedia_campaign: true,
            automation: true,
            analytics: true,
            verification: true,
        },
        max_contacts: Quota::Unlimited,
        max_emails: Quota::Unlimited,
    },
];

/// Read-only access to the built-in plan table
pub struct PlanCatalog;

impl PlanCatalog {
    /// Definition for a known tier
    pub fn get(tier: PlanTier) -> &'static PlanDefinition {
        PLANS
            .iter()
            .find(|plan| plan.tier == tier)
            .unwrap_or(&PLANS[0])
    }

    /// Definition for a raw plan id as stored or sent by the UI.
    /// Unknown ids get the Free definition.
    pub fn features_of(plan_id: &str) -> &'static PlanDefinition {
        Self::get(PlanTier::from_str_lossy(plan_id))
    }

    pub fn all() -> &'static [PlanDefinition] {
        &PLANS
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_plan_resolves_to_free() {
        let free = PlanCatalog::get(PlanTier::Free);
        for id in ["", "gold", "enterprise", "Standard Plus", "null"] {
            assert_eq!(PlanCatalog::features_of(id), free);
        }
    }

    #[test]
    fn test_every_tier_has_a_row() {
        for tier in PlanTier::ALL {
            assert_eq!(PlanCatalog::get(tier).tier, tier);
        }
        assert_eq!(PlanCatalog::all().len(), PlanTier::ALL.len());
    }

    #[test]
    fn test_crm_starts_at_standard() {
        assert!(!PlanCatalog::get(PlanTier::Free).allows(Feature::Crm));
        assert!(!PlanCatalog::get(PlanTier::Essentials).allows(Feature::Crm));
        assert!(PlanCatalog::get(PlanTier::Standard).allows(Feature::Crm));
        assert!(PlanCatalog::get(PlanTier::Premium).allows(Feature::Crm));
    }

    #[test]
    fn test_premium_is_unbounded() {
        let premium = PlanCatalog::features_of("premium");
        assert!(premium.max_contacts.is_unlimited());
        assert!(premium.max_emails.is_unlimited());
        assert_eq!(PlanCatalog::features_of("free").max_contacts, Quota::Limited(500));
    }
}
