//! Entitlement Module
//!
//! Provides a unified view of what a user can do based on their plan and
//! remaining contact credits. This module answers the question: "Is this
//! feature available right now, and if not, what unlocks it?"
//!
//! ## Design Principles
//!
//! 1. **Single Source of Truth**: `feature_allowed()` is THE function that determines access
//! 2. **Deterministic**: Same inputs always produce same outputs
//! 3. **Live**: Every check reads the current record, so a purchase or usage
//!    event is reflected on the very next call

use std::sync::Arc;

use leadforge_shared::{Feature, PlanTier, Quota};
use serde::{Deserialize, Serialize};

use crate::catalog::{PlanCatalog, PlanDefinition};
use crate::store::{EntitlementStore, UsageCounts};
use crate::usage::{UsageMeter, UsageSnapshot};

/// CRM access state machine
///
/// ```text
/// LockedTier ──purchase──▶ Active ◀──purchase── LockedUnpurchased
///                            │  ▲
///               quota hits 0 │  │ purchase (quota reset)
///                            ▼  │
///                       LockedExhausted
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CrmAccessState {
    /// Tier does not include CRM
    LockedTier,
    /// Tier includes CRM but checkout was never completed
    LockedUnpurchased,
    /// Tier, purchase and quota all satisfied
    Active,
    /// Purchased, but every contact credit is used
    LockedExhausted,
}

impl std::fmt::Display for CrmAccessState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CrmAccessState::LockedTier => write!(f, "locked_tier"),
            CrmAccessState::LockedUnpurchased => write!(f, "locked_unpurchased"),
            CrmAccessState::Active => write!(f, "active"),
            CrmAccessState::LockedExhausted => write!(f, "locked_exhausted"),
        }
    }
}

/// How a user can unlock a denied feature
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpgradePath {
    /// Move to a tier that includes the feature (or complete checkout)
    Upgrade,
    /// Same tier, buy more credits
    Recharge,
}

impl std::fmt::Display for UpgradePath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UpgradePath::Upgrade => write!(f, "upgrade"),
            UpgradePath::Recharge => write!(f, "recharge"),
        }
    }
}

/// Compute the CRM state from raw inputs
pub fn crm_state(plan: &PlanDefinition, purchased: bool, counts: &UsageCounts) -> CrmAccessState {
    if !plan.allows(Feature::Crm) {
        CrmAccessState::LockedTier
    } else if !purchased {
        CrmAccessState::LockedUnpurchased
    } else if counts.is_unlimited() || counts.remaining().unwrap_or(0) > 0 {
        CrmAccessState::Active
    } else {
        CrmAccessState::LockedExhausted
    }
}

/// Pure access decision.
///
/// Every feature needs its tier flag. CRM additionally needs a completed
/// purchase and either an unbounded quota or credits remaining.
pub fn feature_allowed(
    plan: &PlanDefinition,
    purchased: bool,
    counts: &UsageCounts,
    feature: Feature,
) -> bool {
    match feature {
        Feature::Crm => crm_state(plan, purchased, counts) == CrmAccessState::Active,
        other => plan.allows(other),
    }
}

/// Pure upgrade-path decision, `None` when the feature is available
pub fn upgrade_path(
    plan: &PlanDefinition,
    purchased: bool,
    counts: &UsageCounts,
    feature: Feature,
) -> Option<UpgradePath> {
    match feature {
        Feature::Crm => match crm_state(plan, purchased, counts) {
            CrmAccessState::Active => None,
            CrmAccessState::LockedExhausted => Some(UpgradePath::Recharge),
            CrmAccessState::LockedTier | CrmAccessState::LockedUnpurchased => {
                Some(UpgradePath::Upgrade)
            }
        },
        other if plan.allows(other) => None,
        _ => Some(UpgradePath::Upgrade),
    }
}

/// Availability of one feature
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeatureAccess {
    pub feature: Feature,
    pub allowed: bool,
    pub upgrade: Option<UpgradePath>,
}

/// Everything the dashboard needs to render plan-dependent UI
#[derive(Debug, Clone, Serialize)]
pub struct AccessReport {
    pub plan: PlanTier,
    pub has_purchased_before: bool,
    pub crm_state: CrmAccessState,
    pub usage: UsageSnapshot,
    pub max_emails: Quota,
    pub features: Vec<FeatureAccess>,
}

/// Ceilings currently in force for the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PlanLimits {
    /// Purchased contact slots, falling back to the tier default
    pub max_contacts: Quota,
    pub max_emails: Quota,
}

/// Feature gate backed by the live entitlement record
#[derive(Clone)]
pub struct AccessGate {
    store: Arc<EntitlementStore>,
    meter: UsageMeter,
}

impl AccessGate {
    pub fn new(store: Arc<EntitlementStore>, meter: UsageMeter) -> Self {
        Self { store, meter }
    }

    fn inputs(&self) -> (&'static PlanDefinition, bool, UsageCounts) {
        (
            PlanCatalog::get(self.store.get_plan()),
            self.store.has_purchased_before(),
            self.store.get_usage(),
        )
    }

    pub fn has_feature(&self, feature: Feature) -> bool {
        let (plan, purchased, counts) = self.inputs();
        feature_allowed(plan, purchased, &counts, feature)
    }

    /// Name-based lookup for UI callers; unknown names are denied
    pub fn has_feature_named(&self, name: &str) -> bool {
        name.parse::<Feature>()
            .map(|feature| self.has_feature(feature))
            .unwrap_or(false)
    }

    pub fn needs_upgrade_for(&self, feature: Feature) -> Option<UpgradePath> {
        let (plan, purchased, counts) = self.inputs();
        upgrade_path(plan, purchased, &counts, feature)
    }

    pub fn crm_state(&self) -> CrmAccessState {
        let (plan, purchased, counts) = self.inputs();
        crm_state(plan, purchased, &counts)
    }

    pub fn limits(&self) -> PlanLimits {
        let plan = PlanCatalog::get(self.store.get_plan());
        let max_contacts = match self.store.get_usage().total {
            Quota::Limited(0) => plan.max_contacts,
            purchased => purchased,
        };
        PlanLimits {
            max_contacts,
            max_emails: plan.max_emails,
        }
    }

    pub fn report(&self) -> AccessReport {
        let (plan, purchased, counts) = self.inputs();
        let features = Feature::ALL
            .into_iter()
            .map(|feature| FeatureAccess {
                feature,
                allowed: feature_allowed(plan, purchased, &counts, feature),
                upgrade: upgrade_path(plan, purchased, &counts, feature),
            })
            .collect();

        AccessReport {
            plan: plan.tier,
            has_purchased_before: purchased,
            crm_state: crm_state(plan, purchased, &counts),
            usage: self.meter.get_usage_stats(),
            max_emails: plan.max_emails,
            features,
        }
    }
}
