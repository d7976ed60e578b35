//! Pricing, metering and gating through the public API only

use leadforge_billing::{
    AccessGate, BillingError, CardBrand, CardNumber, CrmAccessState, PlanCatalog, PricingTable,
    UpgradePath, UsageMeter,
};
use leadforge_shared::{Feature, PlanTier, Quota};
use rust_decimal::Decimal;

use crate::support::{open_store, plan, temp_store_path};

#[test]
fn pro_plan_offer_then_tax() {
    let pricing = PricingTable::default();

    let quote = pricing
        .quote(&plan("Pro Plan", PlanTier::Standard, 100, 20, None))
        .unwrap();
    assert_eq!(quote.subtotal, Decimal::from(120));
    assert_eq!(quote.discount_amount, Decimal::from(60));
    assert_eq!(quote.tax, Decimal::from(6));
    assert_eq!(quote.final_total, Decimal::from(66));
    assert_eq!(quote.final_total_minor(), 6600);

    let quote = pricing
        .quote(&plan("Standard", PlanTier::Standard, 100, 20, None))
        .unwrap();
    assert_eq!(quote.discount_amount, Decimal::ZERO);
    assert_eq!(quote.tax, Decimal::from(12));
    assert_eq!(quote.final_total, Decimal::from(132));
}

#[test]
fn tracking_past_the_quota_changes_nothing() {
    let store = open_store(&temp_store_path());
    let meter = UsageMeter::new(store.clone());

    meter.track_usage(450).unwrap();
    let check = meter.can_add(80);
    assert!(!check.allowed);
    assert_eq!(check.shortfall, Some(30));

    match meter.track_usage(80) {
        Err(BillingError::QuotaExceeded {
            requested,
            remaining,
            shortfall,
        }) => {
            assert_eq!(requested, 80);
            assert_eq!(remaining, 50);
            assert_eq!(shortfall, 30);
        }
        other => panic!("expected QuotaExceeded, got {:?}", other),
    }
    assert_eq!(store.get_usage().used, 450);

    let stats = meter.get_usage_stats();
    assert_eq!(stats.remaining, Some(50));
    assert!(stats.is_near_limit);
    assert!(!stats.is_at_limit);
}

#[test]
fn free_user_sees_upgrade_paths() {
    let store = open_store(&temp_store_path());
    let gate = AccessGate::new(store.clone(), UsageMeter::new(store.clone()));

    assert_eq!(gate.crm_state(), CrmAccessState::LockedTier);
    assert!(gate.has_feature(Feature::EmailCampaign));
    assert_eq!(gate.needs_upgrade_for(Feature::Crm), Some(UpgradePath::Upgrade));
    assert_eq!(gate.needs_upgrade_for(Feature::EmailCampaign), None);
    assert_eq!(gate.limits().max_contacts, Quota::Limited(500));

    let report = gate.report();
    assert_eq!(report.plan, PlanTier::Free);
    assert_eq!(report.features.len(), Feature::ALL.len());
}

#[test]
fn unknown_plan_ids_get_free_features() {
    let unknown = PlanCatalog::features_of("enterprise-legacy");
    assert_eq!(unknown.tier, PlanTier::Free);
    assert!(!unknown.allows(Feature::Crm));
    assert_eq!(PlanCatalog::features_of("premium").max_contacts, Quota::Unlimited);
}

#[test]
fn test_cards() {
    let visa = CardNumber::parse("4111 1111 1111 1111").unwrap();
    assert_eq!(visa.brand(), CardBrand::Visa);
    assert_eq!(visa.last4(), "1111");

    assert!(matches!(
        CardNumber::parse("4111 1111 1111 1112"),
        Err(BillingError::Validation { .. })
    ));
}
