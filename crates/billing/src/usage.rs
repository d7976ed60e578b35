//! Usage metering service
//!
//! Tracks contact-credit consumption against the purchased allotment and
//! answers pre-flight "can I add N contacts?" questions.

use std::sync::Arc;

use leadforge_shared::{Feature, Quota};
use serde::Serialize;

use crate::catalog::PlanCatalog;
use crate::entitlement::feature_allowed;
use crate::error::BillingResult;
use crate::events::{BillingEvent, EventBus};
use crate::store::{EntitlementStore, UsageCounts};

/// Percentage above which the UI warns about the quota
pub const NEAR_LIMIT_PERCENT: f64 = 80.0;

/// Derived view of the contact counters
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UsageSnapshot {
    pub used: u64,
    pub total: Quota,
    /// Credits left, never negative. `None` when unlimited.
    pub remaining: Option<u64>,
    /// 0 when unlimited
    pub percentage: f64,
    pub is_unlimited: bool,
    pub is_near_limit: bool,
    pub is_at_limit: bool,
}

impl UsageSnapshot {
    pub fn from_counts(counts: UsageCounts) -> Self {
        let is_unlimited = counts.is_unlimited();
        let remaining = counts.remaining();
        let percentage = match counts.total {
            Quota::Limited(total) if total > 0 => (counts.used as f64 / total as f64) * 100.0,
            _ => 0.0,
        };

        Self {
            used: counts.used,
            total: counts.total,
            remaining,
            percentage,
            is_unlimited,
            is_near_limit: percentage > NEAR_LIMIT_PERCENT,
            is_at_limit: remaining == Some(0),
        }
    }
}

/// Result of a pre-flight admission check
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AdmissionCheck {
    pub allowed: bool,
    /// Credits left if the addition goes ahead (bounded plans only)
    pub remaining_after: Option<u64>,
    /// How many credits are missing (rejections only)
    pub shortfall: Option<u64>,
}

/// Result of a recorded usage event
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackOutcome {
    pub usage: UsageSnapshot,
    /// True when this event made a previously available feature unavailable
    pub access_revoked: bool,
    pub revoked_features: Vec<Feature>,
}

/// Usage metering service
#[derive(Clone)]
pub struct UsageMeter {
    store: Arc<EntitlementStore>,
    events: Option<EventBus>,
}

impl UsageMeter {
    pub fn new(store: Arc<EntitlementStore>) -> Self {
        Self {
            store,
            events: None,
        }
    }

    /// Publish `AccessRevoked` events on this bus
    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    pub fn get_usage_stats(&self) -> UsageSnapshot {
        UsageSnapshot::from_counts(self.store.get_usage())
    }

    /// Would adding `count` contacts fit in the remaining quota?
    pub fn can_add(&self, count: u64) -> AdmissionCheck {
        let counts = self.store.get_usage();
        match counts.remaining() {
            None => AdmissionCheck {
                allowed: true,
                remaining_after: None,
                shortfall: None,
            },
            Some(remaining) if remaining >= count => AdmissionCheck {
                allowed: true,
                remaining_after: Some(remaining - count),
                shortfall: None,
            },
            Some(remaining) => AdmissionCheck {
                allowed: false,
                remaining_after: None,
                shortfall: Some(count - remaining),
            },
        }
    }

    /// Record `count` newly added contacts.
    ///
    /// Re-validates the quota itself and fails with `QuotaExceeded`, leaving
    /// the counter untouched, when the plan cannot absorb the addition.
    pub fn track_usage(&self, count: u64) -> BillingResult<TrackOutcome> {
        let plan = PlanCatalog::get(self.store.get_plan());
        let purchased = self.store.has_purchased_before();

        let after = self.store.consume(count).inspect_err(|e| {
            tracing::info!(user = %self.store.user(), count, error = %e, "Usage rejected");
        })?;
        let before = UsageCounts {
            used: after.used.saturating_sub(count),
            total: after.total,
        };

        let revoked_features: Vec<Feature> = Feature::ALL
            .into_iter()
            .filter(|&feature| {
                feature_allowed(plan, purchased, &before, feature)
                    && !feature_allowed(plan, purchased, &after, feature)
            })
            .collect();

        if !revoked_features.is_empty() {
            tracing::info!(
                user = %self.store.user(),
                features = ?revoked_features,
                "Quota exhausted, feature access revoked"
            );
            if let Some(events) = &self.events {
                events.publish(BillingEvent::AccessRevoked {
                    features: revoked_features.clone(),
                });
            }
        }

        Ok(TrackOutcome {
            usage: UsageSnapshot::from_counts(after),
            access_revoked: !revoked_features.is_empty(),
            revoked_features,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::error::BillingError;
    use crate::gateway::PaymentConfirmation;
    use leadforge_shared::{GatewayKind, MemoryStore, PlanTier, TransactionId, UserId};

    fn card_payment(payment_id: &str) -> PaymentConfirmation {
        PaymentConfirmation {
            gateway: GatewayKind::Card,
            payment_id: payment_id.to_string(),
        }
    }

    fn meter_with(tier: PlanTier, total: Quota, used: u64) -> (Arc<EntitlementStore>, UsageMeter) {
        let store = Arc::new(
            EntitlementStore::open(Arc::new(MemoryStore::new()), UserId::new("u")).unwrap(),
        );
        store
            .activate_purchase(
                &TransactionId::from("TXN-setup"),
                &card_payment("txn-setup"),
                tier,
                total,
            )
            .unwrap();
        store.increment_used(used).unwrap();
        (store.clone(), UsageMeter::new(store))
    }

    #[test]
    fn test_snapshot_remaining_never_negative() {
        let cases = [
            (0, Quota::Limited(100)),
            (100, Quota::Limited(100)),
            (150, Quota::Limited(100)),
            (5, Quota::Limited(0)),
            (5, Quota::Unlimited),
        ];
        for (used, total) in cases {
            let snap = UsageSnapshot::from_counts(UsageCounts { used, total });
            if let (Quota::Limited(t), false) = (total, snap.is_unlimited) {
                assert_eq!(snap.remaining, Some(t.saturating_sub(used)));
            } else {
                assert_eq!(snap.percentage, 0.0);
                assert_eq!(snap.remaining, None);
            }
        }
    }

    #[test]
    fn test_snapshot_flags() {
        let snap = UsageSnapshot::from_counts(UsageCounts {
            used: 850,
            total: Quota::Limited(1000),
        });
        assert!(snap.is_near_limit);
        assert!(!snap.is_at_limit);
        assert_eq!(snap.percentage, 85.0);

        let full = UsageSnapshot::from_counts(UsageCounts {
            used: 1000,
            total: Quota::Limited(1000),
        });
        assert!(full.is_at_limit);
        assert_eq!(full.remaining, Some(0));
    }

    #[test]
    fn test_can_add_reports_shortfall() {
        let (_, meter) = meter_with(PlanTier::Standard, Quota::Limited(100), 90);
        assert_eq!(
            meter.can_add(10),
            AdmissionCheck {
                allowed: true,
                remaining_after: Some(0),
                shortfall: None
            }
        );
        assert_eq!(
            meter.can_add(25),
            AdmissionCheck {
                allowed: false,
                remaining_after: None,
                shortfall: Some(15)
            }
        );
    }

    #[test]
    fn test_unlimited_always_admits() {
        let (_, meter) = meter_with(PlanTier::Premium, Quota::Unlimited, 1_000_000);
        assert!(meter.can_add(u64::MAX).allowed);
        assert!(meter.track_usage(500).is_ok());
    }

    #[test]
    fn test_track_usage_over_quota_leaves_counter_unchanged() {
        let (store, meter) = meter_with(PlanTier::Standard, Quota::Limited(100), 95);
        match meter.track_usage(8) {
            Err(BillingError::QuotaExceeded { shortfall, .. }) => assert_eq!(shortfall, 3),
            other => panic!("expected QuotaExceeded, got {:?}", other),
        }
        assert_eq!(store.get_usage().used, 95);
    }

    #[test]
    fn test_exhausting_quota_revokes_crm() {
        let (_, meter) = meter_with(PlanTier::Standard, Quota::Limited(100), 90);
        let events = EventBus::new();
        let mut rx = events.subscribe();
        let meter = meter.with_events(events);

        let partial = meter.track_usage(5).unwrap();
        assert!(!partial.access_revoked);

        let last = meter.track_usage(5).unwrap();
        assert!(last.access_revoked);
        assert_eq!(last.revoked_features, vec![Feature::Crm]);
        assert!(last.usage.is_at_limit);
        assert_eq!(
            rx.try_recv().unwrap(),
            BillingEvent::AccessRevoked {
                features: vec![Feature::Crm]
            }
        );
    }
}
