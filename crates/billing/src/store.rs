//! Entitlement store
//!
//! Sole owner of the persisted entitlement record. Everything else (the usage
//! meter, the access gate, payment reconciliation) goes through this API and
//! never touches the raw keys.
//!
//! Reads are forgiving: a missing or unparsable value reads as its default.
//! Writes to the record are serialized through one lock per store so
//! concurrent increments of the same counter are never lost.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use leadforge_shared::{JsonFileStore, KeyValueStore, PlanTier, Quota, TransactionId, UserId};
use serde::Serialize;

use crate::catalog::PlanCatalog;
use crate::error::{BillingError, BillingResult};
use crate::gateway::PaymentConfirmation;

pub const KEY_PLAN: &str = "userPlan";
pub const KEY_PURCHASED: &str = "hasPurchasedBefore";
pub const KEY_USED: &str = "usedContacts";
pub const KEY_TOTAL: &str = "totalContacts";
const KEY_ACTIVATED: &str = "activatedTransactions";
const KEY_SETTLED: &str = "settledPayments";

/// Raw contact counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct UsageCounts {
    pub used: u64,
    pub total: Quota,
}

impl UsageCounts {
    /// A zero or unbounded ceiling means no metering applies
    pub fn is_unlimited(&self) -> bool {
        matches!(self.total, Quota::Unlimited | Quota::Limited(0))
    }

    /// Credits left, clamped at zero. `None` when unlimited.
    pub fn remaining(&self) -> Option<u64> {
        match self.total {
            Quota::Limited(total) if total > 0 => Some(total.saturating_sub(self.used)),
            _ => None,
        }
    }
}

/// Full persisted state for one user
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntitlementRecord {
    pub plan: PlanTier,
    pub has_purchased_before: bool,
    pub used_contacts: u64,
    pub total_contacts: Quota,
}

/// Per-user entitlement persistence
pub struct EntitlementStore {
    kv: Arc<dyn KeyValueStore>,
    user: UserId,
    write_lock: Mutex<()>,
}

impl EntitlementStore {
    /// Open the store for a user, creating the Free record on first access
    pub fn open(kv: Arc<dyn KeyValueStore>, user: UserId) -> BillingResult<Self> {
        let store = Self {
            kv,
            user,
            write_lock: Mutex::new(()),
        };
        store.initialize_if_missing()?;
        Ok(store)
    }

    /// Open a user's record in a JSON file that survives restarts
    pub fn open_file(path: impl AsRef<Path>, user: UserId) -> BillingResult<Self> {
        let kv = JsonFileStore::open(path.as_ref())?;
        tracing::debug!(path = %path.as_ref().display(), user = %user, "Opened entitlement file");
        Self::open(Arc::new(kv), user)
    }

    pub fn user(&self) -> &UserId {
        &self.user
    }

    fn key(&self, name: &str) -> String {
        format!("{}:{}", self.user, name)
    }

    fn lock(&self) -> MutexGuard<'_, ()> {
        // The guard protects no data, so a poisoned lock is still safe to reuse
        self.write_lock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn initialize_if_missing(&self) -> BillingResult<()> {
        let _guard = self.lock();
        if self.kv.get(&self.key(KEY_PLAN))?.is_some() {
            return Ok(());
        }

        let free = PlanCatalog::get(PlanTier::Free);
        self.kv.set_many(&[
            (self.key(KEY_PLAN), PlanTier::Free.to_string()),
            (self.key(KEY_PURCHASED), "false".to_string()),
            (self.key(KEY_USED), "0".to_string()),
            (self.key(KEY_TOTAL), free.max_contacts.to_string()),
        ])?;

        tracing::info!(user = %self.user, "Created default entitlement record");
        Ok(())
    }

    /// Read a raw value, treating storage errors as absence
    fn read(&self, name: &str) -> Option<String> {
        match self.kv.get(&self.key(name)) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(user = %self.user, key = name, error = %e, "Entitlement read failed, using default");
                None
            }
        }
    }

    fn read_u64(&self, name: &str) -> u64 {
        match self.read(name) {
            Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
                tracing::warn!(user = %self.user, key = name, value = %raw, "Corrupt counter, reading as zero");
                0
            }),
            None => 0,
        }
    }

    fn read_quota(&self, name: &str) -> Quota {
        match self.read(name) {
            Some(raw) => raw.parse().unwrap_or_else(|_| {
                tracing::warn!(user = %self.user, key = name, value = %raw, "Corrupt quota, reading as zero");
                Quota::Limited(0)
            }),
            None => Quota::Limited(0),
        }
    }

    /// Ledgers only ever grow: one entry per activated transaction or
    /// settled gateway payment.
    fn read_ledger(&self, name: &str) -> Vec<String> {
        match self.read(name) {
            Some(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                tracing::warn!(user = %self.user, key = name, error = %e, "Corrupt ledger, reading as empty");
                Vec::new()
            }),
            None => Vec::new(),
        }
    }

    /// Current plan, Free if absent or unrecognised
    pub fn get_plan(&self) -> PlanTier {
        self.read(KEY_PLAN)
            .map(|raw| PlanTier::from_str_lossy(&raw))
            .unwrap_or_default()
    }

    pub fn set_plan(&self, tier: PlanTier) -> BillingResult<()> {
        let _guard = self.lock();
        self.kv.set(&self.key(KEY_PLAN), &tier.to_string())?;
        Ok(())
    }

    /// Contact counters; both read as zero when absent or corrupt
    pub fn get_usage(&self) -> UsageCounts {
        UsageCounts {
            used: self.read_u64(KEY_USED),
            total: self.read_quota(KEY_TOTAL),
        }
    }

    pub fn set_total(&self, total: Quota) -> BillingResult<()> {
        let _guard = self.lock();
        self.kv.set(&self.key(KEY_TOTAL), &total.to_string())?;
        Ok(())
    }

    /// Unchecked `used += delta`. Callers wanting the quota invariant use
    /// [`EntitlementStore::consume`].
    pub fn increment_used(&self, delta: u64) -> BillingResult<()> {
        if delta == 0 {
            return Ok(());
        }
        let _guard = self.lock();
        let used = self.read_u64(KEY_USED).saturating_add(delta);
        self.kv.set(&self.key(KEY_USED), &used.to_string())?;
        Ok(())
    }

    pub fn reset_used(&self) -> BillingResult<()> {
        let _guard = self.lock();
        self.kv.set(&self.key(KEY_USED), "0")?;
        Ok(())
    }

    pub fn has_purchased_before(&self) -> bool {
        self.read(KEY_PURCHASED)
            .map(|raw| raw.trim() == "true")
            .unwrap_or(false)
    }

    pub fn mark_purchased(&self) -> BillingResult<()> {
        let _guard = self.lock();
        self.kv.set(&self.key(KEY_PURCHASED), "true")?;
        Ok(())
    }

    /// Check the quota and add `delta` to the used counter as one step.
    ///
    /// Fails with `QuotaExceeded` without writing when the bounded quota
    /// cannot absorb `delta`. Returns the counters after the write.
    pub fn consume(&self, delta: u64) -> BillingResult<UsageCounts> {
        let _guard = self.lock();
        let counts = self.get_usage();
        if delta == 0 {
            return Ok(counts);
        }

        if let Some(remaining) = counts.remaining() {
            if delta > remaining {
                return Err(BillingError::QuotaExceeded {
                    requested: delta,
                    remaining,
                    shortfall: delta - remaining,
                });
            }
        }

        let used = counts.used.saturating_add(delta);
        self.kv.set(&self.key(KEY_USED), &used.to_string())?;
        Ok(UsageCounts {
            used,
            total: counts.total,
        })
    }

    /// Whether a transaction has already granted its entitlement
    pub fn is_activated(&self, transaction_id: &TransactionId) -> bool {
        self.read_ledger(KEY_ACTIVATED)
            .iter()
            .any(|id| id == transaction_id.as_str())
    }

    /// Whether a gateway payment has already been applied to this record
    pub fn is_settled(&self, payment: &PaymentConfirmation) -> bool {
        self.read_ledger(KEY_SETTLED).contains(&settled_key(payment))
    }

    /// Remember a payment that grants no entitlement (campaigns).
    /// Returns `false` if it was already settled.
    pub fn settle_payment(&self, payment: &PaymentConfirmation) -> BillingResult<bool> {
        let _guard = self.lock();
        let mut settled = self.read_ledger(KEY_SETTLED);
        let key = settled_key(payment);
        if settled.contains(&key) {
            return Ok(false);
        }
        settled.push(key);
        self.kv.set(&self.key(KEY_SETTLED), &serde_json::to_string(&settled)?)?;
        Ok(true)
    }

    /// Apply a purchase: new plan, fresh allotment, usage reset, purchased flag.
    ///
    /// All four fields and both ledgers land in one batch. Returns `false`
    /// without writing if either this transaction or this gateway payment
    /// was already applied.
    pub fn activate_purchase(
        &self,
        transaction_id: &TransactionId,
        payment: &PaymentConfirmation,
        tier: PlanTier,
        total: Quota,
    ) -> BillingResult<bool> {
        let _guard = self.lock();
        let mut activated = self.read_ledger(KEY_ACTIVATED);
        let mut settled = self.read_ledger(KEY_SETTLED);
        let key = settled_key(payment);

        if activated.iter().any(|id| id == transaction_id.as_str()) || settled.contains(&key) {
            tracing::info!(
                user = %self.user,
                transaction_id = %transaction_id,
                gateway = %payment.gateway,
                payment_id = %payment.payment_id,
                "Entitlement already activated for payment, skipping"
            );
            return Ok(false);
        }
        activated.push(transaction_id.to_string());
        settled.push(key);

        self.kv.set_many(&[
            (self.key(KEY_PLAN), tier.to_string()),
            (self.key(KEY_TOTAL), total.to_string()),
            (self.key(KEY_USED), "0".to_string()),
            (self.key(KEY_PURCHASED), "true".to_string()),
            (self.key(KEY_ACTIVATED), serde_json::to_string(&activated)?),
            (self.key(KEY_SETTLED), serde_json::to_string(&settled)?),
        ])?;

        tracing::info!(
            user = %self.user,
            transaction_id = %transaction_id,
            plan = %tier,
            total = %total,
            "Entitlement activated"
        );
        Ok(true)
    }

    /// Snapshot of the whole record
    pub fn record(&self) -> EntitlementRecord {
        let usage = self.get_usage();
        EntitlementRecord {
            plan: self.get_plan(),
            has_purchased_before: self.has_purchased_before(),
            used_contacts: usage.used,
            total_contacts: usage.total,
        }
    }
}

fn settled_key(payment: &PaymentConfirmation) -> String {
    format!("{}:{}", payment.gateway, payment.payment_id)
}
