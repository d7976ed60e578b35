//! Billing Events Module
//!
//! Broadcasts billing outcomes to whoever is rendering the dashboard:
//! completed and cancelled payments, soft failures the user should be told
//! about, and entitlement changes that alter which features are available.
//!
//! Publishing never blocks and never fails; with no subscribers the event is
//! simply dropped.

use leadforge_shared::{Feature, GatewayKind, PlanTier, Quota, TransactionId};
use rust_decimal::Decimal;
use serde::Serialize;
use tokio::sync::broadcast;

/// Buffered events per subscriber before the slowest one starts lagging
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// A billing event
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BillingEvent {
    PaymentCompleted {
        transaction_id: TransactionId,
        gateway: GatewayKind,
        amount: Decimal,
        currency: String,
        description: String,
    },
    PaymentCancelled {
        gateway: GatewayKind,
    },
    /// Gateway took the money but the backend never stored the transaction
    PaymentNotRecorded {
        transaction_id: TransactionId,
        reason: String,
    },
    InvoiceDeliveryFailed {
        transaction_id: TransactionId,
        reason: String,
    },
    EntitlementActivated {
        transaction_id: TransactionId,
        plan: PlanTier,
        total_contacts: Quota,
    },
    AccessRevoked {
        features: Vec<Feature>,
    },
}

impl BillingEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            BillingEvent::PaymentCompleted { .. } => "PAYMENT_COMPLETED",
            BillingEvent::PaymentCancelled { .. } => "PAYMENT_CANCELLED",
            BillingEvent::PaymentNotRecorded { .. } => "PAYMENT_NOT_RECORDED",
            BillingEvent::InvoiceDeliveryFailed { .. } => "INVOICE_DELIVERY_FAILED",
            BillingEvent::EntitlementActivated { .. } => "ENTITLEMENT_ACTIVATED",
            BillingEvent::AccessRevoked { .. } => "ACCESS_REVOKED",
        }
    }
}

impl std::fmt::Display for BillingEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.kind())
    }
}

/// Fan-out channel for billing events
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<BillingEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BillingEvent> {
        self.sender.subscribe()
    }

    pub fn publish(&self, event: BillingEvent) {
        let kind = event.kind();
        if self.sender.send(event).is_err() {
            tracing::debug!(event = kind, "No subscribers for billing event");
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
