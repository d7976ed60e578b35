// Test code patterns (expected in test files):
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Leadforge Billing Module
//!
//! Plan entitlements, contact metering, feature gating and payment
//! reconciliation for the Leadforge dashboard.
//!
//! ## Features
//!
//! - **Plan Catalog**: Static tier definitions (features, contact and email ceilings)
//! - **Entitlement Store**: Durable per-user plan and usage record
//! - **Usage Metering**: Quota checks and atomic contact consumption
//! - **Access Gate**: Feature decisions, CRM state machine, upgrade paths
//! - **Payments**: Card, Stripe, Razorpay and PayPal gateways
//! - **Reconciliation**: Invoice, persist, email and activate, at most once per transaction
//! - **Events**: Broadcast billing outcomes to the UI

pub mod card;
pub mod catalog;
pub mod checkout;
pub mod config;
pub mod email;
pub mod entitlement;
pub mod error;
pub mod events;
pub mod gateway;
pub mod invoice;
pub mod pricing;
pub mod reconcile;
pub mod retry;
pub mod store;
pub mod telemetry;
pub mod transaction;
pub mod usage;

// Catalog
pub use catalog::{FeatureFlags, PlanCatalog, PlanDefinition};

// Card
pub use card::{CardBrand, CardNumber};

// Checkout
pub use checkout::{CardDetails, PaymentMethod, PaymentRequest};

// Config
pub use config::BillingConfig;

// Email
pub use email::{HttpInvoiceNotifier, InvoiceNotifier};

// Entitlement
pub use entitlement::{AccessGate, AccessReport, CrmAccessState, FeatureAccess, PlanLimits, UpgradePath};

// Error
pub use error::{BillingError, BillingResult, PaymentField, UserAction};

// Events
pub use events::{BillingEvent, EventBus};

// Gateways
pub use gateway::{
    CardGateway, ChargeRequest, GatewayOutcome, GatewayRegistry, PayPalConfig, PayPalGateway,
    PaymentConfirmation, PaymentGateway, RazorpayConfig, RazorpayGateway, StripeConfig,
    StripeGateway,
};

// Invoice
pub use invoice::{InvoiceLine, InvoiceRecord, Party};

// Pricing
pub use pricing::{
    CampaignSelection, Discount, PlanSelection, PriceQuote, PricingTable, PurchaseSelection,
    SpecialOffer,
};

// Reconciliation
pub use reconcile::{
    ActivationStatus, InvoiceDelivery, PaymentContext, PaymentOutcome, PaymentReceipt,
    PaymentReconciler, ReconcilerSettings, RecordingStatus,
};

// Retry
pub use retry::RetryPolicy;

// Store
pub use store::{EntitlementRecord, EntitlementStore, UsageCounts};

// Transaction
pub use transaction::{
    BackendConfig, HttpTransactionRecorder, Transaction, TransactionRecorder, TransactionStatus,
};

// Usage
pub use usage::{AdmissionCheck, TrackOutcome, UsageMeter, UsageSnapshot};
