//! Payment Reconciliation
//!
//! Drives a purchase from the "Pay" click to an activated entitlement:
//!
//! ```text
//! validate ─▶ quote ─▶ gateway ─┬─▶ cancelled (no side effects)
//!                               └─▶ confirmed ─▶ invoice ─▶ persist ─▶ email ─▶ activate ─▶ notify
//!                                                 └──── retried ────┘
//! ```
//!
//! Once a gateway confirms, the payment is never reported as failed. Later
//! steps can only degrade the receipt (not recorded, invoice not sent) and
//! the entitlement is always activated, at most once per transaction id and
//! at most once per gateway payment.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use leadforge_shared::{GatewayKind, PlanTier, Quota, TransactionId};
use serde::Serialize;

use crate::catalog::PlanCatalog;
use crate::checkout::{self, PaymentRequest};
use crate::config::BillingConfig;
use crate::email::{HttpInvoiceNotifier, InvoiceNotifier};
use crate::error::{BillingError, BillingResult, UserAction};
use crate::events::{BillingEvent, EventBus};
use crate::gateway::{
    CardGateway, ChargeRequest, GatewayOutcome, GatewayRegistry, PayPalGateway,
    PaymentConfirmation, PaymentGateway, RazorpayGateway, StripeGateway,
};
use crate::invoice::{InvoiceRecord, Party};
use crate::pricing::{PriceQuote, PricingTable, PurchaseSelection};
use crate::retry::RetryPolicy;
use crate::store::EntitlementStore;
use crate::transaction::{HttpTransactionRecorder, Transaction, TransactionRecorder};

/// Pipeline tuning
#[derive(Debug, Clone)]
pub struct ReconcilerSettings {
    pub retry: RetryPolicy,
    pub gateway_timeout: Duration,
    pub currency: String,
    pub biller: Party,
}

impl From<&BillingConfig> for ReconcilerSettings {
    fn from(config: &BillingConfig) -> Self {
        Self {
            retry: config.retry,
            gateway_timeout: config.gateway_timeout,
            currency: config.currency.clone(),
            biller: config.biller.clone(),
        }
    }
}

/// A gateway-confirmed purchase awaiting reconciliation
#[derive(Debug, Clone)]
pub struct PaymentContext {
    pub transaction: Transaction,
    pub selection: PurchaseSelection,
    pub quote: PriceQuote,
    pub payer: Party,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RecordingStatus {
    Recorded,
    /// Paid but not stored by the backend
    NotRecorded { reason: String, action: UserAction },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum InvoiceDelivery {
    Sent,
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ActivationStatus {
    Activated { plan: PlanTier, total_contacts: Quota },
    /// This transaction had already been applied
    AlreadyActive,
    /// Campaign purchases do not touch entitlements
    NotApplicable,
    Failed { reason: String },
}

/// Everything that happened after the gateway confirmed
#[derive(Debug, Clone, Serialize)]
pub struct PaymentReceipt {
    pub transaction: Transaction,
    pub invoice: InvoiceRecord,
    pub recording: RecordingStatus,
    pub invoice_delivery: InvoiceDelivery,
    pub activation: ActivationStatus,
}

impl PaymentReceipt {
    pub fn transaction_id(&self) -> &TransactionId {
        &self.transaction.transaction_id
    }

    /// Recorded, emailed and (where applicable) activated
    pub fn is_fully_settled(&self) -> bool {
        self.recording == RecordingStatus::Recorded
            && self.invoice_delivery == InvoiceDelivery::Sent
            && !matches!(self.activation, ActivationStatus::Failed { .. })
    }
}

#[derive(Debug, Clone)]
pub enum PaymentOutcome {
    Completed(Box<PaymentReceipt>),
    /// The user dismissed the gateway; nothing was charged or changed
    Cancelled,
    /// The gateway confirmed a payment this record has already applied
    AlreadySettled(PaymentConfirmation),
}

/// Held while a payment is in flight
struct ProcessingGuard<'a>(&'a AtomicBool);

impl<'a> ProcessingGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for ProcessingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct PaymentReconciler {
    store: Arc<EntitlementStore>,
    gateways: GatewayRegistry,
    recorder: Arc<dyn TransactionRecorder>,
    notifier: Arc<dyn InvoiceNotifier>,
    pricing: PricingTable,
    settings: ReconcilerSettings,
    events: EventBus,
    processing: AtomicBool,
}

impl PaymentReconciler {
    pub fn new(
        store: Arc<EntitlementStore>,
        gateways: GatewayRegistry,
        recorder: Arc<dyn TransactionRecorder>,
        notifier: Arc<dyn InvoiceNotifier>,
        settings: ReconcilerSettings,
    ) -> Self {
        Self {
            store,
            gateways,
            recorder,
            notifier,
            pricing: PricingTable::default(),
            settings,
            events: EventBus::new(),
            processing: AtomicBool::new(false),
        }
    }

    /// Wire up the HTTP recorder, notifier and every configured gateway
    pub fn from_config(config: &BillingConfig, store: Arc<EntitlementStore>) -> BillingResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.gateway_timeout)
            .build()
            .map_err(|e| BillingError::Config(format!("failed to build HTTP client: {}", e)))?;

        let mut gateways = GatewayRegistry::new().register(Arc::new(CardGateway::new()));
        if let Some(stripe) = &config.stripe {
            gateways = gateways.register(Arc::new(StripeGateway::new(stripe)));
        }
        if let Some(razorpay) = &config.razorpay {
            gateways = gateways.register(Arc::new(RazorpayGateway::new(razorpay.clone(), client.clone())));
        }
        if let Some(paypal) = &config.paypal {
            gateways = gateways.register(Arc::new(PayPalGateway::new(paypal.clone(), client.clone())));
        }
        tracing::info!(gateways = ?gateways.kinds(), "Payment gateways configured");

        let recorder = Arc::new(HttpTransactionRecorder::new(config.backend.clone(), client.clone()));
        let notifier = Arc::new(HttpInvoiceNotifier::new(config.backend.clone(), client));

        Ok(Self::new(store, gateways, recorder, notifier, ReconcilerSettings::from(config))
            .with_pricing(PricingTable::default().with_tax_rate(config.tax_rate)))
    }

    pub fn with_pricing(mut self, pricing: PricingTable) -> Self {
        self.pricing = pricing;
        self
    }

    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = events;
        self
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn is_processing(&self) -> bool {
        self.processing.load(Ordering::Acquire)
    }

    /// Price a selection without paying for it
    pub fn quote(&self, selection: &PurchaseSelection) -> BillingResult<PriceQuote> {
        self.pricing.quote(selection)
    }

    /// Handle a "Pay" press end to end.
    ///
    /// Errors are only returned for failures before the gateway confirms;
    /// from then on the outcome is `Completed` with any soft failures
    /// reported inside the receipt.
    pub async fn handle_pay(&self, request: PaymentRequest) -> BillingResult<PaymentOutcome> {
        let _guard = ProcessingGuard::acquire(&self.processing).ok_or(BillingError::PaymentInProgress)?;

        checkout::validate(&request)?;
        let quote = self.pricing.quote(&request.selection)?;
        let gateway = self.gateways.get(request.method.gateway())?;

        let charge = ChargeRequest {
            transaction_id: TransactionId::generate(),
            amount: quote.final_total,
            amount_minor: quote.final_total_minor(),
            currency: self.settings.currency.clone(),
            email: request.email.clone(),
            description: request.selection.display_name().to_string(),
            method: request.method.clone(),
        };

        tracing::info!(
            transaction_id = %charge.transaction_id,
            gateway = %gateway.kind(),
            reference = %request.selection.reference(),
            amount = %charge.amount,
            "Dispatching payment"
        );

        let confirmation = match self.dispatch(gateway.as_ref(), &charge).await? {
            GatewayOutcome::Confirmed(confirmation) => confirmation,
            GatewayOutcome::Cancelled => {
                tracing::info!(
                    transaction_id = %charge.transaction_id,
                    gateway = %gateway.kind(),
                    "Payment cancelled by user"
                );
                self.events.publish(BillingEvent::PaymentCancelled {
                    gateway: gateway.kind(),
                });
                return Ok(PaymentOutcome::Cancelled);
            }
        };

        if self.store.is_settled(&confirmation) {
            tracing::warn!(
                transaction_id = %charge.transaction_id,
                gateway = %confirmation.gateway,
                payment_id = %confirmation.payment_id,
                "Gateway payment was already applied, ignoring replay"
            );
            return Ok(PaymentOutcome::AlreadySettled(confirmation));
        }

        let context = PaymentContext {
            transaction: Transaction::confirmed(
                charge.transaction_id,
                &confirmation,
                &request.selection,
                &quote,
                &request.email,
                &self.settings.currency,
            ),
            payer: Party {
                name: request.email.clone(),
                email: request.email,
                address: None,
            },
            selection: request.selection,
            quote,
        };

        Ok(PaymentOutcome::Completed(Box::new(self.reconcile(&context).await)))
    }

    /// Gateway call bounded by the timeout, retried on transient failures
    async fn dispatch(&self, gateway: &dyn PaymentGateway, charge: &ChargeRequest) -> BillingResult<GatewayOutcome> {
        let timeout = self.settings.gateway_timeout;
        self.settings
            .retry
            .run("gateway_dispatch", |attempt| async move {
                tracing::debug!(transaction_id = %charge.transaction_id, attempt, "Gateway attempt");
                match tokio::time::timeout(timeout, gateway.charge(charge)).await {
                    Ok(result) => result,
                    Err(_) => Err(BillingError::Transient(format!(
                        "{} did not respond within {:?}",
                        gateway.kind(),
                        timeout
                    ))),
                }
            })
            .await
    }

    /// Post-confirmation steps for a confirmed payment.
    ///
    /// Safe to call again with the same context: the backend save is keyed
    /// by transaction id and activation is skipped when already applied.
    pub async fn reconcile(&self, context: &PaymentContext) -> PaymentReceipt {
        let transaction = &context.transaction;
        let transaction_id = &transaction.transaction_id;

        // Deterministic, so a retried save pairs with the same invoice
        let invoice = self.build_invoice(context);

        let recorded = self
            .settings
            .retry
            .run("record_transaction", |attempt| async move {
                tracing::debug!(transaction_id = %transaction_id, attempt, "Recording transaction");
                self.recorder.record(transaction).await
            })
            .await;

        let recording = match recorded {
            Ok(()) => RecordingStatus::Recorded,
            Err(e) => {
                tracing::error!(
                    transaction_id = %transaction_id,
                    payment_id = %transaction.payment_id,
                    error = %e,
                    "Payment confirmed but not recorded"
                );
                self.events.publish(BillingEvent::PaymentNotRecorded {
                    transaction_id: transaction_id.clone(),
                    reason: e.to_string(),
                });
                RecordingStatus::NotRecorded {
                    reason: e.to_string(),
                    action: match e.user_action() {
                        UserAction::Relogin => UserAction::Relogin,
                        _ => UserAction::ContactSupport,
                    },
                }
            }
        };

        // Invoice email is never fatal
        let delivered = self
            .settings
            .retry
            .run("send_invoice", |attempt| {
                let invoice = &invoice;
                async move {
                    tracing::debug!(transaction_id = %transaction_id, attempt, "Sending invoice");
                    self.notifier.send_invoice(invoice).await
                }
            })
            .await;
        let invoice_delivery = match delivered {
            Ok(()) => InvoiceDelivery::Sent,
            Err(e) => {
                tracing::warn!(
                    transaction_id = %transaction_id,
                    to = %invoice.payer.email,
                    error = %e,
                    "Invoice email failed - non-fatal"
                );
                self.events.publish(BillingEvent::InvoiceDeliveryFailed {
                    transaction_id: transaction_id.clone(),
                    reason: e.to_string(),
                });
                InvoiceDelivery::Failed { reason: e.to_string() }
            }
        };

        let activation = self.activate(context);

        self.events.publish(BillingEvent::PaymentCompleted {
            transaction_id: transaction_id.clone(),
            gateway: transaction.gateway,
            amount: transaction.amount,
            currency: transaction.currency.clone(),
            description: transaction.description.clone(),
        });
        tracing::info!(
            transaction_id = %transaction_id,
            gateway = %transaction.gateway,
            amount = %transaction.amount,
            recorded = matches!(recording, RecordingStatus::Recorded),
            invoice_sent = matches!(invoice_delivery, InvoiceDelivery::Sent),
            "Payment reconciled"
        );

        PaymentReceipt {
            transaction: transaction.clone(),
            invoice,
            recording,
            invoice_delivery,
            activation,
        }
    }

    fn build_invoice(&self, context: &PaymentContext) -> InvoiceRecord {
        InvoiceRecord::build(
            &context.transaction,
            &context.selection,
            &context.quote,
            &self.settings.biller,
            &context.payer,
        )
    }

    fn activate(&self, context: &PaymentContext) -> ActivationStatus {
        let transaction_id = &context.transaction.transaction_id;
        let payment = context.transaction.confirmation();
        let PurchaseSelection::Plan(plan) = &context.selection else {
            if let Err(e) = self.store.settle_payment(&payment) {
                tracing::error!(
                    transaction_id = %transaction_id,
                    payment_id = %payment.payment_id,
                    error = %e,
                    "Failed to mark campaign payment as settled"
                );
            }
            return ActivationStatus::NotApplicable;
        };
        let total_contacts = plan
            .contact_slots
            .map(Quota::Limited)
            .unwrap_or(PlanCatalog::get(plan.tier).max_contacts);

        match self
            .store
            .activate_purchase(transaction_id, &payment, plan.tier, total_contacts)
        {
            Ok(true) => {
                self.events.publish(BillingEvent::EntitlementActivated {
                    transaction_id: transaction_id.clone(),
                    plan: plan.tier,
                    total_contacts,
                });
                ActivationStatus::Activated {
                    plan: plan.tier,
                    total_contacts,
                }
            }
            Ok(false) => {
                tracing::info!(transaction_id = %transaction_id, "Transaction already activated");
                ActivationStatus::AlreadyActive
            }
            Err(e) => {
                tracing::error!(
                    transaction_id = %transaction_id,
                    plan = %plan.tier,
                    error = %e,
                    "Payment confirmed but entitlement activation failed"
                );
                ActivationStatus::Failed { reason: e.to_string() }
            }
        }
    }

    /// Gateways accepted by this reconciler
    pub fn gateways(&self) -> Vec<GatewayKind> {
        self.gateways.kinds()
    }
}
