//! Payment gateway adapters
//!
//! Every gateway ends in the same place: either a confirmed payment id or a
//! user cancellation. From there the reconciliation pipeline takes over and
//! does not care which gateway produced it.

mod card;
mod paypal;
mod razorpay;
mod stripe_intent;

pub use card::CardGateway;
pub use paypal::{PayPalConfig, PayPalGateway};
pub use razorpay::{RazorpayConfig, RazorpayGateway};
pub use stripe_intent::{StripeConfig, StripeGateway};

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use leadforge_shared::{GatewayKind, TransactionId};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::checkout::PaymentMethod;
use crate::error::{BillingError, BillingResult};

/// A single charge handed to a gateway
#[derive(Debug, Clone)]
pub struct ChargeRequest {
    pub transaction_id: TransactionId,
    pub amount: Decimal,
    /// `amount` in minor units
    pub amount_minor: i64,
    pub currency: String,
    pub email: String,
    pub description: String,
    pub method: PaymentMethod,
}

/// Gateway-issued proof of payment
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaymentConfirmation {
    pub gateway: GatewayKind,
    pub payment_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayOutcome {
    Confirmed(PaymentConfirmation),
    /// The user closed the widget or abandoned the flow
    Cancelled,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    fn kind(&self) -> GatewayKind;

    /// Charge (or verify a client-side charge) for `request.amount`
    async fn charge(&self, request: &ChargeRequest) -> BillingResult<GatewayOutcome>;
}

/// Configured gateways keyed by kind
#[derive(Clone, Default)]
pub struct GatewayRegistry {
    gateways: HashMap<GatewayKind, Arc<dyn PaymentGateway>>,
}

impl GatewayRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, gateway: Arc<dyn PaymentGateway>) -> Self {
        self.gateways.insert(gateway.kind(), gateway);
        self
    }

    pub fn get(&self, kind: GatewayKind) -> BillingResult<Arc<dyn PaymentGateway>> {
        self.gateways
            .get(&kind)
            .cloned()
            .ok_or(BillingError::GatewayNotConfigured(kind))
    }

    pub fn kinds(&self) -> Vec<GatewayKind> {
        let mut kinds: Vec<_> = self.gateways.keys().copied().collect();
        kinds.sort_by_key(|kind| kind.to_string());
        kinds
    }
}

/// The hosted-gateway token for `expected`, or an internal error when the
/// request was routed to the wrong adapter
pub(crate) fn token_for(request: &ChargeRequest, expected: GatewayKind) -> BillingResult<&str> {
    match request.method.hosted_token() {
        Some(token) if request.method.gateway() == expected => Ok(token.trim()),
        _ => Err(BillingError::Internal(format!(
            "{} request routed to {} gateway",
            request.method.gateway(),
            expected
        ))),
    }
}

/// Map a non-success HTTP status from a gateway REST API
pub(crate) fn status_error(gateway: GatewayKind, status: reqwest::StatusCode, body: &str) -> BillingError {
    let detail = body.chars().take(200).collect::<String>();
    if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        BillingError::Transient(format!("{} returned {}: {}", gateway, status, detail))
    } else if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
        BillingError::Config(format!("{} rejected our credentials ({})", gateway, status))
    } else if status == reqwest::StatusCode::NOT_FOUND {
        BillingError::GatewayDeclined(format!("{} has no record of this payment", gateway))
    } else {
        BillingError::GatewayDeclined(format!("{} returned {}: {}", gateway, status, detail))
    }
}

/// Reject a confirmation whose captured amount differs from the quote
pub(crate) fn ensure_amount(gateway: GatewayKind, expected: i64, actual: i64) -> BillingResult<()> {
    if expected != actual {
        tracing::error!(
            gateway = %gateway,
            expected_minor = expected,
            actual_minor = actual,
            "Gateway confirmed a different amount than quoted"
        );
        return Err(BillingError::GatewayDeclined(format!(
            "{} confirmed {} minor units, expected {}",
            gateway, actual, expected
        )));
    }
    Ok(())
}
