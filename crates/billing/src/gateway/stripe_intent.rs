//! Stripe PaymentIntent verification
//!
//! Stripe Elements confirms the intent in the browser. We only receive the
//! intent id, so the charge is verified server-side before we trust it.

use async_trait::async_trait;
use leadforge_shared::GatewayKind;
use stripe::{Client, PaymentIntent, PaymentIntentId, PaymentIntentStatus};

use super::{ensure_amount, token_for, ChargeRequest, GatewayOutcome, PaymentConfirmation, PaymentGateway};
use crate::error::{BillingError, BillingResult, PaymentField};

/// Configuration for Stripe
#[derive(Debug, Clone)]
pub struct StripeConfig {
    /// Stripe secret API key
    pub secret_key: String,
}

pub struct StripeGateway {
    client: Client,
}

impl StripeGateway {
    pub fn new(config: &StripeConfig) -> Self {
        Self {
            client: Client::new(&config.secret_key),
        }
    }
}

/// Decide the outcome for a retrieved intent
fn outcome_for(
    status: PaymentIntentStatus,
    intent_id: &str,
    amount: i64,
    expected_minor: i64,
) -> BillingResult<GatewayOutcome> {
    match status {
        PaymentIntentStatus::Succeeded | PaymentIntentStatus::RequiresCapture => {
            ensure_amount(GatewayKind::Stripe, expected_minor, amount)?;
            Ok(GatewayOutcome::Confirmed(PaymentConfirmation {
                gateway: GatewayKind::Stripe,
                payment_id: intent_id.to_string(),
            }))
        }
        PaymentIntentStatus::Canceled => Ok(GatewayOutcome::Cancelled),
        PaymentIntentStatus::Processing => Err(BillingError::Transient(
            "stripe payment is still processing".to_string(),
        )),
        PaymentIntentStatus::RequiresPaymentMethod => Err(BillingError::GatewayDeclined(
            "stripe declined the payment method".to_string(),
        )),
        other => Err(BillingError::GatewayDeclined(format!(
            "stripe payment was not completed ({})",
            other.as_str()
        ))),
    }
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    fn kind(&self) -> GatewayKind {
        GatewayKind::Stripe
    }

    async fn charge(&self, request: &ChargeRequest) -> BillingResult<GatewayOutcome> {
        let token = token_for(request, GatewayKind::Stripe)?;
        let intent_id = token.parse::<PaymentIntentId>().map_err(|e| {
            BillingError::validation(PaymentField::PaymentToken, format!("Invalid payment intent ID: {}", e))
        })?;

        let intent = PaymentIntent::retrieve(&self.client, &intent_id, &[]).await?;

        tracing::info!(
            transaction_id = %request.transaction_id,
            payment_intent = %intent.id,
            status = intent.status.as_str(),
            "Retrieved Stripe payment intent"
        );
        outcome_for(intent.status, intent.id.as_str(), intent.amount, request.amount_minor)
    }
}
