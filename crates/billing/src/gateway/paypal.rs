//! PayPal order verification
//!
//! The PayPal buttons hand back an order id once the buyer approves. We look
//! the order up with a client-credentials token, capture it if it is only
//! approved, and accept it once it is `COMPLETED`.

use async_trait::async_trait;
use leadforge_shared::GatewayKind;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Deserialize;

use super::{
    ensure_amount, status_error, token_for, ChargeRequest, GatewayOutcome, PaymentConfirmation,
    PaymentGateway,
};
use crate::error::{BillingError, BillingResult};

#[derive(Debug, Clone)]
pub struct PayPalConfig {
    pub client_id: String,
    pub client_secret: String,
    pub api_base: String,
}

#[derive(Debug, Deserialize)]
struct AccessToken {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct Order {
    id: String,
    status: String,
    #[serde(default)]
    purchase_units: Vec<PurchaseUnit>,
}

#[derive(Debug, Deserialize)]
struct PurchaseUnit {
    amount: Option<Money>,
    #[serde(default)]
    payments: Option<Payments>,
}

#[derive(Debug, Deserialize)]
struct Payments {
    #[serde(default)]
    captures: Vec<Capture>,
}

#[derive(Debug, Deserialize)]
struct Capture {
    id: String,
    amount: Option<Money>,
}

#[derive(Debug, Deserialize)]
struct Money {
    value: String,
}

impl Money {
    fn minor_units(&self) -> BillingResult<i64> {
        self.value
            .parse::<Decimal>()
            .ok()
            .and_then(|value| (value * Decimal::ONE_HUNDRED).round().to_i64())
            .ok_or_else(|| BillingError::Internal(format!("unparsable PayPal amount {:?}", self.value)))
    }
}

impl Order {
    /// Capture id when the order has been captured, otherwise the order id
    fn payment_id(&self) -> String {
        self.first_capture()
            .map(|capture| capture.id.clone())
            .unwrap_or_else(|| self.id.clone())
    }

    fn first_capture(&self) -> Option<&Capture> {
        self.purchase_units
            .iter()
            .filter_map(|unit| unit.payments.as_ref())
            .flat_map(|payments| payments.captures.iter())
            .next()
    }

    fn charged_minor(&self) -> BillingResult<Option<i64>> {
        let money = self
            .first_capture()
            .and_then(|capture| capture.amount.as_ref())
            .or_else(|| self.purchase_units.first().and_then(|unit| unit.amount.as_ref()));
        money.map(Money::minor_units).transpose()
    }
}

pub struct PayPalGateway {
    config: PayPalConfig,
    client: reqwest::Client,
}

impl PayPalGateway {
    pub fn new(config: PayPalConfig, client: reqwest::Client) -> Self {
        Self { config, client }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.api_base.trim_end_matches('/'), path)
    }

    async fn access_token(&self) -> BillingResult<String> {
        let response = self
            .client
            .post(self.url("/v1/oauth2/token"))
            .basic_auth(&self.config.client_id, Some(&self.config.client_secret))
            .header(reqwest::header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body("grant_type=client_credentials")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(GatewayKind::Paypal, status, &body));
        }
        let token: AccessToken = response.json().await?;
        Ok(token.access_token)
    }

    async fn order_call(&self, request: reqwest::RequestBuilder) -> BillingResult<Order> {
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(GatewayKind::Paypal, status, &body));
        }
        Ok(response.json().await?)
    }
}

#[async_trait]
impl PaymentGateway for PayPalGateway {
    fn kind(&self) -> GatewayKind {
        GatewayKind::Paypal
    }

    async fn charge(&self, request: &ChargeRequest) -> BillingResult<GatewayOutcome> {
        let order_id = token_for(request, GatewayKind::Paypal)?;
        let token = self.access_token().await?;

        let mut order = self
            .order_call(
                self.client
                    .get(self.url(&format!("/v2/checkout/orders/{}", order_id)))
                    .bearer_auth(&token),
            )
            .await?;

        if order.status == "APPROVED" {
            tracing::info!(
                transaction_id = %request.transaction_id,
                order_id = %order.id,
                "Capturing approved PayPal order"
            );
            order = self
                .order_call(
                    self.client
                        .post(self.url(&format!("/v2/checkout/orders/{}/capture", order_id)))
                        .bearer_auth(&token)
                        .header(reqwest::header::CONTENT_TYPE, "application/json")
                        .body("{}"),
                )
                .await?;
        }

        tracing::info!(
            transaction_id = %request.transaction_id,
            order_id = %order.id,
            status = %order.status,
            "Fetched PayPal order"
        );

        match order.status.as_str() {
            "COMPLETED" => {
                if let Some(charged) = order.charged_minor()? {
                    ensure_amount(GatewayKind::Paypal, request.amount_minor, charged)?;
                }
                Ok(GatewayOutcome::Confirmed(PaymentConfirmation {
                    gateway: GatewayKind::Paypal,
                    payment_id: order.payment_id(),
                }))
            }
            // Buyer never approved, or backed out
            "CREATED" | "SAVED" | "VOIDED" | "PAYER_ACTION_REQUIRED" => Ok(GatewayOutcome::Cancelled),
            other => Err(BillingError::GatewayDeclined(format!(
                "paypal order is {}",
                other
            ))),
        }
    }
}
