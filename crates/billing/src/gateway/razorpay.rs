//! Razorpay payment verification
//!
//! The Razorpay checkout widget returns a payment id. We fetch the payment
//! with our key pair and accept it once it is authorized or captured.

use async_trait::async_trait;
use leadforge_shared::GatewayKind;
use serde::Deserialize;

use super::{
    ensure_amount, status_error, token_for, ChargeRequest, GatewayOutcome, PaymentConfirmation,
    PaymentGateway,
};
use crate::error::{BillingError, BillingResult};

/// Razorpay key pair
#[derive(Debug, Clone)]
pub struct RazorpayConfig {
    pub key_id: String,
    pub key_secret: String,
    pub api_base: String,
}

#[derive(Debug, Deserialize)]
struct RazorpayPayment {
    id: String,
    amount: i64,
    status: String,
    #[serde(default)]
    error_description: Option<String>,
}

pub struct RazorpayGateway {
    config: RazorpayConfig,
    client: reqwest::Client,
}

impl RazorpayGateway {
    pub fn new(config: RazorpayConfig, client: reqwest::Client) -> Self {
        Self { config, client }
    }
}

#[async_trait]
impl PaymentGateway for RazorpayGateway {
    fn kind(&self) -> GatewayKind {
        GatewayKind::Razorpay
    }

    async fn charge(&self, request: &ChargeRequest) -> BillingResult<GatewayOutcome> {
        let payment_id = token_for(request, GatewayKind::Razorpay)?;
        let url = format!(
            "{}/v1/payments/{}",
            self.config.api_base.trim_end_matches('/'),
            payment_id
        );

        let response = self
            .client
            .get(&url)
            .basic_auth(&self.config.key_id, Some(&self.config.key_secret))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(GatewayKind::Razorpay, status, &body));
        }
        let payment: RazorpayPayment = response.json().await?;

        tracing::info!(
            transaction_id = %request.transaction_id,
            payment_id = %payment.id,
            status = %payment.status,
            "Fetched Razorpay payment"
        );

        match payment.status.as_str() {
            "captured" | "authorized" => {
                ensure_amount(GatewayKind::Razorpay, request.amount_minor, payment.amount)?;
                Ok(GatewayOutcome::Confirmed(PaymentConfirmation {
                    gateway: GatewayKind::Razorpay,
                    payment_id: payment.id,
                }))
            }
            // Checkout opened but never completed
            "created" => Ok(GatewayOutcome::Cancelled),
            "failed" => Err(BillingError::GatewayDeclined(
                payment
                    .error_description
                    .unwrap_or_else(|| "razorpay payment failed".to_string()),
            )),
            other => Err(BillingError::GatewayDeclined(format!(
                "razorpay payment is {}",
                other
            ))),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::checkout::PaymentMethod;
    use leadforge_shared::TransactionId;
    use rust_decimal::Decimal;

    fn gateway(base: String) -> RazorpayGateway {
        RazorpayGateway::new(
            RazorpayConfig {
                key_id: "rzp_test_key".to_string(),
                key_secret: "secret".to_string(),
                api_base: base,
            },
            reqwest::Client::new(),
        )
    }

    fn request(payment_id: &str) -> ChargeRequest {
        ChargeRequest {
            transaction_id: TransactionId::generate(),
            amount: Decimal::from(66),
            amount_minor: 6600,
            currency: "INR".to_string(),
            email: "owner@example.com".to_string(),
            description: "Standard".to_string(),
            method: PaymentMethod::Razorpay {
                payment_id: payment_id.to_string(),
            },
        }
    }

    #[tokio::test]
    async fn test_captured_payment_is_confirmed() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/v1/payments/pay_ok")
            .match_header("authorization", mockito::Matcher::Regex("^Basic ".to_string()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"id":"pay_ok","amount":6600,"currency":"INR","status":"captured"}"#)
            .create_async()
            .await;

        let outcome = gateway(server.url()).charge(&request("pay_ok")).await.unwrap();
        assert_eq!(
            outcome,
            GatewayOutcome::Confirmed(PaymentConfirmation {
                gateway: GatewayKind::Razorpay,
                payment_id: "pay_ok".to_string(),
            })
        );
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_failed_payment_carries_gateway_reason() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/v1/payments/pay_bad")
            .with_status(200)
            .with_body(
                r#"{"id":"pay_bad","amount":6600,"status":"failed","error_description":"Card issuer declined"}"#,
            )
            .create_async()
            .await;

        let err = gateway(server.url()).charge(&request("pay_bad")).await.unwrap_err();
        assert!(matches!(err, BillingError::GatewayDeclined(ref m) if m == "Card issuer declined"));
    }

    #[tokio::test]
    async fn test_amount_mismatch_is_declined() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/v1/payments/pay_low")
            .with_status(200)
            .with_body(r#"{"id":"pay_low","amount":100,"status":"captured"}"#)
            .create_async()
            .await;

        assert!(matches!(
            gateway(server.url()).charge(&request("pay_low")).await,
            Err(BillingError::GatewayDeclined(_))
        ));
    }

    #[tokio::test]
    async fn test_server_error_is_transient() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/v1/payments/pay_5xx")
            .with_status(503)
            .create_async()
            .await;

        let err = gateway(server.url()).charge(&request("pay_5xx")).await.unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_created_payment_is_cancellation() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/v1/payments/pay_open")
            .with_status(200)
            .with_body(r#"{"id":"pay_open","amount":6600,"status":"created"}"#)
            .create_async()
            .await;

        assert_eq!(
            gateway(server.url()).charge(&request("pay_open")).await.unwrap(),
            GatewayOutcome::Cancelled
        );
    }
}
