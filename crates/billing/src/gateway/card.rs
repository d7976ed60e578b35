//! Direct card processing

use async_trait::async_trait;
use leadforge_shared::GatewayKind;
use uuid::Uuid;

use super::{ChargeRequest, GatewayOutcome, PaymentConfirmation, PaymentGateway};
use crate::card::CardNumber;
use crate::checkout::PaymentMethod;
use crate::error::{BillingError, BillingResult};

/// Generic decline test number
const DECLINED_TEST_CARD: &str = "4000000000000002";

/// Local card processor. Accepts any card that passes validation except the
/// configured decline numbers.
pub struct CardGateway {
    declined_numbers: Vec<String>,
}

impl CardGateway {
    pub fn new() -> Self {
        Self {
            declined_numbers: vec![DECLINED_TEST_CARD.to_string()],
        }
    }

    pub fn with_declined(mut self, number: impl Into<String>) -> Self {
        self.declined_numbers.push(number.into());
        self
    }
}

impl Default for CardGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PaymentGateway for CardGateway {
    fn kind(&self) -> GatewayKind {
        GatewayKind::Card
    }

    async fn charge(&self, request: &ChargeRequest) -> BillingResult<GatewayOutcome> {
        let PaymentMethod::Card(details) = &request.method else {
            return Err(BillingError::Internal(format!(
                "{} request routed to card gateway",
                request.method.gateway()
            )));
        };
        let card = CardNumber::parse(&details.number)?;

        if self.declined_numbers.iter().any(|n| n == card.digits()) {
            tracing::info!(
                transaction_id = %request.transaction_id,
                brand = %card.brand(),
                last4 = %card.last4(),
                "Card declined"
            );
            return Err(BillingError::GatewayDeclined("card was declined".to_string()));
        }

        let payment_id = format!("card_{}", Uuid::new_v4().simple());
        tracing::info!(
            transaction_id = %request.transaction_id,
            payment_id = %payment_id,
            brand = %card.brand(),
            last4 = %card.last4(),
            amount = %request.amount,
            "Card charged"
        );
        Ok(GatewayOutcome::Confirmed(PaymentConfirmation {
            gateway: GatewayKind::Card,
            payment_id,
        }))
    }
}
