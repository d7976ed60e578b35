//! Checkout requests and local validation
//!
//! Everything here runs before a gateway is contacted. A request that fails
//! validation never produces network traffic.

use leadforge_shared::GatewayKind;
use serde::{Deserialize, Serialize};

use crate::card::{validate_cvv, validate_expiry, CardNumber};
use crate::error::{BillingError, BillingResult, PaymentField};
use crate::pricing::PurchaseSelection;

/// Raw card fields as typed by the user
#[derive(Clone, Serialize, Deserialize)]
pub struct CardDetails {
    pub number: String,
    /// `MM/YY`
    pub expiry: String,
    pub cvv: String,
    pub holder_name: String,
}

impl std::fmt::Debug for CardDetails {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let digits: Vec<char> = self.number.chars().filter(char::is_ascii_digit).collect();
        let last4: String = digits[digits.len().saturating_sub(4)..].iter().collect();
        f.debug_struct("CardDetails")
            .field("number", &format!("****{}", last4))
            .field("expiry", &self.expiry)
            .field("cvv", &"***")
            .field("holder_name", &self.holder_name)
            .finish()
    }
}

/// Payment-method fields for the chosen gateway.
///
/// Hosted gateways complete in their own widget and hand back a token that
/// the matching adapter verifies server-side.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "gateway", rename_all = "lowercase")]
pub enum PaymentMethod {
    Card(CardDetails),
    Razorpay { payment_id: String },
    Stripe { payment_intent_id: String },
    Paypal { order_id: String },
}

impl PaymentMethod {
    pub fn gateway(&self) -> GatewayKind {
        match self {
            PaymentMethod::Card(_) => GatewayKind::Card,
            PaymentMethod::Razorpay { .. } => GatewayKind::Razorpay,
            PaymentMethod::Stripe { .. } => GatewayKind::Stripe,
            PaymentMethod::Paypal { .. } => GatewayKind::Paypal,
        }
    }

    /// Token returned by a hosted gateway widget
    pub fn hosted_token(&self) -> Option<&str> {
        match self {
            PaymentMethod::Card(_) => None,
            PaymentMethod::Razorpay { payment_id } => Some(payment_id),
            PaymentMethod::Stripe { payment_intent_id } => Some(payment_intent_id),
            PaymentMethod::Paypal { order_id } => Some(order_id),
        }
    }
}

/// A "Pay" button press
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentRequest {
    pub selection: PurchaseSelection,
    pub email: String,
    pub accepted_terms: bool,
    pub method: PaymentMethod,
}

/// Reject bad input before any gateway dispatch
pub fn validate(request: &PaymentRequest) -> BillingResult<()> {
    if !request.email.contains('@') {
        return Err(BillingError::validation(
            PaymentField::Email,
            "enter a valid email address",
        ));
    }
    if !request.accepted_terms {
        return Err(BillingError::validation(
            PaymentField::Terms,
            "the terms of service must be accepted",
        ));
    }

    match &request.method {
        PaymentMethod::Card(card) => {
            if card.holder_name.trim().is_empty() {
                return Err(BillingError::validation(
                    PaymentField::CardholderName,
                    "enter the name on the card",
                ));
            }
            let number = CardNumber::parse(&card.number)?;
            validate_expiry(&card.expiry)?;
            validate_cvv(card.cvv.trim(), number.brand())?;
        }
        hosted => {
            if hosted.hosted_token().is_none_or(|token| token.trim().is_empty()) {
                return Err(BillingError::validation(
                    PaymentField::PaymentToken,
                    format!("missing {} payment confirmation", hosted.gateway()),
                ));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pricing::CampaignSelection;
    use rust_decimal::Decimal;

    fn request(method: PaymentMethod) -> PaymentRequest {
        PaymentRequest {
            selection: PurchaseSelection::Campaign(CampaignSelection {
                campaign_id: "cmp-7".to_string(),
                name: "Launch".to_string(),
                cost: Decimal::from(40),
            }),
            email: "owner@example.com".to_string(),
            accepted_terms: true,
            method,
        }
    }

    fn card(number: &str, expiry: &str, cvv: &str) -> PaymentMethod {
        PaymentMethod::Card(CardDetails {
            number: number.to_string(),
            expiry: expiry.to_string(),
            cvv: cvv.to_string(),
            holder_name: "Ada Lovelace".to_string(),
        })
    }

    fn field_of(result: BillingResult<()>) -> Option<PaymentField> {
        match result {
            Err(BillingError::Validation { field, .. }) => Some(field),
            _ => None,
        }
    }

    #[test]
    fn test_valid_card_request_passes() {
        assert!(validate(&request(card("4111 1111 1111 1111", "12/99", "123"))).is_ok());
    }

    #[test]
    fn test_each_rule_reports_its_field() {
        let mut bad_email = request(card("4111 1111 1111 1111", "12/99", "123"));
        bad_email.email = "owner.example.com".to_string();
        assert_eq!(field_of(validate(&bad_email)), Some(PaymentField::Email));

        let mut no_terms = request(card("4111 1111 1111 1111", "12/99", "123"));
        no_terms.accepted_terms = false;
        assert_eq!(field_of(validate(&no_terms)), Some(PaymentField::Terms));

        assert_eq!(
            field_of(validate(&request(card("4111 1111 1111 1112", "12/99", "123")))),
            Some(PaymentField::CardNumber)
        );
        assert_eq!(
            field_of(validate(&request(card("4111 1111 1111 1111", "01/20", "123")))),
            Some(PaymentField::Expiry)
        );
        assert_eq!(
            field_of(validate(&request(card("378282246310005", "12/99", "123")))),
            Some(PaymentField::Cvv)
        );

        let mut unnamed = request(card("4111 1111 1111 1111", "12/99", "123"));
        if let PaymentMethod::Card(details) = &mut unnamed.method {
            details.holder_name = "   ".to_string();
        }
        assert_eq!(field_of(validate(&unnamed)), Some(PaymentField::CardholderName));
    }

    #[test]
    fn test_hosted_gateway_needs_token() {
        let missing = request(PaymentMethod::Paypal {
            order_id: "  ".to_string(),
        });
        assert_eq!(field_of(validate(&missing)), Some(PaymentField::PaymentToken));

        let ok = request(PaymentMethod::Razorpay {
            payment_id: "pay_29QQoUBi66xm2f".to_string(),
        });
        assert!(validate(&ok).is_ok());
    }

    #[test]
    fn test_debug_redacts_card() {
        let rendered = format!("{:?}", card("4111 1111 1111 1111", "12/99", "123"));
        assert!(rendered.contains("****1111"));
        assert!(!rendered.contains("4111 1111"));
        assert!(!rendered.contains("123\""));

        // Untrusted input must never make logging panic
        let rendered = format!("{:?}", card("é123", "12/99", "123"));
        assert!(rendered.contains("****123"));
        let rendered = format!("{:?}", card("4111-1111-1111-99é7", "12/99", "123"));
        assert!(rendered.contains("****1997"));
    }
}
