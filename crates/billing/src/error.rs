//! Billing error types

use leadforge_shared::{GatewayKind, StoreError};
use serde::Serialize;
use thiserror::Error;

/// Input field a validation error refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentField {
    Email,
    Terms,
    Selection,
    CardNumber,
    Expiry,
    Cvv,
    CardholderName,
    PaymentToken,
}

impl std::fmt::Display for PaymentField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PaymentField::Email => write!(f, "email"),
            PaymentField::Terms => write!(f, "terms"),
            PaymentField::Selection => write!(f, "selection"),
            PaymentField::CardNumber => write!(f, "card_number"),
            PaymentField::Expiry => write!(f, "expiry"),
            PaymentField::Cvv => write!(f, "cvv"),
            PaymentField::CardholderName => write!(f, "cardholder_name"),
            PaymentField::PaymentToken => write!(f, "payment_token"),
        }
    }
}

/// What the UI should ask the user to do after an error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UserAction {
    /// Correct the highlighted field and resubmit
    FixInput,
    /// Buy more credits on the current tier
    Recharge,
    /// Enter a different card or payment method
    ReenterPaymentDetails,
    /// Session expired, sign in again
    Relogin,
    /// Server-side trouble, retry later
    TryAgainLater,
    /// Money moved but something needs manual follow-up
    ContactSupport,
}

/// Billing-specific errors
#[derive(Debug, Error)]
pub enum BillingError {
    #[error("Invalid {field}: {message}")]
    Validation {
        field: PaymentField,
        message: String,
    },

    #[error("Insufficient quota: requested {requested}, remaining {remaining} (short by {shortfall})")]
    QuotaExceeded {
        requested: u64,
        remaining: u64,
        shortfall: u64,
    },

    #[error("Payment declined: {0}")]
    GatewayDeclined(String),

    #[error("Payment gateway not configured: {0}")]
    GatewayNotConfigured(GatewayKind),

    #[error("Stripe API error: {0}")]
    StripeApi(String),

    #[error("Temporary failure: {0}")]
    Transient(String),

    #[error("Session expired: {0}")]
    AuthExpired(String),

    #[error("Payment confirmed but not recorded: {0}")]
    PersistenceFailure(String),

    #[error("Invoice delivery failed: {0}")]
    NotificationFailure(String),

    #[error("A payment is already being processed")]
    PaymentInProgress,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl BillingError {
    pub fn validation(field: PaymentField, message: impl Into<String>) -> Self {
        BillingError::Validation {
            field,
            message: message.into(),
        }
    }

    /// Returns true if this error is transient and should be retried
    pub fn is_transient(&self) -> bool {
        matches!(self, BillingError::Transient(_) | BillingError::StripeApi(_))
    }

    /// Classify the error into the action the user should take
    pub fn user_action(&self) -> UserAction {
        match self {
            BillingError::Validation { .. } => UserAction::FixInput,
            BillingError::QuotaExceeded { .. } => UserAction::Recharge,
            BillingError::GatewayDeclined(_) | BillingError::GatewayNotConfigured(_) => {
                UserAction::ReenterPaymentDetails
            }
            BillingError::AuthExpired(_) => UserAction::Relogin,
            BillingError::PersistenceFailure(_) => UserAction::ContactSupport,
            BillingError::StripeApi(_)
            | BillingError::Transient(_)
            | BillingError::NotificationFailure(_)
            | BillingError::PaymentInProgress
            | BillingError::Config(_)
            | BillingError::Storage(_)
            | BillingError::Internal(_) => UserAction::TryAgainLater,
        }
    }
}

impl From<reqwest::Error> for BillingError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() || err.is_builder() {
            BillingError::Internal(err.to_string())
        } else {
            // Connect failures, timeouts and dropped bodies are all worth another attempt
            BillingError::Transient(err.to_string())
        }
    }
}

impl From<serde_json::Error> for BillingError {
    fn from(err: serde_json::Error) -> Self {
        BillingError::Internal(format!("JSON error: {}", err))
    }
}

impl From<stripe::StripeError> for BillingError {
    fn from(err: stripe::StripeError) -> Self {
        match err {
            stripe::StripeError::Stripe(request) => {
                let message = request
                    .message
                    .clone()
                    .unwrap_or_else(|| request.to_string());
                from_stripe_status(request.http_status, message)
            }
            stripe::StripeError::Timeout => BillingError::StripeApi("request timed out".to_string()),
            stripe::StripeError::ClientError(msg) => BillingError::StripeApi(msg),
            other => BillingError::Internal(format!("Stripe request failed: {}", other)),
        }
    }
}

/// Classify a Stripe API error response by HTTP status.
///
/// Only rate limiting and server errors are worth another attempt.
pub(crate) fn from_stripe_status(http_status: u16, message: String) -> BillingError {
    match http_status {
        401 | 403 => BillingError::Config(format!("Stripe rejected the API key: {}", message)),
        429 | 500..=599 => BillingError::StripeApi(message),
        _ => BillingError::GatewayDeclined(message),
    }
}

pub type BillingResult<T> = Result<T, BillingError>;
