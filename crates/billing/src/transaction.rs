//! Transaction records and backend persistence
//!
//! A transaction is created the moment a gateway confirms payment and is
//! never changed afterwards. The backend exposes a save endpoint whose path
//! has moved between deployments, so the recorder tries a list of candidate
//! paths and remembers the first one that exists.

use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use leadforge_shared::{GatewayKind, TransactionId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::error::{BillingError, BillingResult};
use crate::gateway::PaymentConfirmation;
use crate::pricing::{PriceQuote, PurchaseSelection};

/// Only gateway-confirmed payments become transactions, so the sole
/// persisted state is `success`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Success,
}

/// A confirmed payment as sent to the backend
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub transaction_id: TransactionId,
    pub payment_id: String,
    pub gateway: GatewayKind,
    /// `plan:<tier>` or `campaign:<id>`
    #[serde(rename = "planOrCampaignRef")]
    pub reference: String,
    pub description: String,
    pub email: String,
    pub base_price: Decimal,
    pub additional_cost: Decimal,
    pub integration_cost: Decimal,
    #[serde(rename = "discountAmount")]
    pub discount: Decimal,
    pub tax: Decimal,
    #[serde(rename = "finalTotal")]
    pub amount: Decimal,
    pub currency: String,
    pub status: TransactionStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl Transaction {
    /// Build the record for a gateway-confirmed payment
    pub fn confirmed(
        transaction_id: TransactionId,
        confirmation: &PaymentConfirmation,
        selection: &PurchaseSelection,
        quote: &PriceQuote,
        email: &str,
        currency: &str,
    ) -> Self {
        Self {
            transaction_id,
            payment_id: confirmation.payment_id.clone(),
            gateway: confirmation.gateway,
            reference: selection.reference(),
            description: selection.display_name().to_string(),
            email: email.to_string(),
            base_price: quote.base_price,
            additional_cost: quote.additional_cost,
            integration_cost: quote.integration_cost,
            discount: quote.discount_amount,
            tax: quote.tax,
            amount: quote.final_total,
            currency: currency.to_string(),
            status: TransactionStatus::Success,
            created_at: OffsetDateTime::now_utc(),
        }
    }

    /// The gateway proof this transaction was built from
    pub fn confirmation(&self) -> PaymentConfirmation {
        PaymentConfirmation {
            gateway: self.gateway,
            payment_id: self.payment_id.clone(),
        }
    }
}

/// Durable sink for confirmed transactions
#[async_trait]
pub trait TransactionRecorder: Send + Sync {
    /// Persist the transaction. Must be safe to call again with the same
    /// transaction id.
    async fn record(&self, transaction: &Transaction) -> BillingResult<()>;
}

/// Backend connection settings
#[derive(Debug, Clone)]
pub struct BackendConfig {
    pub base_url: String,
    /// Save-payment paths, tried in order
    pub save_payment_paths: Vec<String>,
    pub send_invoice_path: String,
    /// Bearer token for the backend session
    pub auth_token: Option<String>,
}

impl BackendConfig {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    pub(crate) fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.auth_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

#[derive(Debug, Deserialize)]
struct SaveResponse {
    #[serde(default)]
    success: Option<bool>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

enum PathAttempt {
    /// No endpoint at this path
    Missing,
    Saved,
}

/// Records transactions through the backend's save-payment endpoint
pub struct HttpTransactionRecorder {
    config: BackendConfig,
    client: reqwest::Client,
    resolved_path: Mutex<Option<String>>,
}

impl HttpTransactionRecorder {
    pub fn new(config: BackendConfig, client: reqwest::Client) -> Self {
        Self {
            config,
            client,
            resolved_path: Mutex::new(None),
        }
    }

    /// The save path discovered so far, if any
    pub fn resolved_path(&self) -> Option<String> {
        self.resolved_path
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn candidates(&self) -> Vec<String> {
        let mut paths = Vec::with_capacity(self.config.save_payment_paths.len() + 1);
        if let Some(resolved) = self.resolved_path() {
            paths.push(resolved);
        }
        for path in &self.config.save_payment_paths {
            if !paths.contains(path) {
                paths.push(path.clone());
            }
        }
        paths
    }

    async fn try_path(&self, path: &str, transaction: &Transaction) -> BillingResult<PathAttempt> {
        let request = self.client.post(self.config.url(path)).json(transaction);
        let response = self.config.authorize(request).send().await?;
        let status = response.status();

        if status == reqwest::StatusCode::NOT_FOUND {
            tracing::debug!(path = %path, "Save-payment path not found, trying next");
            return Ok(PathAttempt::Missing);
        }
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(BillingError::AuthExpired(format!(
                "backend rejected the session ({})",
                status
            )));
        }

        let body = response.text().await?;
        let parsed: SaveResponse = match serde_json::from_str(&body) {
            Ok(parsed) => parsed,
            Err(_) => {
                tracing::error!(
                    path = %path,
                    status = %status,
                    body = %body.chars().take(200).collect::<String>(),
                    "Backend returned a non-JSON response"
                );
                return Err(BillingError::PersistenceFailure(format!(
                    "backend returned a non-JSON response ({})",
                    status
                )));
            }
        };

        // The endpoint exists even if this particular save failed
        *self
            .resolved_path
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(path.to_string());

        if status.is_server_error() {
            return Err(BillingError::Transient(format!(
                "backend returned {}: {}",
                status,
                parsed.error.or(parsed.message).unwrap_or_default()
            )));
        }
        if !status.is_success() || parsed.success == Some(false) {
            return Err(BillingError::PersistenceFailure(
                parsed
                    .error
                    .or(parsed.message)
                    .unwrap_or_else(|| format!("backend refused the transaction ({})", status)),
            ));
        }
        Ok(PathAttempt::Saved)
    }
}

#[async_trait]
impl TransactionRecorder for HttpTransactionRecorder {
    async fn record(&self, transaction: &Transaction) -> BillingResult<()> {
        let candidates = self.candidates();
        for path in &candidates {
            if let PathAttempt::Saved = self.try_path(path, transaction).await? {
                tracing::info!(
                    transaction_id = %transaction.transaction_id,
                    path = %path,
                    "Transaction recorded"
                );
                return Ok(());
            }
        }

        Err(BillingError::PersistenceFailure(format!(
            "no save-payment endpoint found (tried {})",
            candidates.join(", ")
        )))
    }
}
