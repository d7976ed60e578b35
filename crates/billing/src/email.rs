//! Invoice delivery
//!
//! Hands the finished invoice to the backend's mail endpoint. Delivery
//! problems are reported to the caller but never undo a payment.

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::{BillingError, BillingResult};
use crate::invoice::InvoiceRecord;
use crate::transaction::BackendConfig;

#[async_trait]
pub trait InvoiceNotifier: Send + Sync {
    async fn send_invoice(&self, invoice: &InvoiceRecord) -> BillingResult<()>;
}

#[derive(Debug, Deserialize)]
struct SendInvoiceResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    error: Option<String>,
}

/// Invoice emails via the backend `send-invoice` endpoint
#[derive(Clone)]
pub struct HttpInvoiceNotifier {
    config: BackendConfig,
    client: reqwest::Client,
}

impl HttpInvoiceNotifier {
    pub fn new(config: BackendConfig, client: reqwest::Client) -> Self {
        Self { config, client }
    }
}

#[async_trait]
impl InvoiceNotifier for HttpInvoiceNotifier {
    async fn send_invoice(&self, invoice: &InvoiceRecord) -> BillingResult<()> {
        let request = self
            .client
            .post(self.config.url(&self.config.send_invoice_path))
            .json(invoice);

        let response = self
            .config
            .authorize(request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let parsed = serde_json::from_str::<SendInvoiceResponse>(&body).ok();

        match parsed {
            Some(SendInvoiceResponse { success: true, .. }) if status.is_success() => {
                tracing::info!(
                    to = %invoice.payer.email,
                    invoice_number = %invoice.invoice_number,
                    "Invoice email sent"
                );
                Ok(())
            }
            other => {
                let reason = other
                    .and_then(|r| r.error)
                    .unwrap_or_else(|| format!("invoice service returned {}", status));
                if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                    Err(BillingError::Transient(reason))
                } else {
                    Err(BillingError::NotificationFailure(reason))
                }
            }
        }
    }
}
