//! Billing configuration

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use leadforge_shared::UserId;
use rust_decimal::Decimal;

use crate::error::{BillingError, BillingResult};
use crate::gateway::{PayPalConfig, RazorpayConfig, StripeConfig};
use crate::invoice::Party;
use crate::retry::RetryPolicy;
use crate::store::EntitlementStore;
use crate::transaction::BackendConfig;

const DEFAULT_SAVE_PAYMENT_PATHS: &str = "/save-payment,/api/save-payment,/api/payments/save";

/// Everything the payment pipeline needs from the environment
#[derive(Debug, Clone)]
pub struct BillingConfig {
    pub backend: BackendConfig,
    pub retry: RetryPolicy,
    /// Upper bound on a single gateway dispatch
    pub gateway_timeout: Duration,
    pub currency: String,
    /// Fraction, 0.10 = 10%
    pub tax_rate: Decimal,
    pub biller: Party,
    pub stripe: Option<StripeConfig>,
    pub razorpay: Option<RazorpayConfig>,
    pub paypal: Option<PayPalConfig>,
    pub store_path: PathBuf,
}

impl BillingConfig {
    /// Load configuration from `.env` and environment variables
    pub fn from_env() -> BillingResult<Self> {
        dotenvy::dotenv().ok();
        Self::from_source(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable lookup
    pub fn from_source(get: impl Fn(&str) -> Option<String>) -> BillingResult<Self> {
        let var = |name: &str| get(name).filter(|value| !value.trim().is_empty());
        let or = |name: &str, default: &str| var(name).unwrap_or_else(|| default.to_string());

        let tax_percent: Decimal = parse(&var, "TAX_RATE_PERCENT", Decimal::from(10))?;

        Ok(Self {
            backend: BackendConfig {
                base_url: or("BACKEND_BASE_URL", "http://localhost:5000"),
                save_payment_paths: or("SAVE_PAYMENT_PATHS", DEFAULT_SAVE_PAYMENT_PATHS)
                    .split(',')
                    .map(|path| path.trim().to_string())
                    .filter(|path| !path.is_empty())
                    .collect(),
                send_invoice_path: or("SEND_INVOICE_PATH", "/send-invoice"),
                auth_token: var("BACKEND_AUTH_TOKEN"),
            },
            retry: RetryPolicy::new(
                parse(&var, "PAYMENT_MAX_RETRIES", crate::retry::DEFAULT_MAX_RETRIES)?,
                Duration::from_millis(parse(
                    &var,
                    "PAYMENT_RETRY_BACKOFF_MS",
                    crate::retry::DEFAULT_BACKOFF.as_millis() as u64,
                )?),
            ),
            gateway_timeout: Duration::from_secs(parse(&var, "GATEWAY_TIMEOUT_SECS", 120u64)?),
            currency: or("CURRENCY", "USD").to_uppercase(),
            tax_rate: tax_percent / Decimal::ONE_HUNDRED,
            biller: Party {
                name: or("BILLER_NAME", "Leadforge"),
                email: or("BILLER_EMAIL", "billing@leadforge.io"),
                address: var("BILLER_ADDRESS"),
            },
            stripe: var("STRIPE_SECRET_KEY").map(|secret_key| StripeConfig { secret_key }),
            razorpay: match (var("RAZORPAY_KEY_ID"), var("RAZORPAY_KEY_SECRET")) {
                (Some(key_id), Some(key_secret)) => Some(RazorpayConfig {
                    key_id,
                    key_secret,
                    api_base: or("RAZORPAY_API_BASE", "https://api.razorpay.com"),
                }),
                _ => None,
            },
            paypal: match (var("PAYPAL_CLIENT_ID"), var("PAYPAL_CLIENT_SECRET")) {
                (Some(client_id), Some(client_secret)) => Some(PayPalConfig {
                    client_id,
                    client_secret,
                    api_base: or("PAYPAL_API_BASE", "https://api-m.paypal.com"),
                }),
                _ => None,
            },
            store_path: PathBuf::from(or("ENTITLEMENT_STORE_PATH", "data/entitlements.json")),
        })
    }

    /// Entitlement store for `user` backed by `store_path`
    pub fn open_store(&self, user: UserId) -> BillingResult<Arc<EntitlementStore>> {
        EntitlementStore::open_file(&self.store_path, user).map(Arc::new)
    }
}

fn parse<T: FromStr>(
    var: &impl Fn(&str) -> Option<String>,
    name: &str,
    default: T,
) -> BillingResult<T> {
    match var(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| BillingError::Config(format!("{} has an invalid value: {:?}", name, raw))),
        None => Ok(default),
    }
}
