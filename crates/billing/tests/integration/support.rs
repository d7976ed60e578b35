//! Shared fixtures

use std::path::{Path, PathBuf};
use std::sync::Arc;

use leadforge_billing::{
    BillingConfig, CardDetails, EntitlementStore, PaymentMethod, PaymentRequest, PlanSelection,
    PurchaseSelection,
};
use leadforge_shared::{PlanTier, UserId};
use rust_decimal::Decimal;

pub fn temp_store_path() -> PathBuf {
    std::env::temp_dir()
        .join("leadforge-integration")
        .join(format!("{}.json", uuid::Uuid::new_v4()))
}

pub fn open_store(path: &Path) -> Arc<EntitlementStore> {
    Arc::new(EntitlementStore::open_file(path, UserId::new("owner@example.com")).unwrap())
}

/// Config pointing the backend at `base_url`, with instant retries
pub fn config(base_url: &str, store_path: &Path) -> BillingConfig {
    config_with(base_url, store_path, &[])
}

pub fn config_with(base_url: &str, store_path: &Path, extra: &[(&str, &str)]) -> BillingConfig {
    let mut vars = vec![
        ("BACKEND_BASE_URL", base_url.to_string()),
        ("PAYMENT_RETRY_BACKOFF_MS", "0".to_string()),
        ("GATEWAY_TIMEOUT_SECS", "5".to_string()),
        ("ENTITLEMENT_STORE_PATH", store_path.display().to_string()),
    ];
    vars.extend(extra.iter().map(|(key, value)| (*key, value.to_string())));
    BillingConfig::from_source(|name| {
        vars.iter()
            .find(|(key, _)| *key == name)
            .map(|(_, value)| value.clone())
    })
    .unwrap()
}

pub fn plan(name: &str, tier: PlanTier, base: i64, slots_cost: i64, slots: Option<u64>) -> PurchaseSelection {
    PurchaseSelection::Plan(PlanSelection {
        name: name.to_string(),
        tier,
        base_price: Some(Decimal::from(base)),
        additional_slots_cost: Decimal::from(slots_cost),
        integration_costs: Decimal::ZERO,
        total_cost: None,
        contact_slots: slots,
    })
}

pub fn card_payment(selection: PurchaseSelection, number: &str) -> PaymentRequest {
    PaymentRequest {
        selection,
        email: "owner@example.com".to_string(),
        accepted_terms: true,
        method: PaymentMethod::Card(CardDetails {
            number: number.to_string(),
            expiry: "12/99".to_string(),
            cvv: "123".to_string(),
            holder_name: "Ada Lovelace".to_string(),
        }),
    }
}

/// Backend with the save endpoint on its second candidate path
pub async fn backend(server: &mut mockito::ServerGuard) -> Vec<mockito::Mock> {
    vec![
        server
            .mock("POST", "/save-payment")
            .with_status(404)
            .create_async()
            .await,
        server
            .mock("POST", "/api/save-payment")
            .with_status(200)
            .with_body(r#"{"success":true,"message":"Payment saved"}"#)
            .create_async()
            .await,
        server
            .mock("POST", "/send-invoice")
            .with_status(200)
            .with_body(r#"{"success":true}"#)
            .create_async()
            .await,
    ]
}
