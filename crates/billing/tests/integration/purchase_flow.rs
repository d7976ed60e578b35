//! Purchase scenarios from the pay click to an active entitlement

use leadforge_billing::{
    AccessGate, ActivationStatus, BillingError, BillingEvent, CrmAccessState, PaymentContext,
    PaymentMethod, PaymentOutcome, PaymentReceipt, PaymentReconciler, RecordingStatus,
    UpgradePath, UsageMeter,
};
use leadforge_shared::{Feature, PlanTier, Quota, UserId};

use crate::support::{
    backend, card_payment, config, config_with, open_store, plan, temp_store_path,
};

fn completed(outcome: PaymentOutcome) -> PaymentReceipt {
    match outcome {
        PaymentOutcome::Completed(receipt) => *receipt,
        other => panic!("payment did not complete: {:?}", other),
    }
}

#[tokio::test]
async fn free_user_buys_standard_with_1000_slots() {
    let mut server = mockito::Server::new_async().await;
    let _backend = backend(&mut server).await;
    let path = temp_store_path();
    let store = config(&server.url(), &path)
        .open_store(UserId::new("owner@example.com"))
        .unwrap();
    let gate = AccessGate::new(store.clone(), UsageMeter::new(store.clone()));

    assert_eq!(store.get_plan(), PlanTier::Free);
    assert_eq!(store.get_usage().total, Quota::Limited(500));
    assert!(!gate.has_feature(Feature::Crm));

    let reconciler = PaymentReconciler::from_config(&config(&server.url(), &path), store.clone()).unwrap();
    let mut events = reconciler.events().subscribe();
    let receipt = completed(
        reconciler
            .handle_pay(card_payment(
                plan("Standard", PlanTier::Standard, 50, 10, Some(1000)),
                "4111 1111 1111 1111",
            ))
            .await
            .unwrap(),
    );

    assert!(receipt.is_fully_settled());
    assert_eq!(store.get_plan(), PlanTier::Standard);
    let usage = store.get_usage();
    assert_eq!(usage.used, 0);
    assert_eq!(usage.total, Quota::Limited(1000));
    assert!(gate.has_feature(Feature::Crm));
    assert_eq!(gate.crm_state(), CrmAccessState::Active);

    let mut completed_events = 0;
    while let Ok(event) = events.try_recv() {
        if let BillingEvent::PaymentCompleted { description, .. } = event {
            assert_eq!(description, "Standard");
            completed_events += 1;
        }
    }
    assert_eq!(completed_events, 1);

    // The record is durable
    let reopened = open_store(&path);
    assert_eq!(reopened.get_plan(), PlanTier::Standard);
    assert!(reopened.has_purchased_before());
}

#[tokio::test]
async fn exhausted_standard_user_recharges() {
    let mut server = mockito::Server::new_async().await;
    let _backend = backend(&mut server).await;
    let path = temp_store_path();
    let store = open_store(&path);
    let meter = UsageMeter::new(store.clone());
    let gate = AccessGate::new(store.clone(), meter.clone());
    let reconciler = PaymentReconciler::from_config(&config(&server.url(), &path), store.clone()).unwrap();

    let standard = || plan("Standard", PlanTier::Standard, 50, 10, Some(1000));
    completed(
        reconciler
            .handle_pay(card_payment(standard(), "4111 1111 1111 1111"))
            .await
            .unwrap(),
    );
    let outcome = meter.track_usage(1000).unwrap();
    assert!(outcome.access_revoked);

    assert!(!gate.has_feature(Feature::Crm));
    assert_eq!(gate.crm_state(), CrmAccessState::LockedExhausted);
    assert_eq!(gate.needs_upgrade_for(Feature::Crm), Some(UpgradePath::Recharge));
    assert!(matches!(
        meter.track_usage(1),
        Err(BillingError::QuotaExceeded { shortfall: 1, .. })
    ));

    completed(
        reconciler
            .handle_pay(card_payment(standard(), "5555 5555 5555 4444"))
            .await
            .unwrap(),
    );
    assert!(gate.has_feature(Feature::Crm));
    assert_eq!(store.get_usage().used, 0);
}

#[tokio::test]
async fn reconciling_same_transaction_twice_activates_once() {
    let mut server = mockito::Server::new_async().await;
    let _backend = backend(&mut server).await;
    let path = temp_store_path();
    let store = open_store(&path);
    let reconciler = PaymentReconciler::from_config(&config(&server.url(), &path), store.clone()).unwrap();

    let selection = plan("Standard", PlanTier::Standard, 50, 10, Some(1000));
    let first = completed(
        reconciler
            .handle_pay(card_payment(selection.clone(), "4111 1111 1111 1111"))
            .await
            .unwrap(),
    );
    store.consume(40).unwrap();

    let context = PaymentContext {
        transaction: first.transaction.clone(),
        quote: reconciler.quote(&selection).unwrap(),
        selection,
        payer: first.invoice.payer.clone(),
    };
    let second = reconciler.reconcile(&context).await;

    assert_eq!(second.recording, RecordingStatus::Recorded);
    assert_eq!(second.activation, ActivationStatus::AlreadyActive);
    assert_eq!(second.invoice, first.invoice);
    assert_eq!(store.get_usage().used, 40);
    assert!(store.is_activated(first.transaction_id()));
}

#[tokio::test]
async fn declined_card_touches_nothing() {
    let mut server = mockito::Server::new_async().await;
    let save = server
        .mock("POST", mockito::Matcher::Any)
        .expect(0)
        .create_async()
        .await;
    let path = temp_store_path();
    let store = open_store(&path);
    let reconciler = PaymentReconciler::from_config(&config(&server.url(), &path), store.clone()).unwrap();

    let err = reconciler
        .handle_pay(card_payment(
            plan("Standard", PlanTier::Standard, 50, 10, Some(1000)),
            "4000 0000 0000 0002",
        ))
        .await
        .unwrap_err();

    assert!(matches!(err, BillingError::GatewayDeclined(_)));
    assert_eq!(store.get_plan(), PlanTier::Free);
    assert!(!store.has_purchased_before());
    save.assert_async().await;
}

#[tokio::test]
async fn backend_outage_keeps_payment_and_asks_for_support() {
    let mut server = mockito::Server::new_async().await;
    let save = server
        .mock("POST", "/save-payment")
        .with_status(503)
        .with_body(r#"{"success":false,"error":"maintenance"}"#)
        .expect(3)
        .create_async()
        .await;
    let _invoice = server
        .mock("POST", "/send-invoice")
        .with_status(200)
        .with_body(r#"{"success":true}"#)
        .create_async()
        .await;
    let path = temp_store_path();
    let store = open_store(&path);
    let reconciler = PaymentReconciler::from_config(&config(&server.url(), &path), store.clone()).unwrap();

    let receipt = completed(
        reconciler
            .handle_pay(card_payment(
                plan("Premium", PlanTier::Premium, 99, 0, None),
                "4111 1111 1111 1111",
            ))
            .await
            .unwrap(),
    );

    assert!(matches!(receipt.recording, RecordingStatus::NotRecorded { .. }));
    assert_eq!(
        receipt.activation,
        ActivationStatus::Activated {
            plan: PlanTier::Premium,
            total_contacts: Quota::Unlimited,
        }
    );
    save.assert_async().await;
}

#[tokio::test]
async fn replayed_razorpay_payment_grants_nothing_more() {
    let mut server = mockito::Server::new_async().await;
    let save = server
        .mock("POST", "/save-payment")
        .with_status(200)
        .with_body(r#"{"success":true}"#)
        .expect(1)
        .create_async()
        .await;
    let invoice = server
        .mock("POST", "/send-invoice")
        .with_status(200)
        .with_body(r#"{"success":true}"#)
        .expect(1)
        .create_async()
        .await;
    let _razorpay = server
        .mock("GET", "/v1/payments/pay_once")
        .with_status(200)
        .with_body(r#"{"id":"pay_once","amount":6600,"currency":"USD","status":"captured"}"#)
        .create_async()
        .await;

    let path = temp_store_path();
    let store = open_store(&path);
    let url = server.url();
    let config = config_with(
        &url,
        &path,
        &[
            ("RAZORPAY_KEY_ID", "rzp_test_key"),
            ("RAZORPAY_KEY_SECRET", "rzp_test_secret"),
            ("RAZORPAY_API_BASE", url.as_str()),
        ],
    );
    let reconciler = PaymentReconciler::from_config(&config, store.clone()).unwrap();
    let request = || {
        let mut request = card_payment(
            plan("Standard", PlanTier::Standard, 50, 10, Some(1000)),
            "4111 1111 1111 1111",
        );
        request.method = PaymentMethod::Razorpay {
            payment_id: "pay_once".to_string(),
        };
        request
    };

    let first = completed(reconciler.handle_pay(request()).await.unwrap());
    assert_eq!(
        first.activation,
        ActivationStatus::Activated {
            plan: PlanTier::Standard,
            total_contacts: Quota::Limited(1000),
        }
    );
    store.consume(1000).unwrap();

    let second = reconciler.handle_pay(request()).await.unwrap();

    assert!(matches!(second, PaymentOutcome::AlreadySettled(_)));
    assert_eq!(store.get_usage().used, 1000);
    assert!(!AccessGate::new(store.clone(), UsageMeter::new(store.clone())).has_feature(Feature::Crm));
    save.assert_async().await;
    invoice.assert_async().await;

    // The ledger is durable, so a restarted process refuses the replay too
    let restarted = PaymentReconciler::from_config(&config, open_store(&path)).unwrap();
    assert!(matches!(
        restarted.handle_pay(request()).await.unwrap(),
        PaymentOutcome::AlreadySettled(_)
    ));
}
