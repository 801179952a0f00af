mod common;

use common::{date, noon, year, TestContext};
use futures::future::join_all;
use pretty_assertions::assert_eq;
use std::sync::Arc;
use transit_fees::domain::payments::{PaymentScope, PaymentStatus};
use transit_fees::domain::types::Term;
use transit_fees::gateway::SettlementStatus;
use transit_fees::storage::PaymentRepository;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_duplicate_callbacks_confirm_once() {
    let ctx = Arc::new(TestContext::new().await);
    let payment = ctx
        .pending(PaymentScope::Term { term: Term::Second }, year(2025), 1000)
        .await;
    ctx.gateway.settle(
        "pay_burst",
        &payment.gateway_order_id,
        100_000,
        SettlementStatus::Captured,
        noon(date(2025, 10, 6)),
    );
    let callback = ctx.callback(&payment, "pay_burst");

    let deliveries = (0..16).map(|_| {
        let ctx = ctx.clone();
        let callback = callback.clone();
        tokio::spawn(async move { ctx.engine.verifier.verify(&callback).await })
    });
    let results: Vec<_> = join_all(deliveries)
        .await
        .into_iter()
        .map(|joined| joined.unwrap().unwrap())
        .collect();

    let first = &results[0];
    assert!(results.iter().all(|result| result == first));
    assert!(first.success);
    assert_eq!(first.payment.status, PaymentStatus::Confirmed);

    let stored = ctx.store.get_payment(&payment.id).await.unwrap().unwrap();
    assert!(stored.is_confirmed_with("pay_burst"));
    assert_eq!(stored.receipt_number, first.payment.receipt_number);
    assert_eq!(ctx.audit.count("payment_confirmed"), 1);
    assert_eq!(ctx.audit.count("verification_replayed"), 15);
    assert_eq!(ctx.audit.count("payment_failed"), 0);
}
