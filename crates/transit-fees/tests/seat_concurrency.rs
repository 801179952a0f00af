mod common;

use common::{date, year, TestContext, STUDENT};
use futures::future::join_all;
use std::sync::Arc;
use transit_fees::domain::payments::PaymentScope;
use transit_fees::domain::types::StudentId;
use transit_fees::error::FeesError;
use transit_fees::storage::ScheduleRepository;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_bookings_never_oversell() {
    let ctx = Arc::new(TestContext::new().await);
    ctx.paid(PaymentScope::FullYear, year(2025), 2700, date(2025, 6, 5))
        .await;
    let schedule_id = ctx.add_schedule("sched-busy", date(2025, 12, 1), 5).await;

    let attempts = (0..25).map(|_| {
        let ctx = ctx.clone();
        let schedule_id = schedule_id.clone();
        tokio::spawn(async move {
            ctx.engine
                .gate
                .book(&StudentId::new(STUDENT), &schedule_id)
                .await
        })
    });
    let results: Vec<_> = join_all(attempts)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();

    let reserved = results.iter().filter(|r| r.is_ok()).count();
    let sold_out = results
        .iter()
        .filter(|r| matches!(r, Err(FeesError::SeatUnavailable { .. })))
        .count();
    assert_eq!(reserved, 5);
    assert_eq!(sold_out, 20);

    let schedule = ctx
        .store
        .get_schedule(&schedule_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(schedule.booked_seats, 5);
    assert_eq!(schedule.remaining_seats(), 0);
    assert_eq!(ctx.audit.count("seat_reserved"), 5);
}

#[tokio::test]
async fn test_last_seat_goes_to_one_caller() {
    let ctx = TestContext::new().await;
    ctx.paid(PaymentScope::FullYear, year(2025), 2700, date(2025, 6, 5))
        .await;
    let schedule_id = ctx.add_schedule("sched-last", date(2025, 12, 2), 1).await;
    let student = StudentId::new(STUDENT);

    let (a, b) = tokio::join!(
        ctx.engine.gate.book(&student, &schedule_id),
        ctx.engine.gate.book(&student, &schedule_id)
    );
    assert_eq!(a.is_ok() as u8 + b.is_ok() as u8, 1);

    let err = ctx.engine.gate.book(&student, &schedule_id).await.unwrap_err();
    assert!(matches!(err, FeesError::SeatUnavailable { .. }));
}
