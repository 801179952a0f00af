use crate::audit::{AuditEvent, AuditSink};
use crate::domain::eligibility::{Coverage, EligibilityDecision, EligibilityEvaluator, PaymentOptions};
use crate::domain::fees::FeeQuoteBuilder;
use crate::domain::transport::{Schedule, ScheduleStatus};
use crate::domain::types::{RouteId, ScheduleId, StudentId};
use crate::error::{FeesError, Result};
use crate::storage::ScheduleRepository;
use chrono::NaiveDate;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BookingTarget {
    Schedule(ScheduleId),
    Date(NaiveDate),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookingRequest {
    pub student_id: StudentId,
    pub target: BookingTarget,
    /// Ignored when the target is a schedule; the schedule's route wins
    pub route_id: Option<RouteId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleInfo {
    pub schedule_id: ScheduleId,
    pub route_id: RouteId,
    pub date: NaiveDate,
    pub available_seats: u32,
    pub booked_seats: u32,
    pub remaining_seats: u32,
    pub status: ScheduleStatus,
    pub booking_enabled: bool,
}

impl From<&Schedule> for ScheduleInfo {
    fn from(schedule: &Schedule) -> Self {
        Self {
            schedule_id: schedule.id.clone(),
            route_id: schedule.route_id.clone(),
            date: schedule.date,
            available_seats: schedule.available_seats,
            booked_seats: schedule.booked_seats,
            remaining_seats: schedule.remaining_seats(),
            status: schedule.status,
            booking_enabled: schedule.booking_enabled,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingDecision {
    #[serde(flatten)]
    pub eligibility: EligibilityDecision,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schedule_info: Option<ScheduleInfo>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SeatReservation {
    pub student_id: StudentId,
    pub schedule_info: ScheduleInfo,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub covered_by: Option<Coverage>,
}

/// Combines schedule availability with eligibility into one decision, and
/// takes seats only through the store's conditional increment.
pub struct BookingGate {
    evaluator: Arc<EligibilityEvaluator>,
    quotes: Arc<FeeQuoteBuilder>,
    schedules: Arc<dyn ScheduleRepository>,
    audit: Arc<dyn AuditSink>,
}

impl BookingGate {
    pub fn new(
        evaluator: Arc<EligibilityEvaluator>,
        quotes: Arc<FeeQuoteBuilder>,
        schedules: Arc<dyn ScheduleRepository>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            evaluator,
            quotes,
            schedules,
            audit,
        }
    }

    async fn load_schedule(&self, schedule_id: &ScheduleId) -> Result<Schedule> {
        self.schedules
            .get_schedule(schedule_id)
            .await?
            .ok_or_else(|| FeesError::not_found("schedule", schedule_id))
    }

    pub async fn can_book(&self, request: &BookingRequest) -> Result<BookingDecision> {
        let (date, route_id, schedule_info) = match &request.target {
            BookingTarget::Schedule(schedule_id) => {
                let schedule = self.load_schedule(schedule_id).await?;
                let info = ScheduleInfo::from(&schedule);
                if let Some(reason) = schedule.denial_reason() {
                    debug!(student_id = %request.student_id, %schedule_id, %reason, "schedule not bookable");
                    let decision = BookingDecision {
                        eligibility: EligibilityDecision::denied(reason),
                        schedule_info: Some(info),
                    };
                    self.record(&request.student_id, schedule.date, &decision)
                        .await;
                    return Ok(decision);
                }
                (schedule.date, Some(schedule.route_id), Some(info))
            }
            BookingTarget::Date(date) => (*date, request.route_id.clone(), None),
        };

        let mut eligibility = self
            .evaluator
            .evaluate(&request.student_id, date, route_id.as_ref())
            .await?;
        if eligibility.payment_required {
            self.attach_payment_options(&request.student_id, &mut eligibility)
                .await?;
        }

        let decision = BookingDecision {
            eligibility,
            schedule_info,
        };
        self.record(&request.student_id, date, &decision).await;
        Ok(decision)
    }

    /// Prices what is owed. A route or stop without published fees leaves the
    /// options empty; "cannot price" is not the same as "not eligible".
    async fn attach_payment_options(
        &self,
        student_id: &StudentId,
        decision: &mut EligibilityDecision,
    ) -> Result<()> {
        let (Some(route_id), Some(academic_year), Some(term)) = (
            decision.route_id.clone(),
            decision.academic_year,
            decision.required_term,
        ) else {
            return Ok(());
        };

        let student = self.evaluator.load_student(student_id).await?;
        let Some(stop_name) = student.boarding_stop else {
            warn!(%student_id, "student has no boarding stop; cannot price payment options");
            decision.reason.push_str("; no boarding stop on record to price fees");
            return Ok(());
        };

        match self
            .quotes
            .quote(&route_id, &stop_name, academic_year, term)
            .await
        {
            Ok(quote) => {
                decision.payment_options = Some(PaymentOptions::from(&quote));
                Ok(())
            }
            Err(FeesError::NotFound { .. }) => {
                warn!(%student_id, %route_id, stop_name, %academic_year, "no fee schedule published");
                decision
                    .reason
                    .push_str("; fees are not published for this route and stop");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Reserves one seat for a student who may book the schedule
    pub async fn book(
        &self,
        student_id: &StudentId,
        schedule_id: &ScheduleId,
    ) -> Result<SeatReservation> {
        let decision = self
            .can_book(&BookingRequest {
                student_id: student_id.clone(),
                target: BookingTarget::Schedule(schedule_id.clone()),
                route_id: None,
            })
            .await?;

        if !decision.eligibility.can_book {
            let full = decision
                .schedule_info
                .as_ref()
                .map(|info| {
                    info.booking_enabled
                        && info.status == ScheduleStatus::Scheduled
                        && info.remaining_seats == 0
                })
                .unwrap_or(false);
            if full {
                return Err(FeesError::SeatUnavailable {
                    schedule_id: schedule_id.to_string(),
                });
            }
            return Err(FeesError::PolicyDenied {
                reason: decision.eligibility.reason,
            });
        }

        let Some(schedule) = self.schedules.try_reserve_seat(schedule_id).await? else {
            info!(%student_id, %schedule_id, "seat reservation lost; schedule no longer open");
            return Err(FeesError::SeatUnavailable {
                schedule_id: schedule_id.to_string(),
            });
        };

        info!(
            %student_id, %schedule_id,
            booked = schedule.booked_seats, available = schedule.available_seats,
            "seat reserved"
        );
        self.audit
            .record(AuditEvent::SeatReserved {
                student_id: student_id.clone(),
                schedule_id: schedule_id.clone(),
                remaining_seats: schedule.remaining_seats(),
            })
            .await;

        Ok(SeatReservation {
            student_id: student_id.clone(),
            schedule_info: ScheduleInfo::from(&schedule),
            covered_by: decision.eligibility.covered_by,
        })
    }

    async fn record(&self, student_id: &StudentId, date: NaiveDate, decision: &BookingDecision) {
        self.audit
            .record(AuditEvent::EligibilityEvaluated {
                student_id: student_id.clone(),
                route_id: decision.eligibility.route_id.clone(),
                date,
                can_book: decision.eligibility.can_book,
                payment_required: decision.eligibility.payment_required,
                reason: decision.eligibility.reason.clone(),
            })
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::MemoryAuditSink;
    use crate::domain::calendar::TermCalendar;
    use crate::domain::fees::FeeSchedule;
    use crate::domain::payments::{Payment, PaymentConfirmation, PaymentScope};
    use crate::domain::transport::{Route, Student};
    use crate::domain::types::{AcademicYear, ReceiptColor, Term};
    use crate::storage::{InMemoryStore, PaymentRepository, Repositories};
    use chrono::Utc;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn schedule(id: &str, seats: u32, booked: u32) -> Schedule {
        Schedule {
            id: ScheduleId::new(id),
            route_id: RouteId::new("route-7"),
            date: date(2025, 11, 3),
            available_seats: seats,
            booked_seats: booked,
            booking_enabled: true,
            status: ScheduleStatus::Scheduled,
        }
    }

    async fn seeded() -> (Arc<InMemoryStore>, Arc<MemoryAuditSink>, BookingGate) {
        let store = Arc::new(InMemoryStore::new());
        store
            .insert_route(Route {
                id: RouteId::new("route-7"),
                name: "North Loop".to_string(),
                active: true,
            })
            .await;
        store
            .insert_student(Student {
                id: StudentId::new("stu-1"),
                name: "Asha".to_string(),
                enrolled: true,
                allocated_route_id: Some(RouteId::new("route-7")),
                boarding_stop: Some("Main Gate".to_string()),
            })
            .await;
        store
            .insert_fee_schedule(FeeSchedule {
                route_id: RouteId::new("route-7"),
                stop_name: "Main Gate".to_string(),
                academic_year: AcademicYear::new(2025).unwrap(),
                term1_fee: 4000,
                term2_fee: 4000,
                term3_fee: 3500,
                full_year_fee: 10500,
            })
            .await;
        store.insert_schedule(schedule("sch-open", 2, 0)).await;
        store.insert_schedule(schedule("sch-full", 2, 2)).await;
        let mut cancelled = schedule("sch-cancelled", 2, 0);
        cancelled.status = ScheduleStatus::Cancelled;
        store.insert_schedule(cancelled).await;

        let repos = Repositories::from_store(store.clone());
        let audit = Arc::new(MemoryAuditSink::new());
        let gate = BookingGate::new(
            Arc::new(EligibilityEvaluator::new(&repos, TermCalendar::new(3))),
            Arc::new(FeeQuoteBuilder::new(repos.fee_schedules.clone())),
            repos.schedules.clone(),
            audit.clone(),
        );
        (store, audit, gate)
    }

    async fn pay_term_two(store: &InMemoryStore) {
        let payment = Payment::new_pending(
            StudentId::new("stu-1"),
            RouteId::new("route-7"),
            AcademicYear::new(2025).unwrap(),
            PaymentScope::Term { term: Term::Second },
            4000,
            "order_t2".to_string(),
        );
        store.create_payment(&payment).await.unwrap();
        store
            .confirm_payment(
                &payment.id,
                &PaymentConfirmation {
                    gateway_payment_id: "pay_t2".to_string(),
                    gateway_signature: None,
                    payment_method: None,
                    paid_at: Utc::now(),
                    valid_from: date(2025, 10, 1),
                    valid_until: date(2026, 1, 31),
                    receipt_number: "TRN-2025-T2-00000001".to_string(),
                    updated_at: Utc::now(),
                },
            )
            .await
            .unwrap();
    }

    fn for_schedule(id: &str) -> BookingRequest {
        BookingRequest {
            student_id: StudentId::new("stu-1"),
            target: BookingTarget::Schedule(ScheduleId::new(id)),
            route_id: None,
        }
    }

    #[tokio::test]
    async fn test_closed_schedules_deny_without_payment() {
        let (_, audit, gate) = seeded().await;

        for id in ["sch-full", "sch-cancelled"] {
            let decision = gate.can_book(&for_schedule(id)).await.unwrap();
            assert!(!decision.eligibility.can_book);
            assert!(!decision.eligibility.payment_required);
            assert!(decision.schedule_info.is_some());
        }
        assert_eq!(audit.count("eligibility_evaluated"), 2);
    }

    #[tokio::test]
    async fn test_payment_options_are_attached() {
        let (_, _, gate) = seeded().await;

        let decision = gate.can_book(&for_schedule("sch-open")).await.unwrap();
        assert!(decision.eligibility.payment_required);
        assert_eq!(decision.eligibility.required_term, Some(Term::Second));

        let options = decision.eligibility.payment_options.unwrap();
        assert_eq!(options.term_payment.amount, 4000);
        assert_eq!(options.term_payment.receipt_color, ReceiptColor::Blue);
        assert_eq!(options.full_year_payment.amount, 10500);
        assert_eq!(options.full_year_payment.savings, 1000);
        assert_eq!(options.full_year_payment.receipt_color, ReceiptColor::Green);
    }

    #[tokio::test]
    async fn test_unpriced_route_is_not_an_error() {
        let (_, _, gate) = seeded().await;

        // Term 3 of 2026-2027 has no published fees
        let decision = gate
            .can_book(&BookingRequest {
                student_id: StudentId::new("stu-1"),
                target: BookingTarget::Date(date(2027, 3, 1)),
                route_id: None,
            })
            .await
            .unwrap();

        assert!(decision.eligibility.payment_required);
        assert!(decision.eligibility.payment_options.is_none());
        assert!(decision.eligibility.reason.contains("not published"));
        assert!(decision.schedule_info.is_none());
    }

    #[tokio::test]
    async fn test_book_requires_eligibility() {
        let (store, audit, gate) = seeded().await;
        let student = StudentId::new("stu-1");

        let err = gate
            .book(&student, &ScheduleId::new("sch-open"))
            .await
            .unwrap_err();
        assert!(matches!(err, FeesError::PolicyDenied { .. }));

        pay_term_two(&store).await;
        let reservation = gate
            .book(&student, &ScheduleId::new("sch-open"))
            .await
            .unwrap();
        assert_eq!(reservation.schedule_info.booked_seats, 1);
        assert_eq!(reservation.schedule_info.remaining_seats, 1);
        assert!(reservation.covered_by.is_some());
        assert_eq!(audit.count("seat_reserved"), 1);
    }

    #[tokio::test]
    async fn test_full_schedule_is_seat_unavailable() {
        let (store, _, gate) = seeded().await;
        pay_term_two(&store).await;

        let err = gate
            .book(&StudentId::new("stu-1"), &ScheduleId::new("sch-full"))
            .await
            .unwrap_err();
        assert!(matches!(err, FeesError::SeatUnavailable { .. }));

        let err = gate
            .book(&StudentId::new("stu-1"), &ScheduleId::new("sch-missing"))
            .await
            .unwrap_err();
        assert!(matches!(err, FeesError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_cancelled_full_schedule_is_policy_denied() {
        let (store, _, gate) = seeded().await;
        pay_term_two(&store).await;
        let mut cancelled = schedule("sch-cancelled-full", 2, 2);
        cancelled.status = ScheduleStatus::Cancelled;
        store.insert_schedule(cancelled).await;

        let err = gate
            .book(&StudentId::new("stu-1"), &ScheduleId::new("sch-cancelled-full"))
            .await
            .unwrap_err();
        match err {
            FeesError::PolicyDenied { reason } => assert!(reason.contains("cancelled")),
            other => panic!("unexpected error {:?}", other),
        }
    }
}
