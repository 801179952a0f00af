//! In-memory store for tests and local runs.
//!
//! Every conditional write happens under the map's write lock, which gives the
//! same all-or-nothing semantics as the guarded `UPDATE ... WHERE` statements
//! of the Postgres repositories.

use super::{
    FeeScheduleRepository, PaymentRepository, RouteRepository, ScheduleRepository,
    StudentRepository,
};
use crate::domain::fees::FeeSchedule;
use crate::domain::payments::{
    ConfirmOutcome, Payment, PaymentConfirmation, PaymentScope, PaymentStatus,
};
use crate::domain::transport::{Route, Schedule, ScheduleStatus, Student};
use crate::domain::types::{AcademicYear, PaymentId, RouteId, ScheduleId, StudentId, Term};
use crate::error::{FeesError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;

type FeeKey = (RouteId, String, AcademicYear);

#[derive(Default)]
pub struct InMemoryStore {
    students: RwLock<HashMap<StudentId, Student>>,
    routes: RwLock<HashMap<RouteId, Route>>,
    fee_schedules: RwLock<HashMap<FeeKey, FeeSchedule>>,
    payments: RwLock<HashMap<PaymentId, Payment>>,
    schedules: RwLock<HashMap<ScheduleId, Schedule>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_student(&self, student: Student) {
        self.students
            .write()
            .await
            .insert(student.id.clone(), student);
    }

    pub async fn insert_route(&self, route: Route) {
        self.routes.write().await.insert(route.id.clone(), route);
    }

    pub async fn insert_fee_schedule(&self, schedule: FeeSchedule) {
        let key = (
            schedule.route_id.clone(),
            schedule.stop_name.clone(),
            schedule.academic_year,
        );
        self.fee_schedules.write().await.insert(key, schedule);
    }

    pub async fn insert_schedule(&self, schedule: Schedule) {
        self.schedules
            .write()
            .await
            .insert(schedule.id.clone(), schedule);
    }

    fn confirmed_match(
        payment: &Payment,
        student_id: &StudentId,
        academic_year: AcademicYear,
        scope: PaymentScope,
    ) -> bool {
        payment.status == PaymentStatus::Confirmed
            && &payment.student_id == student_id
            && payment.academic_year == academic_year
            && payment.scope == scope
    }
}

#[async_trait]
impl StudentRepository for InMemoryStore {
    async fn get_student(&self, id: &StudentId) -> Result<Option<Student>> {
        Ok(self.students.read().await.get(id).cloned())
    }
}

#[async_trait]
impl RouteRepository for InMemoryStore {
    async fn get_route(&self, id: &RouteId) -> Result<Option<Route>> {
        Ok(self.routes.read().await.get(id).cloned())
    }
}

#[async_trait]
impl FeeScheduleRepository for InMemoryStore {
    async fn get_fee_schedule(
        &self,
        route_id: &RouteId,
        stop_name: &str,
        academic_year: AcademicYear,
    ) -> Result<Option<FeeSchedule>> {
        let key = (route_id.clone(), stop_name.to_string(), academic_year);
        Ok(self.fee_schedules.read().await.get(&key).cloned())
    }

    async fn upsert_fee_schedule(&self, schedule: &FeeSchedule) -> Result<()> {
        schedule.validate()?;
        self.insert_fee_schedule(schedule.clone()).await;
        Ok(())
    }
}

#[async_trait]
impl PaymentRepository for InMemoryStore {
    async fn create_payment(&self, payment: &Payment) -> Result<()> {
        let mut payments = self.payments.write().await;
        if payments.contains_key(&payment.id)
            || payments
                .values()
                .any(|p| p.gateway_order_id == payment.gateway_order_id)
        {
            return Err(FeesError::Internal {
                message: format!("duplicate payment {}", payment.id),
            });
        }
        payments.insert(payment.id, payment.clone());
        Ok(())
    }

    async fn get_payment(&self, id: &PaymentId) -> Result<Option<Payment>> {
        Ok(self.payments.read().await.get(id).cloned())
    }

    async fn find_by_gateway_order(&self, gateway_order_id: &str) -> Result<Option<Payment>> {
        Ok(self
            .payments
            .read()
            .await
            .values()
            .find(|p| p.gateway_order_id == gateway_order_id)
            .cloned())
    }

    async fn find_confirmed_full_year(
        &self,
        student_id: &StudentId,
        academic_year: AcademicYear,
    ) -> Result<Option<Payment>> {
        Ok(self
            .payments
            .read()
            .await
            .values()
            .find(|p| Self::confirmed_match(p, student_id, academic_year, PaymentScope::FullYear))
            .cloned())
    }

    async fn find_confirmed_term(
        &self,
        student_id: &StudentId,
        academic_year: AcademicYear,
        term: Term,
    ) -> Result<Option<Payment>> {
        Ok(self
            .payments
            .read()
            .await
            .values()
            .find(|p| {
                Self::confirmed_match(p, student_id, academic_year, PaymentScope::Term { term })
            })
            .cloned())
    }

    async fn list_for_student(&self, student_id: &StudentId) -> Result<Vec<Payment>> {
        let mut payments: Vec<Payment> = self
            .payments
            .read()
            .await
            .values()
            .filter(|p| &p.student_id == student_id)
            .cloned()
            .collect();
        payments.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(payments)
    }

    async fn mark_failed(&self, id: &PaymentId, reason: &str, at: DateTime<Utc>) -> Result<bool> {
        let mut payments = self.payments.write().await;
        match payments.get_mut(id) {
            Some(payment) if payment.status == PaymentStatus::Pending => {
                payment.status = PaymentStatus::Failed;
                payment.failure_reason = Some(reason.to_string());
                payment.updated_at = at;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn confirm_payment(
        &self,
        id: &PaymentId,
        confirmation: &PaymentConfirmation,
    ) -> Result<ConfirmOutcome> {
        let mut payments = self.payments.write().await;
        let current = payments
            .get(id)
            .cloned()
            .ok_or_else(|| FeesError::not_found("payment", id))?;

        match current.status {
            PaymentStatus::Pending => {}
            PaymentStatus::Confirmed => return Ok(ConfirmOutcome::AlreadyConfirmed(current)),
            _ => return Ok(ConfirmOutcome::NotPending(current)),
        }

        // Mirrors the partial unique index on confirmed payments
        let duplicate = payments.values().any(|p| {
            p.id != current.id
                && Self::confirmed_match(
                    p,
                    &current.student_id,
                    current.academic_year,
                    current.scope,
                )
        });
        if duplicate {
            return Err(FeesError::AlreadyPaid {
                student_id: current.student_id.to_string(),
                coverage: format!("{} {}", current.scope, current.academic_year),
            });
        }

        // Mirrors the unique receipt_number column
        if payments
            .values()
            .any(|p| p.receipt_number.as_deref() == Some(confirmation.receipt_number.as_str()))
        {
            return Err(FeesError::Internal {
                message: format!("duplicate receipt number {}", confirmation.receipt_number),
            });
        }

        let mut updated = current;
        updated.apply_confirmation(confirmation)?;
        payments.insert(updated.id, updated.clone());
        Ok(ConfirmOutcome::Confirmed(updated))
    }
}

#[async_trait]
impl ScheduleRepository for InMemoryStore {
    async fn get_schedule(&self, id: &ScheduleId) -> Result<Option<Schedule>> {
        Ok(self.schedules.read().await.get(id).cloned())
    }

    async fn try_reserve_seat(&self, id: &ScheduleId) -> Result<Option<Schedule>> {
        let mut schedules = self.schedules.write().await;
        match schedules.get_mut(id) {
            Some(schedule)
                if schedule.booking_enabled
                    && schedule.status == ScheduleStatus::Scheduled
                    && schedule.booked_seats < schedule.available_seats =>
            {
                schedule.booked_seats += 1;
                Ok(Some(schedule.clone()))
            }
            _ => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn pending(order: &str) -> Payment {
        Payment::new_pending(
            StudentId::new("stu-1"),
            RouteId::new("route-7"),
            AcademicYear::new(2025).unwrap(),
            PaymentScope::Term { term: Term::First },
            1000,
            order.to_string(),
        )
    }

    fn confirmation(gateway_payment_id: &str) -> PaymentConfirmation {
        PaymentConfirmation {
            gateway_payment_id: gateway_payment_id.to_string(),
            gateway_signature: None,
            payment_method: None,
            paid_at: Utc::now(),
            valid_from: NaiveDate::from_ymd_opt(2025, 6, 10).unwrap(),
            valid_until: NaiveDate::from_ymd_opt(2025, 9, 30).unwrap(),
            receipt_number: "TRN-2025-T1-00000000".to_string(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_confirm_is_conditional() {
        let store = InMemoryStore::new();
        let payment = pending("order_1");
        store.create_payment(&payment).await.unwrap();

        let first = store
            .confirm_payment(&payment.id, &confirmation("pay_1"))
            .await
            .unwrap();
        assert!(matches!(first, ConfirmOutcome::Confirmed(_)));

        let second = store
            .confirm_payment(&payment.id, &confirmation("pay_1"))
            .await
            .unwrap();
        match second {
            ConfirmOutcome::AlreadyConfirmed(p) => assert!(p.is_confirmed_with("pay_1")),
            other => panic!("unexpected outcome {:?}", other),
        }

        assert!(!store.mark_failed(&payment.id, "late", Utc::now()).await.unwrap());
    }

    #[tokio::test]
    async fn test_second_confirmed_payment_for_same_term_is_rejected() {
        let store = InMemoryStore::new();
        let first = pending("order_1");
        let second = pending("order_2");
        store.create_payment(&first).await.unwrap();
        store.create_payment(&second).await.unwrap();

        store
            .confirm_payment(&first.id, &confirmation("pay_1"))
            .await
            .unwrap();
        let err = store
            .confirm_payment(&second.id, &confirmation("pay_2"))
            .await
            .unwrap_err();
        assert!(matches!(err, FeesError::AlreadyPaid { .. }));
    }

    #[tokio::test]
    async fn test_receipt_clash_is_not_reported_as_coverage() {
        let store = InMemoryStore::new();
        let first = pending("order_1");
        let mut second = pending("order_2");
        second.scope = PaymentScope::Term { term: Term::Second };
        store.create_payment(&first).await.unwrap();
        store.create_payment(&second).await.unwrap();

        store
            .confirm_payment(&first.id, &confirmation("pay_1"))
            .await
            .unwrap();
        let err = store
            .confirm_payment(&second.id, &confirmation("pay_2"))
            .await
            .unwrap_err();
        assert!(matches!(err, FeesError::Internal { .. }));
        assert_eq!(
            store.get_payment(&second.id).await.unwrap().unwrap().status,
            PaymentStatus::Pending
        );
    }

    #[tokio::test]
    async fn test_reserve_seat_stops_at_capacity() {
        let store = InMemoryStore::new();
        let id = ScheduleId::new("sch-1");
        store
            .insert_schedule(Schedule {
                id: id.clone(),
                route_id: RouteId::new("route-7"),
                date: NaiveDate::from_ymd_opt(2025, 11, 3).unwrap(),
                available_seats: 1,
                booked_seats: 0,
                booking_enabled: true,
                status: ScheduleStatus::Scheduled,
            })
            .await;

        assert!(store.try_reserve_seat(&id).await.unwrap().is_some());
        assert!(store.try_reserve_seat(&id).await.unwrap().is_none());
        assert_eq!(store.get_schedule(&id).await.unwrap().unwrap().booked_seats, 1);
    }
}
