use crate::domain::fees::FeeSchedule;
use crate::domain::payments::{ConfirmOutcome, Payment, PaymentConfirmation};
use crate::domain::transport::{Route, Schedule, Student};
use crate::domain::types::{AcademicYear, PaymentId, RouteId, ScheduleId, StudentId, Term};
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::sync::Arc;

pub mod fee_schedules;
pub mod memory;
pub mod payments;
pub mod schedules;
pub mod students;

pub use memory::InMemoryStore;

#[async_trait]
pub trait StudentRepository: Send + Sync {
    async fn get_student(&self, id: &StudentId) -> Result<Option<Student>>;
}

#[async_trait]
pub trait RouteRepository: Send + Sync {
    async fn get_route(&self, id: &RouteId) -> Result<Option<Route>>;
}

#[async_trait]
pub trait FeeScheduleRepository: Send + Sync {
    async fn get_fee_schedule(
        &self,
        route_id: &RouteId,
        stop_name: &str,
        academic_year: AcademicYear,
    ) -> Result<Option<FeeSchedule>>;

    async fn upsert_fee_schedule(&self, schedule: &FeeSchedule) -> Result<()>;
}

#[async_trait]
pub trait PaymentRepository: Send + Sync {
    async fn create_payment(&self, payment: &Payment) -> Result<()>;
    async fn get_payment(&self, id: &PaymentId) -> Result<Option<Payment>>;
    async fn find_by_gateway_order(&self, gateway_order_id: &str) -> Result<Option<Payment>>;

    async fn find_confirmed_full_year(
        &self,
        student_id: &StudentId,
        academic_year: AcademicYear,
    ) -> Result<Option<Payment>>;

    async fn find_confirmed_term(
        &self,
        student_id: &StudentId,
        academic_year: AcademicYear,
        term: Term,
    ) -> Result<Option<Payment>>;

    /// Newest first
    async fn list_for_student(&self, student_id: &StudentId) -> Result<Vec<Payment>>;

    /// Marks a pending payment failed. Returns false when the payment was not
    /// pending, in which case nothing is written.
    async fn mark_failed(&self, id: &PaymentId, reason: &str, at: DateTime<Utc>) -> Result<bool>;

    /// Single conditional write: applies only while the payment is pending
    async fn confirm_payment(
        &self,
        id: &PaymentId,
        confirmation: &PaymentConfirmation,
    ) -> Result<ConfirmOutcome>;
}

#[async_trait]
pub trait ScheduleRepository: Send + Sync {
    async fn get_schedule(&self, id: &ScheduleId) -> Result<Option<Schedule>>;

    /// Atomically takes one seat if the schedule is open and not full.
    /// Returns the updated schedule, or `None` when no seat was taken.
    async fn try_reserve_seat(&self, id: &ScheduleId) -> Result<Option<Schedule>>;
}

/// The repositories the engine depends on, injected as trait objects
#[derive(Clone)]
pub struct Repositories {
    pub students: Arc<dyn StudentRepository>,
    pub routes: Arc<dyn RouteRepository>,
    pub fee_schedules: Arc<dyn FeeScheduleRepository>,
    pub payments: Arc<dyn PaymentRepository>,
    pub schedules: Arc<dyn ScheduleRepository>,
}

impl Repositories {
    /// Uses one store for every repository
    pub fn from_store<S>(store: Arc<S>) -> Self
    where
        S: StudentRepository
            + RouteRepository
            + FeeScheduleRepository
            + PaymentRepository
            + ScheduleRepository
            + 'static,
    {
        Self {
            students: store.clone(),
            routes: store.clone(),
            fee_schedules: store.clone(),
            payments: store.clone(),
            schedules: store,
        }
    }
}

#[derive(Clone)]
pub struct PgRepos {
    pub pool: PgPool,
}

impl PgRepos {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}
