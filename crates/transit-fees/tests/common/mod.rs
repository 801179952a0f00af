#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use transit_fees::audit::MemoryAuditSink;
use transit_fees::config::FeesConfig;
use transit_fees::domain::fees::FeeSchedule;
use transit_fees::domain::payments::{Payment, PaymentScope};
use transit_fees::domain::transport::{Route, Schedule, ScheduleStatus, Student};
use transit_fees::domain::types::{AcademicYear, RouteId, ScheduleId, StudentId};
use transit_fees::domain::verifier::VerificationRequest;
use transit_fees::error::{FeesError, Result};
use transit_fees::gateway::{
    GatewayOrder, GatewaySigner, OrderRequest, PaymentGateway, Settlement, SettlementStatus,
};
use transit_fees::storage::{InMemoryStore, PaymentRepository, Repositories};
use transit_fees::FeesEngine;

pub const SECRET: &str = "integration-secret";
pub const STUDENT: &str = "stu-1";
pub const ROUTE: &str = "route-7";
pub const STOP: &str = "Main Gate";

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn noon(day: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&day.and_hms_opt(12, 0, 0).unwrap())
}

pub fn year(start: i32) -> AcademicYear {
    AcademicYear::new(start).unwrap()
}

/// Gateway double that answers from a table of settlements
#[derive(Default)]
pub struct FakeGateway {
    settlements: Mutex<HashMap<String, Settlement>>,
    orders: AtomicUsize,
    fetches: AtomicUsize,
}

impl FakeGateway {
    pub fn settle(
        &self,
        gateway_payment_id: &str,
        order_id: &str,
        amount_minor: i64,
        status: SettlementStatus,
        captured_at: DateTime<Utc>,
    ) {
        self.settlements.lock().unwrap().insert(
            gateway_payment_id.to_string(),
            Settlement {
                payment_id: gateway_payment_id.to_string(),
                order_id: Some(order_id.to_string()),
                status,
                amount_minor,
                method: Some("upi".to_string()),
                captured_at,
            },
        );
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    async fn fetch_settlement(&self, gateway_payment_id: &str) -> Result<Settlement> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.settlements
            .lock()
            .unwrap()
            .get(gateway_payment_id)
            .cloned()
            .ok_or_else(|| FeesError::not_found("gateway payment", gateway_payment_id))
    }

    async fn create_order(&self, request: &OrderRequest) -> Result<GatewayOrder> {
        let n = self.orders.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(GatewayOrder {
            order_id: format!("order_{:04}", n),
            amount_minor: request.amount_minor,
        })
    }
}

pub struct TestContext {
    pub store: Arc<InMemoryStore>,
    pub gateway: Arc<FakeGateway>,
    pub audit: Arc<MemoryAuditSink>,
    pub config: FeesConfig,
    pub engine: FeesEngine,
}

impl TestContext {
    pub async fn new() -> Self {
        Self::with_config(Self::config()).await
    }

    pub fn config() -> FeesConfig {
        let mut config = FeesConfig::default();
        config.gateway.key_secret = SECRET.to_string();
        config
    }

    pub async fn with_config(config: FeesConfig) -> Self {
        let store = Arc::new(InMemoryStore::new());
        Self::seed(&store).await;

        let gateway = Arc::new(FakeGateway::default());
        let audit = Arc::new(MemoryAuditSink::new());
        let engine = FeesEngine::new(
            Repositories::from_store(store.clone()),
            gateway.clone(),
            audit.clone(),
            &config,
        );

        Self {
            store,
            gateway,
            audit,
            config,
            engine,
        }
    }

    async fn seed(store: &InMemoryStore) {
        store
            .insert_route(Route {
                id: RouteId::new(ROUTE),
                name: "North Loop".to_string(),
                active: true,
            })
            .await;
        store
            .insert_student(Student {
                id: StudentId::new(STUDENT),
                name: "Asha".to_string(),
                enrolled: true,
                allocated_route_id: Some(RouteId::new(ROUTE)),
                boarding_stop: Some(STOP.to_string()),
            })
            .await;
        for start in [2024, 2025] {
            store
                .insert_fee_schedule(FeeSchedule {
                    route_id: RouteId::new(ROUTE),
                    stop_name: STOP.to_string(),
                    academic_year: year(start),
                    term1_fee: 1000,
                    term2_fee: 1000,
                    term3_fee: 900,
                    full_year_fee: 2700,
                })
                .await;
        }
    }

    pub async fn add_schedule(&self, id: &str, day: NaiveDate, seats: u32) -> ScheduleId {
        let schedule_id = ScheduleId::new(id);
        self.store
            .insert_schedule(Schedule {
                id: schedule_id.clone(),
                route_id: RouteId::new(ROUTE),
                date: day,
                available_seats: seats,
                booked_seats: 0,
                booking_enabled: true,
                status: ScheduleStatus::Scheduled,
            })
            .await;
        schedule_id
    }

    /// Stores a pending order the way the order flow would
    pub async fn pending(&self, scope: PaymentScope, academic_year: AcademicYear, amount: i64) -> Payment {
        let payment = Payment::new_pending(
            StudentId::new(STUDENT),
            RouteId::new(ROUTE),
            academic_year,
            scope,
            amount,
            format!("order_{}", uuid::Uuid::new_v4().simple()),
        );
        self.store.create_payment(&payment).await.unwrap();
        payment
    }

    pub fn callback(&self, payment: &Payment, gateway_payment_id: &str) -> VerificationRequest {
        VerificationRequest {
            gateway_order_id: payment.gateway_order_id.clone(),
            gateway_payment_id: gateway_payment_id.to_string(),
            signature: GatewaySigner::new(SECRET).sign(&payment.gateway_order_id, gateway_payment_id),
            internal_payment_id: Some(payment.id),
            demo_flag: false,
        }
    }

    /// Pending order, captured settlement and verified callback in one step
    pub async fn paid(
        &self,
        scope: PaymentScope,
        academic_year: AcademicYear,
        amount: i64,
        captured_on: NaiveDate,
    ) -> Payment {
        let payment = self.pending(scope, academic_year, amount).await;
        let gateway_payment_id = format!("pay_{}", payment.id.as_uuid().simple());
        self.gateway.settle(
            &gateway_payment_id,
            &payment.gateway_order_id,
            amount * 100,
            SettlementStatus::Captured,
            noon(captured_on),
        );
        self.engine
            .verifier
            .verify(&self.callback(&payment, &gateway_payment_id))
            .await
            .unwrap();
        self.store.get_payment(&payment.id).await.unwrap().unwrap()
    }
}
