use crate::audit::{AuditEvent, AuditSink};
use crate::domain::eligibility::EligibilityEvaluator;
use crate::domain::fees::FeeQuoteBuilder;
use crate::domain::payments::{Payment, PaymentScope};
use crate::domain::types::{AcademicYear, PaymentId, RouteId, StudentId};
use crate::error::{FeesError, Result};
use crate::gateway::{OrderRequest, PaymentGateway};
use crate::storage::PaymentRepository;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceOrder {
    pub student_id: StudentId,
    pub academic_year: AcademicYear,
    pub scope: PaymentScope,
    #[serde(default)]
    pub route_id: Option<RouteId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlacedOrder {
    pub payment_id: PaymentId,
    pub gateway_order_id: String,
    /// Major units
    pub amount: i64,
    pub amount_minor: i64,
    pub scope: PaymentScope,
    pub academic_year: AcademicYear,
}

/// Opens gateway orders and records them as pending payments
pub struct OrderService {
    evaluator: Arc<EligibilityEvaluator>,
    quotes: Arc<FeeQuoteBuilder>,
    payments: Arc<dyn PaymentRepository>,
    gateway: Arc<dyn PaymentGateway>,
    audit: Arc<dyn AuditSink>,
}

impl OrderService {
    pub fn new(
        evaluator: Arc<EligibilityEvaluator>,
        quotes: Arc<FeeQuoteBuilder>,
        payments: Arc<dyn PaymentRepository>,
        gateway: Arc<dyn PaymentGateway>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            evaluator,
            quotes,
            payments,
            gateway,
            audit,
        }
    }

    pub async fn place_order(&self, order: &PlaceOrder) -> Result<PlacedOrder> {
        let student = self.evaluator.load_student(&order.student_id).await?;
        if !student.enrolled {
            return Err(FeesError::PolicyDenied {
                reason: "not enrolled".to_string(),
            });
        }
        let route = self
            .evaluator
            .resolve_route(&student, order.route_id.as_ref())
            .await?
            .ok_or_else(|| FeesError::PolicyDenied {
                reason: "no active route for student".to_string(),
            })?;
        let stop_name = student.boarding_stop.clone().ok_or_else(|| {
            FeesError::validation(format!("student {} has no boarding stop", student.id))
        })?;

        self.ensure_not_paid(&student.id, order.academic_year, order.scope)
            .await?;

        let schedule = self
            .quotes
            .load_schedule(&route.id, &stop_name, order.academic_year)
            .await?;
        let mut payment = Payment::new_pending(
            student.id.clone(),
            route.id.clone(),
            order.academic_year,
            order.scope,
            schedule.fee_for(order.scope),
            String::new(),
        );
        let amount_minor = payment.amount_minor()?;

        let gateway_order = self
            .gateway
            .create_order(&OrderRequest {
                amount_minor,
                receipt: payment.id.to_string(),
            })
            .await?;
        if gateway_order.amount_minor != amount_minor {
            return Err(FeesError::AmountMismatch {
                expected_minor: amount_minor,
                actual_minor: gateway_order.amount_minor,
            });
        }
        payment.gateway_order_id = gateway_order.order_id;
        self.payments.create_payment(&payment).await?;

        info!(
            payment_id = %payment.id, student_id = %student.id, scope = %order.scope,
            amount = payment.amount_paid, gateway_order_id = %payment.gateway_order_id,
            "order placed"
        );
        self.audit
            .record(AuditEvent::OrderPlaced {
                payment_id: payment.id,
                student_id: student.id.clone(),
                academic_year: order.academic_year,
                scope: order.scope,
                amount: payment.amount_paid,
                gateway_order_id: payment.gateway_order_id.clone(),
            })
            .await;

        Ok(PlacedOrder {
            payment_id: payment.id,
            gateway_order_id: payment.gateway_order_id,
            amount: payment.amount_paid,
            amount_minor,
            scope: order.scope,
            academic_year: order.academic_year,
        })
    }

    /// A confirmed full-year payment dominates every product of its year
    async fn ensure_not_paid(
        &self,
        student_id: &StudentId,
        academic_year: AcademicYear,
        scope: PaymentScope,
    ) -> Result<()> {
        let already = if let Some(full_year) = self
            .payments
            .find_confirmed_full_year(student_id, academic_year)
            .await?
        {
            Some(full_year)
        } else if let Some(term) = scope.term() {
            self.payments
                .find_confirmed_term(student_id, academic_year, term)
                .await?
        } else {
            None
        };

        match already {
            Some(payment) => Err(FeesError::AlreadyPaid {
                student_id: student_id.to_string(),
                coverage: format!("{} {}", payment.scope, academic_year),
            }),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::MemoryAuditSink;
    use crate::domain::calendar::TermCalendar;
    use crate::domain::fees::FeeSchedule;
    use crate::domain::payments::{PaymentConfirmation, PaymentStatus};
    use crate::domain::transport::{Route, Student};
    use crate::domain::types::Term;
    use crate::gateway::{GatewayOrder, MockPaymentGateway};
    use crate::storage::{InMemoryStore, Repositories};
    use chrono::{NaiveDate, Utc};

    async fn service(gateway: MockPaymentGateway) -> (Arc<InMemoryStore>, OrderService) {
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

        let repos = Repositories::from_store(store.clone());
        let service = OrderService::new(
            Arc::new(EligibilityEvaluator::new(&repos, TermCalendar::new(3))),
            Arc::new(FeeQuoteBuilder::new(repos.fee_schedules.clone())),
            repos.payments.clone(),
            Arc::new(gateway),
            Arc::new(MemoryAuditSink::new()),
        );
        (store, service)
    }

    fn order(scope: PaymentScope) -> PlaceOrder {
        PlaceOrder {
            student_id: StudentId::new("stu-1"),
            academic_year: AcademicYear::new(2025).unwrap(),
            scope,
            route_id: None,
        }
    }

    #[tokio::test]
    async fn test_place_term_order() {
        let mut gateway = MockPaymentGateway::new();
        gateway
            .expect_create_order()
            .withf(|request| request.amount_minor == 350_000)
            .times(1)
            .returning(|request| {
                Ok(GatewayOrder {
                    order_id: "order_t3".to_string(),
                    amount_minor: request.amount_minor,
                })
            });
        let (store, service) = service(gateway).await;

        let placed = service
            .place_order(&order(PaymentScope::Term { term: Term::Third }))
            .await
            .unwrap();
        assert_eq!(placed.amount, 3500);
        assert_eq!(placed.gateway_order_id, "order_t3");

        let stored = store
            .find_by_gateway_order("order_t3")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.id, placed.payment_id);
        assert_eq!(stored.status, PaymentStatus::Pending);
        assert_eq!(stored.amount_paid, 3500);
    }

    #[tokio::test]
    async fn test_full_year_payment_blocks_new_orders() {
        let mut gateway = MockPaymentGateway::new();
        gateway.expect_create_order().times(0);
        let (store, service) = service(gateway).await;

        let paid = Payment::new_pending(
            StudentId::new("stu-1"),
            RouteId::new("route-7"),
            AcademicYear::new(2025).unwrap(),
            PaymentScope::FullYear,
            10500,
            "order_fy".to_string(),
        );
        store.create_payment(&paid).await.unwrap();
        store
            .confirm_payment(
                &paid.id,
                &PaymentConfirmation {
                    gateway_payment_id: "pay_fy".to_string(),
                    gateway_signature: None,
                    payment_method: None,
                    paid_at: Utc::now(),
                    valid_from: NaiveDate::from_ymd_opt(2025, 6, 5).unwrap(),
                    valid_until: NaiveDate::from_ymd_opt(2026, 5, 31).unwrap(),
                    receipt_number: "TRN-2025-FY-00000001".to_string(),
                    updated_at: Utc::now(),
                },
            )
            .await
            .unwrap();

        let err = service
            .place_order(&order(PaymentScope::Term { term: Term::Second }))
            .await
            .unwrap_err();
        assert!(matches!(err, FeesError::AlreadyPaid { .. }));
    }

    #[tokio::test]
    async fn test_gateway_outage_stores_nothing() {
        let mut gateway = MockPaymentGateway::new();
        gateway.expect_create_order().times(1).returning(|_| {
            Err(FeesError::GatewayUnavailable {
                message: "connection refused".to_string(),
            })
        });
        let (store, service) = service(gateway).await;

        let err = service
            .place_order(&order(PaymentScope::FullYear))
            .await
            .unwrap_err();
        assert!(err.is_retryable());
        assert!(store
            .list_for_student(&StudentId::new("stu-1"))
            .await
            .unwrap()
            .is_empty());
    }
}
