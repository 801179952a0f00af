use crate::audit::AuditSink;
use crate::config::FeesConfig;
use crate::domain::booking::BookingGate;
use crate::domain::calendar::{TermCalendar, TermResolution};
use crate::domain::eligibility::EligibilityEvaluator;
use crate::domain::fees::FeeQuoteBuilder;
use crate::domain::orders::OrderService;
use crate::domain::payments::Payment;
use crate::domain::types::StudentId;
use crate::domain::verifier::{PaymentVerifier, VerifierPolicy};
use crate::error::{FeesError, Result};
use crate::gateway::{GatewaySigner, PaymentGateway};
use crate::storage::Repositories;
use chrono::NaiveDate;
use std::sync::Arc;

/// Every engine component, built once over the same injected repositories
pub struct FeesEngine {
    repos: Repositories,
    calendar: TermCalendar,
    pub evaluator: Arc<EligibilityEvaluator>,
    pub quotes: Arc<FeeQuoteBuilder>,
    pub verifier: PaymentVerifier,
    pub gate: BookingGate,
    pub orders: OrderService,
}

impl FeesEngine {
    pub fn new(
        repos: Repositories,
        gateway: Arc<dyn PaymentGateway>,
        audit: Arc<dyn AuditSink>,
        config: &FeesConfig,
    ) -> Self {
        let calendar = TermCalendar::from_policy(&config.policy);
        let evaluator = Arc::new(EligibilityEvaluator::new(&repos, calendar));
        let quotes = Arc::new(FeeQuoteBuilder::new(repos.fee_schedules.clone()));

        let verifier = PaymentVerifier::new(
            &repos,
            gateway.clone(),
            GatewaySigner::new(config.gateway.key_secret.clone()),
            calendar,
            VerifierPolicy::from_config(config),
            audit.clone(),
        );
        let gate = BookingGate::new(
            evaluator.clone(),
            quotes.clone(),
            repos.schedules.clone(),
            audit.clone(),
        );
        let orders = OrderService::new(
            evaluator.clone(),
            quotes.clone(),
            repos.payments.clone(),
            gateway,
            audit,
        );

        Self {
            repos,
            calendar,
            evaluator,
            quotes,
            verifier,
            gate,
            orders,
        }
    }

    pub fn resolve_term(&self, date: NaiveDate) -> Result<TermResolution> {
        self.calendar.resolve(date)
    }

    /// Newest first; unknown students are `NotFound` rather than an empty list
    pub async fn payment_history(&self, student_id: &StudentId) -> Result<Vec<Payment>> {
        self.repos
            .students
            .get_student(student_id)
            .await?
            .ok_or_else(|| FeesError::not_found("student", student_id))?;
        self.repos.payments.list_for_student(student_id).await
    }
}
