//! Eligibility Evaluator: decides whether a student may book a trip on a date.
//!
//! Evaluation is read-only. Its inputs are the stored payments, the student
//! and route records and the term calendar, so repeated calls with the same
//! store contents always produce the same decision. Coverage is checked in
//! order: a confirmed full-year payment, then a confirmed payment for the
//! date's term whose validity window contains the date, then the previous
//! term's payment while the date is inside that term's grace window.

use crate::domain::calendar::TermCalendar;
use crate::domain::fees::FeeQuote;
use crate::domain::payments::Payment;
use crate::domain::transport::{Route, Student};
use crate::domain::types::{AcademicYear, PaymentId, ReceiptColor, RouteId, StudentId, Term};
use crate::error::{FeesError, Result};
use crate::storage::{PaymentRepository, Repositories, RouteRepository, StudentRepository};
use chrono::NaiveDate;
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CoverageBasis {
    FullYear,
    Term,
    Grace,
}

/// The payment that satisfied a booking date
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Coverage {
    pub payment_id: PaymentId,
    pub basis: CoverageBasis,
    pub academic_year: AcademicYear,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub term: Option<Term>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub receipt_number: Option<String>,
}

impl Coverage {
    fn from_payment(payment: &Payment, basis: CoverageBasis) -> Self {
        Self {
            payment_id: payment.id,
            basis,
            academic_year: payment.academic_year,
            term: payment.scope.term(),
            receipt_number: payment.receipt_number.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TermPaymentOption {
    pub amount: i64,
    pub term: Term,
    pub receipt_color: ReceiptColor,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FullYearPaymentOption {
    pub amount: i64,
    pub savings: i64,
    pub receipt_color: ReceiptColor,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentOptions {
    pub term_payment: TermPaymentOption,
    pub full_year_payment: FullYearPaymentOption,
}

impl From<&FeeQuote> for PaymentOptions {
    fn from(quote: &FeeQuote) -> Self {
        Self {
            term_payment: TermPaymentOption {
                amount: quote.term_fee,
                term: quote.term,
                receipt_color: quote.term_receipt_color,
            },
            full_year_payment: FullYearPaymentOption {
                amount: quote.full_year_fee,
                savings: quote.savings,
                receipt_color: ReceiptColor::Green,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EligibilityDecision {
    pub can_book: bool,
    pub reason: String,
    pub payment_required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required_term: Option<Term>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_options: Option<PaymentOptions>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub covered_by: Option<Coverage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub academic_year: Option<AcademicYear>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub route_id: Option<RouteId>,
}

impl EligibilityDecision {
    /// Denial with no payment implication
    pub fn denied(reason: impl Into<String>) -> Self {
        Self {
            can_book: false,
            reason: reason.into(),
            payment_required: false,
            required_term: None,
            payment_options: None,
            covered_by: None,
            academic_year: None,
            route_id: None,
        }
    }

    pub fn allowed(
        reason: impl Into<String>,
        coverage: Coverage,
        academic_year: AcademicYear,
        route_id: RouteId,
    ) -> Self {
        Self {
            can_book: true,
            reason: reason.into(),
            payment_required: false,
            required_term: None,
            payment_options: None,
            covered_by: Some(coverage),
            academic_year: Some(academic_year),
            route_id: Some(route_id),
        }
    }

    pub fn payment_required(
        required_term: Term,
        academic_year: AcademicYear,
        route_id: RouteId,
    ) -> Self {
        Self {
            can_book: false,
            reason: format!("payment required for {} of {}", required_term, academic_year),
            payment_required: true,
            required_term: Some(required_term),
            payment_options: None,
            covered_by: None,
            academic_year: Some(academic_year),
            route_id: Some(route_id),
        }
    }
}

pub struct EligibilityEvaluator {
    students: Arc<dyn StudentRepository>,
    routes: Arc<dyn RouteRepository>,
    payments: Arc<dyn PaymentRepository>,
    calendar: TermCalendar,
}

impl EligibilityEvaluator {
    pub fn new(repos: &Repositories, calendar: TermCalendar) -> Self {
        Self {
            students: repos.students.clone(),
            routes: repos.routes.clone(),
            payments: repos.payments.clone(),
            calendar,
        }
    }

    pub async fn load_student(&self, student_id: &StudentId) -> Result<Student> {
        self.students
            .get_student(student_id)
            .await?
            .ok_or_else(|| FeesError::not_found("student", student_id))
    }

    /// The explicit route wins over the allocated one; a candidate only
    /// counts when it exists and is active.
    pub async fn resolve_route(
        &self,
        student: &Student,
        explicit: Option<&RouteId>,
    ) -> Result<Option<Route>> {
        let candidates = [explicit, student.allocated_route_id.as_ref()];
        for route_id in candidates.into_iter().flatten() {
            match self.routes.get_route(route_id).await? {
                Some(route) if route.active => return Ok(Some(route)),
                Some(_) => debug!(student_id = %student.id, %route_id, "skipping inactive route"),
                None => debug!(student_id = %student.id, %route_id, "skipping unknown route"),
            }
        }
        Ok(None)
    }

    pub async fn evaluate(
        &self,
        student_id: &StudentId,
        booking_date: NaiveDate,
        route_id: Option<&RouteId>,
    ) -> Result<EligibilityDecision> {
        let student = self.load_student(student_id).await?;
        if !student.enrolled {
            return Ok(EligibilityDecision::denied("not enrolled"));
        }

        let Some(route) = self.resolve_route(&student, route_id).await? else {
            return Ok(EligibilityDecision::denied("no active route for student"));
        };

        let resolution = self.calendar.resolve(booking_date)?;
        let academic_year = resolution.academic_year;

        if let Some(payment) = self
            .payments
            .find_confirmed_full_year(student_id, academic_year)
            .await?
        {
            return Ok(EligibilityDecision::allowed(
                format!("full-year payment covers {}", academic_year),
                Coverage::from_payment(&payment, CoverageBasis::FullYear),
                academic_year,
                route.id,
            ));
        }

        if let Some(payment) = self
            .payments
            .find_confirmed_term(student_id, academic_year, resolution.term)
            .await?
        {
            if payment.covers_date(booking_date) {
                return Ok(EligibilityDecision::allowed(
                    format!("{} payment covers {}", resolution.term, booking_date),
                    Coverage::from_payment(&payment, CoverageBasis::Term),
                    academic_year,
                    route.id,
                ));
            }
            debug!(
                %student_id, payment_id = %payment.id, %booking_date,
                "term payment found but its validity window excludes the date"
            );
        }

        if let Some(grace) = self.calendar.previous_term_grace(booking_date)? {
            let mut previous = self
                .payments
                .find_confirmed_term(student_id, grace.academic_year, grace.term)
                .await?;
            if previous.is_none() && grace.academic_year != academic_year {
                previous = self
                    .payments
                    .find_confirmed_full_year(student_id, grace.academic_year)
                    .await?;
            }
            if let Some(payment) = previous {
                return Ok(EligibilityDecision::allowed(
                    format!(
                        "{} {} payment covers {} within the grace period ending {}",
                        grace.term, grace.academic_year, booking_date, grace.grace_end
                    ),
                    Coverage::from_payment(&payment, CoverageBasis::Grace),
                    academic_year,
                    route.id,
                ));
            }
        }

        Ok(EligibilityDecision::payment_required(
            resolution.term,
            academic_year,
            route.id,
        ))
    }
}
