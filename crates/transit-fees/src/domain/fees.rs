use crate::domain::payments::PaymentScope;
use crate::domain::types::{AcademicYear, ReceiptColor, RouteId, Term};
use crate::error::{FeesError, Result};
use crate::storage::FeeScheduleRepository;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, info};

/// Published fees for one (route, stop, academic year); major currency units
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeSchedule {
    pub route_id: RouteId,
    pub stop_name: String,
    pub academic_year: AcademicYear,
    pub term1_fee: i64,
    pub term2_fee: i64,
    pub term3_fee: i64,
    pub full_year_fee: i64,
}

impl FeeSchedule {
    pub fn term_fee(&self, term: Term) -> i64 {
        match term {
            Term::First => self.term1_fee,
            Term::Second => self.term2_fee,
            Term::Third => self.term3_fee,
        }
    }

    pub fn fee_for(&self, scope: PaymentScope) -> i64 {
        match scope {
            PaymentScope::Term { term } => self.term_fee(term),
            PaymentScope::FullYear => self.full_year_fee,
        }
    }

    pub fn total_term_fees(&self) -> i64 {
        self.term1_fee
            .saturating_add(self.term2_fee)
            .saturating_add(self.term3_fee)
    }

    /// What paying for the full year saves over paying term by term
    pub fn savings(&self) -> Result<i64> {
        self.validate()?;
        Ok(self.total_term_fees() - self.full_year_fee)
    }

    pub fn validate(&self) -> Result<()> {
        let fees = [
            self.term1_fee,
            self.term2_fee,
            self.term3_fee,
            self.full_year_fee,
        ];
        if fees.iter().any(|fee| *fee <= 0) {
            return Err(FeesError::InvalidFeeSchedule {
                message: format!(
                    "fees for route {} stop '{}' ({}) must be positive",
                    self.route_id, self.stop_name, self.academic_year
                ),
            });
        }
        if self.full_year_fee > self.total_term_fees() {
            return Err(FeesError::InvalidFeeSchedule {
                message: format!(
                    "full-year fee {} exceeds the sum of term fees {} for route {} stop '{}' ({})",
                    self.full_year_fee,
                    self.total_term_fees(),
                    self.route_id,
                    self.stop_name,
                    self.academic_year
                ),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeQuote {
    pub route_id: RouteId,
    pub stop_name: String,
    pub academic_year: AcademicYear,
    pub term: Term,
    pub term_fee: i64,
    pub term_receipt_color: ReceiptColor,
    pub full_year_fee: i64,
    pub savings: i64,
}

pub struct FeeQuoteBuilder {
    repository: Arc<dyn FeeScheduleRepository>,
}

impl FeeQuoteBuilder {
    pub fn new(repository: Arc<dyn FeeScheduleRepository>) -> Self {
        Self { repository }
    }

    /// Loads and validates the schedule. `NotFound` means the route cannot be
    /// priced, which callers must keep apart from "not eligible".
    pub async fn load_schedule(
        &self,
        route_id: &RouteId,
        stop_name: &str,
        academic_year: AcademicYear,
    ) -> Result<FeeSchedule> {
        let schedule = self
            .repository
            .get_fee_schedule(route_id, stop_name, academic_year)
            .await?
            .ok_or_else(|| {
                FeesError::not_found(
                    "fee schedule",
                    format!("{}/{}/{}", route_id, stop_name, academic_year),
                )
            })?;

        if let Err(e) = schedule.validate() {
            error!(%route_id, stop_name, %academic_year, "rejecting fee schedule: {}", e);
            return Err(e);
        }
        Ok(schedule)
    }

    /// Stores a schedule for quoting. An inconsistent schedule is the
    /// publisher's mistake, so it surfaces as a validation error here.
    pub async fn publish(&self, schedule: &FeeSchedule) -> Result<()> {
        schedule
            .validate()
            .map_err(|e| FeesError::validation(e.to_string()))?;
        self.repository.upsert_fee_schedule(schedule).await?;
        info!(
            route_id = %schedule.route_id, stop_name = %schedule.stop_name,
            academic_year = %schedule.academic_year, full_year_fee = schedule.full_year_fee,
            "fee schedule published"
        );
        Ok(())
    }

    pub async fn quote(
        &self,
        route_id: &RouteId,
        stop_name: &str,
        academic_year: AcademicYear,
        required_term: Term,
    ) -> Result<FeeQuote> {
        let schedule = self
            .load_schedule(route_id, stop_name, academic_year)
            .await?;
        let savings = schedule.savings()?;

        debug!(
            %route_id, stop_name, %academic_year, term = required_term.number(),
            savings, "built fee quote"
        );

        Ok(FeeQuote {
            route_id: route_id.clone(),
            stop_name: stop_name.to_string(),
            academic_year,
            term: required_term,
            term_fee: schedule.term_fee(required_term),
            term_receipt_color: required_term.receipt_color(),
            full_year_fee: schedule.full_year_fee,
            savings,
        })
    }
}
