use crate::domain::booking::{BookingDecision, BookingRequest, BookingTarget};
use crate::domain::calendar::TermResolution;
use crate::domain::types::{RouteId, ScheduleId, StudentId};
use crate::error::{FeesError, Result};
use crate::server::AppState;
use axum::{
    extract::{Path, State},
    response::Json,
};
use chrono::NaiveDate;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EligibilityQuery {
    pub student_id: StudentId,
    #[serde(default)]
    pub schedule_id: Option<ScheduleId>,
    #[serde(default)]
    pub booking_date: Option<NaiveDate>,
    #[serde(default)]
    pub route_id: Option<RouteId>,
}

impl EligibilityQuery {
    /// A schedule, when given, supplies both the date and the route
    pub fn into_request(self) -> Result<BookingRequest> {
        let target = match (self.schedule_id, self.booking_date) {
            (Some(schedule_id), _) => BookingTarget::Schedule(schedule_id),
            (None, Some(date)) => BookingTarget::Date(date),
            (None, None) => {
                return Err(FeesError::validation(
                    "either scheduleId or bookingDate is required",
                ))
            }
        };
        if self.student_id.as_str().trim().is_empty() {
            return Err(FeesError::validation("studentId is required"));
        }
        Ok(BookingRequest {
            student_id: self.student_id,
            target,
            route_id: self.route_id,
        })
    }
}

pub async fn check_eligibility(
    State(state): State<AppState>,
    Json(query): Json<EligibilityQuery>,
) -> Result<Json<BookingDecision>> {
    let request = query.into_request()?;
    let decision = state.engine.gate.can_book(&request).await?;
    Ok(Json(decision))
}

pub async fn resolve_term(
    State(state): State<AppState>,
    Path(date): Path<String>,
) -> Result<Json<TermResolution>> {
    let date = NaiveDate::parse_from_str(&date, "%Y-%m-%d")
        .map_err(|_| FeesError::validation(format!("invalid date '{}', expected YYYY-MM-DD", date)))?;
    Ok(Json(state.engine.resolve_term(date)?))
}
