use crate::domain::booking::SeatReservation;
use crate::domain::types::{ScheduleId, StudentId};
use crate::error::Result;
use crate::server::AppState;
use axum::{extract::State, http::StatusCode, response::Json};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBookingRequest {
    pub student_id: StudentId,
    pub schedule_id: ScheduleId,
}

pub async fn create_booking(
    State(state): State<AppState>,
    Json(request): Json<CreateBookingRequest>,
) -> Result<(StatusCode, Json<SeatReservation>)> {
    let reservation = state
        .engine
        .gate
        .book(&request.student_id, &request.schedule_id)
        .await?;
    Ok((StatusCode::CREATED, Json(reservation)))
}
