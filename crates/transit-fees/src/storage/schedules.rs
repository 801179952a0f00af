use super::{PgRepos, ScheduleRepository};
use crate::domain::transport::{Schedule, ScheduleStatus};
use crate::domain::types::{RouteId, ScheduleId};
use crate::error::{FeesError, Result};
use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::Row;

const SCHEDULE_COLUMNS: &str =
    "id, route_id, date, available_seats, booked_seats, booking_enabled, status";

fn schedule_from_row(row: &PgRow) -> Result<Schedule> {
    let status: String = row.get("status");
    let status = ScheduleStatus::parse(&status).ok_or_else(|| FeesError::Internal {
        message: format!("unknown schedule status '{}'", status),
    })?;
    let available: i32 = row.get("available_seats");
    let booked: i32 = row.get("booked_seats");

    Ok(Schedule {
        id: ScheduleId::new(row.get::<String, _>("id")),
        route_id: RouteId::new(row.get::<String, _>("route_id")),
        date: row.get("date"),
        available_seats: u32::try_from(available).unwrap_or(0),
        booked_seats: u32::try_from(booked).unwrap_or(0),
        booking_enabled: row.get("booking_enabled"),
        status,
    })
}

#[async_trait]
impl ScheduleRepository for PgRepos {
    async fn get_schedule(&self, id: &ScheduleId) -> Result<Option<Schedule>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM schedules WHERE id = $1",
            SCHEDULE_COLUMNS
        ))
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| FeesError::database("get_schedule", e))?;

        row.as_ref().map(schedule_from_row).transpose()
    }

    async fn try_reserve_seat(&self, id: &ScheduleId) -> Result<Option<Schedule>> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE schedules
            SET booked_seats = booked_seats + 1
            WHERE id = $1
              AND booking_enabled
              AND status = 'scheduled'
              AND booked_seats < available_seats
            RETURNING {}
            "#,
            SCHEDULE_COLUMNS
        ))
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| FeesError::database("try_reserve_seat", e))?;

        row.as_ref().map(schedule_from_row).transpose()
    }
}
