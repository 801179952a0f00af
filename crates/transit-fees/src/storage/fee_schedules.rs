use super::{FeeScheduleRepository, PgRepos};
use crate::domain::fees::FeeSchedule;
use crate::domain::types::{AcademicYear, RouteId};
use crate::error::{FeesError, Result};
use async_trait::async_trait;
use sqlx::Row;

#[async_trait]
impl FeeScheduleRepository for PgRepos {
    async fn get_fee_schedule(
        &self,
        route_id: &RouteId,
        stop_name: &str,
        academic_year: AcademicYear,
    ) -> Result<Option<FeeSchedule>> {
        let row = sqlx::query(
            r#"
            SELECT term1_fee, term2_fee, term3_fee, full_year_fee
            FROM fee_schedules
            WHERE route_id = $1 AND stop_name = $2 AND academic_year = $3
            "#,
        )
        .bind(route_id.as_str())
        .bind(stop_name)
        .bind(academic_year.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| FeesError::database("get_fee_schedule", e))?;

        Ok(row.map(|r| FeeSchedule {
            route_id: route_id.clone(),
            stop_name: stop_name.to_string(),
            academic_year,
            term1_fee: r.get("term1_fee"),
            term2_fee: r.get("term2_fee"),
            term3_fee: r.get("term3_fee"),
            full_year_fee: r.get("full_year_fee"),
        }))
    }

    async fn upsert_fee_schedule(&self, schedule: &FeeSchedule) -> Result<()> {
        schedule.validate()?;

        sqlx::query(
            r#"
            INSERT INTO fee_schedules
                (route_id, stop_name, academic_year, term1_fee, term2_fee, term3_fee, full_year_fee)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (route_id, stop_name, academic_year) DO UPDATE SET
                term1_fee = EXCLUDED.term1_fee,
                term2_fee = EXCLUDED.term2_fee,
                term3_fee = EXCLUDED.term3_fee,
                full_year_fee = EXCLUDED.full_year_fee,
                updated_at = NOW()
            "#,
        )
        .bind(schedule.route_id.as_str())
        .bind(&schedule.stop_name)
        .bind(schedule.academic_year.to_string())
        .bind(schedule.term1_fee)
        .bind(schedule.term2_fee)
        .bind(schedule.term3_fee)
        .bind(schedule.full_year_fee)
        .execute(&self.pool)
        .await
        .map_err(|e| FeesError::database("upsert_fee_schedule", e))?;

        Ok(())
    }
}
