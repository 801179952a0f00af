use crate::domain::fees::FeeSchedule;
use crate::error::Result;
use crate::server::AppState;
use axum::{extract::State, response::Json};

pub async fn publish_fee_schedule(
    State(state): State<AppState>,
    Json(schedule): Json<FeeSchedule>,
) -> Result<Json<FeeSchedule>> {
    state.engine.quotes.publish(&schedule).await?;
    Ok(Json(schedule))
}
