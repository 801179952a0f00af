use crate::domain::orders::{PlaceOrder, PlacedOrder};
use crate::domain::payments::Payment;
use crate::domain::types::StudentId;
use crate::domain::verifier::{VerificationRequest, VerificationResult};
use crate::error::Result;
use crate::server::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use serde::Serialize;
use tracing::{debug, info};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentHistoryResponse {
    pub student_id: StudentId,
    pub payments: Vec<Payment>,
    pub total_count: usize,
}

pub async fn verify_payment(
    State(state): State<AppState>,
    Json(request): Json<VerificationRequest>,
) -> Result<Json<VerificationResult>> {
    info!(
        gateway_order_id = %request.gateway_order_id,
        gateway_payment_id = %request.gateway_payment_id,
        demo = request.demo_flag,
        "verifying payment callback"
    );
    let result = state.engine.verifier.verify(&request).await?;
    Ok(Json(result))
}

pub async fn place_order(
    State(state): State<AppState>,
    Json(order): Json<PlaceOrder>,
) -> Result<(StatusCode, Json<PlacedOrder>)> {
    debug!(student_id = %order.student_id, scope = %order.scope, "placing order");
    let placed = state.engine.orders.place_order(&order).await?;
    Ok((StatusCode::CREATED, Json(placed)))
}

pub async fn payment_history(
    State(state): State<AppState>,
    Path(student_id): Path<String>,
) -> Result<Json<PaymentHistoryResponse>> {
    let student_id = StudentId::new(student_id);
    let payments = state.engine.payment_history(&student_id).await?;
    Ok(Json(PaymentHistoryResponse {
        student_id,
        total_count: payments.len(),
        payments,
    }))
}
