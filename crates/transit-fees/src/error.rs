//! Error types for the transit fees engine

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FeesError {
    /// Missing or malformed input; never changes state
    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error("Invalid gateway signature")]
    SignatureMismatch { payment_id: Option<String> },

    #[error("Amount mismatch: expected {expected_minor} minor units, gateway reported {actual_minor}")]
    AmountMismatch {
        expected_minor: i64,
        actual_minor: i64,
    },

    #[error("Payment gateway unavailable: {message}")]
    GatewayUnavailable { message: String },

    #[error("{resource} not found: {id}")]
    NotFound { resource: String, id: String },

    #[error("Policy denied: {reason}")]
    PolicyDenied { reason: String },

    #[error("Payment not settled by gateway (status: {status})")]
    PaymentNotSettled { status: String },

    #[error("No seats available on schedule {schedule_id}")]
    SeatUnavailable { schedule_id: String },

    #[error("Student {student_id} already holds a confirmed payment covering {coverage}")]
    AlreadyPaid {
        student_id: String,
        coverage: String,
    },

    #[error("Payment {id} is already {status}")]
    PaymentFinalized { id: String, status: String },

    #[error("Invalid fee schedule: {message}")]
    InvalidFeeSchedule { message: String },

    #[error("Database error during {operation}: {source}")]
    Database {
        operation: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {message}")]
    Internal { message: String },
}

pub type Result<T> = std::result::Result<T, FeesError>;

impl FeesError {
    pub fn validation(message: impl Into<String>) -> Self {
        FeesError::Validation {
            message: message.into(),
        }
    }

    pub fn not_found(resource: impl Into<String>, id: impl ToString) -> Self {
        FeesError::NotFound {
            resource: resource.into(),
            id: id.to_string(),
        }
    }

    pub fn database(
        operation: &str,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        FeesError::Database {
            operation: operation.to_string(),
            source: Box::new(source),
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            FeesError::Validation { .. } => "VALIDATION_ERROR",
            FeesError::SignatureMismatch { .. } => "SIGNATURE_MISMATCH",
            FeesError::AmountMismatch { .. } => "AMOUNT_MISMATCH",
            FeesError::GatewayUnavailable { .. } => "GATEWAY_UNAVAILABLE",
            FeesError::NotFound { .. } => "NOT_FOUND",
            FeesError::PolicyDenied { .. } => "POLICY_DENIED",
            FeesError::PaymentNotSettled { .. } => "PAYMENT_NOT_SETTLED",
            FeesError::SeatUnavailable { .. } => "SEAT_UNAVAILABLE",
            FeesError::AlreadyPaid { .. } => "ALREADY_PAID",
            FeesError::PaymentFinalized { .. } => "PAYMENT_FINALIZED",
            FeesError::InvalidFeeSchedule { .. } => "INVALID_FEE_SCHEDULE",
            FeesError::Database { .. } => "DATABASE_ERROR",
            FeesError::Serialization(_) => "SERIALIZATION_ERROR",
            FeesError::Internal { .. } => "INTERNAL_ERROR",
        }
    }

    /// Whether the caller may retry the same request unchanged
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            FeesError::GatewayUnavailable { .. } | FeesError::Database { .. }
        )
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            FeesError::Validation { .. }
            | FeesError::SignatureMismatch { .. }
            | FeesError::AmountMismatch { .. }
            | FeesError::PolicyDenied { .. }
            | FeesError::PaymentNotSettled { .. } => StatusCode::BAD_REQUEST,
            FeesError::GatewayUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            FeesError::NotFound { .. } => StatusCode::NOT_FOUND,
            FeesError::SeatUnavailable { .. }
            | FeesError::AlreadyPaid { .. }
            | FeesError::PaymentFinalized { .. } => StatusCode::CONFLICT,
            FeesError::InvalidFeeSchedule { .. }
            | FeesError::Database { .. }
            | FeesError::Serialization(_)
            | FeesError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn details(&self) -> Option<serde_json::Value> {
        match self {
            FeesError::AmountMismatch {
                expected_minor,
                actual_minor,
            } => Some(json!({
                "expectedMinorUnits": expected_minor,
                "gatewayMinorUnits": actual_minor,
            })),
            FeesError::PaymentNotSettled { status } => Some(json!({ "gatewayStatus": status })),
            FeesError::NotFound { resource, id } => Some(json!({ "resource": resource, "id": id })),
            FeesError::SignatureMismatch {
                payment_id: Some(id),
            } => Some(json!({ "paymentId": id })),
            _ => None,
        }
    }
}

impl IntoResponse for FeesError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // Storage and internal failures are logged here; their text stays out of the body
        let message = if status.is_server_error() && !self.is_retryable() {
            tracing::error!(error = %self, code = self.error_code(), "request failed");
            "Internal server error".to_string()
        } else if matches!(self, FeesError::Database { .. }) {
            tracing::error!(error = %self, "storage failure");
            "Storage temporarily unavailable".to_string()
        } else {
            self.to_string()
        };

        let mut body = json!({
            "error": message,
            "code": self.error_code(),
            "retryable": self.is_retryable(),
        });
        if let Some(details) = self.details() {
            body["details"] = details;
        }

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(
            FeesError::validation("missing order id").error_code(),
            "VALIDATION_ERROR"
        );
        assert_eq!(
            FeesError::SeatUnavailable {
                schedule_id: "s1".to_string()
            }
            .error_code(),
            "SEAT_UNAVAILABLE"
        );
    }

    #[test]
    fn test_retryable_errors() {
        assert!(FeesError::GatewayUnavailable {
            message: "timeout".to_string()
        }
        .is_retryable());
        assert!(!FeesError::AmountMismatch {
            expected_minor: 100_000,
            actual_minor: 99_999
        }
        .is_retryable());
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(
            FeesError::not_found("payment", "p1").status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            FeesError::SignatureMismatch { payment_id: None }.status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            FeesError::SeatUnavailable {
                schedule_id: "s1".to_string()
            }
            .status_code(),
            StatusCode::CONFLICT
        );
    }
}
