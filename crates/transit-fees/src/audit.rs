//! Audit trail for payment state changes and booking decisions.

use crate::domain::payments::PaymentScope;
use crate::domain::types::{AcademicYear, PaymentId, RouteId, ScheduleId, StudentId};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::sync::Mutex;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditEvent {
    OrderPlaced {
        payment_id: PaymentId,
        student_id: StudentId,
        academic_year: AcademicYear,
        scope: PaymentScope,
        amount: i64,
        gateway_order_id: String,
    },
    PaymentConfirmed {
        payment_id: PaymentId,
        student_id: StudentId,
        gateway_payment_id: String,
        receipt_number: String,
        valid_from: NaiveDate,
        valid_until: NaiveDate,
        demo: bool,
    },
    PaymentFailed {
        payment_id: PaymentId,
        reason: String,
    },
    VerificationReplayed {
        payment_id: PaymentId,
        gateway_payment_id: String,
    },
    EligibilityEvaluated {
        student_id: StudentId,
        route_id: Option<RouteId>,
        date: NaiveDate,
        can_book: bool,
        payment_required: bool,
        reason: String,
    },
    SeatReserved {
        student_id: StudentId,
        schedule_id: ScheduleId,
        remaining_seats: u32,
    },
}

impl AuditEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            AuditEvent::OrderPlaced { .. } => "order_placed",
            AuditEvent::PaymentConfirmed { .. } => "payment_confirmed",
            AuditEvent::PaymentFailed { .. } => "payment_failed",
            AuditEvent::VerificationReplayed { .. } => "verification_replayed",
            AuditEvent::EligibilityEvaluated { .. } => "eligibility_evaluated",
            AuditEvent::SeatReserved { .. } => "seat_reserved",
        }
    }
}

/// Recording never fails the request that produced the event
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, event: AuditEvent);
}

/// Emits each event as a structured log line under the `audit` target
#[derive(Debug, Default, Clone)]
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn record(&self, event: AuditEvent) {
        match serde_json::to_string(&event) {
            Ok(payload) => info!(target: "audit", kind = event.kind(), %payload, "audit event"),
            Err(e) => warn!(target: "audit", kind = event.kind(), "failed to encode audit event: {}", e),
        }
    }
}

/// Keeps events in memory; used by tests and local runs
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    events: Mutex<Vec<(DateTime<Utc>, AuditEvent)>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        self.events
            .lock()
            .map(|events| events.iter().map(|(_, e)| e.clone()).collect())
            .unwrap_or_default()
    }

    pub fn count(&self, kind: &str) -> usize {
        self.events().iter().filter(|e| e.kind() == kind).count()
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn record(&self, event: AuditEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push((Utc::now(), event));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_events_are_tagged() {
        let event = AuditEvent::PaymentFailed {
            payment_id: PaymentId::new(),
            reason: "amount mismatch".to_string(),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "payment_failed");
        assert_eq!(value["reason"], "amount mismatch");

        let sink = MemoryAuditSink::new();
        sink.record(event).await;
        TracingAuditSink.record(sink.events()[0].clone()).await;
        assert_eq!(sink.count("payment_failed"), 1);
    }
}
