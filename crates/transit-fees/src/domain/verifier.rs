//! Payment Verifier: reconciles a gateway callback against a stored order.
//!
//! The gateway delivers callbacks at least once, so `gatewayPaymentId` is the
//! idempotency key. A payment that is already confirmed with the same gateway
//! payment id is answered from storage without calling the gateway again.
//! Every state change is a conditional write against `pending`, so duplicate or
//! concurrent deliveries can neither double-confirm nor fail a payment twice.

use crate::audit::{AuditEvent, AuditSink};
use crate::config::FeesConfig;
use crate::domain::calendar::TermCalendar;
use crate::domain::payments::{
    receipt_number, ConfirmOutcome, Payment, PaymentConfirmation, PaymentStatus, ReceiptData,
};
use crate::domain::types::PaymentId;
use crate::error::{FeesError, Result};
use crate::gateway::{GatewaySigner, PaymentGateway, Settlement, SettlementStatus};
use crate::storage::{PaymentRepository, Repositories, RouteRepository, StudentRepository};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationRequest {
    #[serde(default)]
    pub gateway_order_id: String,
    #[serde(default)]
    pub gateway_payment_id: String,
    #[serde(default)]
    pub signature: String,
    #[serde(default)]
    pub internal_payment_id: Option<PaymentId>,
    #[serde(default)]
    pub demo_flag: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentSummary {
    pub id: PaymentId,
    pub status: PaymentStatus,
    pub amount_paid: i64,
    pub receipt_number: Option<String>,
    pub payment_date: Option<DateTime<Utc>>,
}

impl From<&Payment> for PaymentSummary {
    fn from(payment: &Payment) -> Self {
        Self {
            id: payment.id,
            status: payment.status,
            amount_paid: payment.amount_paid,
            receipt_number: payment.receipt_number.clone(),
            payment_date: payment.paid_at,
        }
    }
}

/// Identical for the first confirmation and every replay of it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationResult {
    pub success: bool,
    pub payment: PaymentSummary,
    pub receipt_data: ReceiptData,
}

#[derive(Debug, Clone)]
pub struct VerifierPolicy {
    pub receipt_prefix: String,
    pub allow_demo_payments: bool,
}

impl VerifierPolicy {
    pub fn from_config(config: &FeesConfig) -> Self {
        Self {
            receipt_prefix: config.policy.receipt_prefix.clone(),
            allow_demo_payments: config.gateway.allow_demo_payments,
        }
    }
}

pub struct PaymentVerifier {
    payments: Arc<dyn PaymentRepository>,
    students: Arc<dyn StudentRepository>,
    routes: Arc<dyn RouteRepository>,
    gateway: Arc<dyn PaymentGateway>,
    signer: GatewaySigner,
    calendar: TermCalendar,
    policy: VerifierPolicy,
    audit: Arc<dyn AuditSink>,
}

impl PaymentVerifier {
    pub fn new(
        repos: &Repositories,
        gateway: Arc<dyn PaymentGateway>,
        signer: GatewaySigner,
        calendar: TermCalendar,
        policy: VerifierPolicy,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            payments: repos.payments.clone(),
            students: repos.students.clone(),
            routes: repos.routes.clone(),
            gateway,
            signer,
            calendar,
            policy,
            audit,
        }
    }

    pub async fn verify(&self, request: &VerificationRequest) -> Result<VerificationResult> {
        let order_id = request.gateway_order_id.trim();
        let gateway_payment_id = request.gateway_payment_id.trim();
        if order_id.is_empty() || gateway_payment_id.is_empty() {
            return Err(FeesError::validation(
                "gatewayOrderId and gatewayPaymentId are required",
            ));
        }
        if request.demo_flag && !self.policy.allow_demo_payments {
            return Err(FeesError::validation("demo payments are disabled"));
        }

        let located = self.locate(order_id, request.internal_payment_id).await?;

        if !request.demo_flag
            && !self
                .signer
                .verify(order_id, gateway_payment_id, &request.signature)
        {
            warn!(order_id, gateway_payment_id, "rejecting callback with invalid signature");
            if let Some(payment) = &located {
                self.fail(payment, "invalid signature").await?;
            }
            return Err(FeesError::SignatureMismatch {
                payment_id: located.map(|p| p.id.to_string()),
            });
        }

        let payment = located.ok_or_else(|| match request.internal_payment_id {
            Some(id) => FeesError::not_found("payment", id),
            None => FeesError::not_found("payment for order", order_id),
        })?;

        match payment.status {
            PaymentStatus::Pending => {}
            PaymentStatus::Confirmed if payment.is_confirmed_with(gateway_payment_id) => {
                return self.replay(payment).await;
            }
            status => {
                return Err(FeesError::PaymentFinalized {
                    id: payment.id.to_string(),
                    status: status.to_string(),
                });
            }
        }

        let settlement = if request.demo_flag {
            info!(payment_id = %payment.id, "accepting demo payment without gateway settlement");
            Settlement {
                payment_id: gateway_payment_id.to_string(),
                order_id: Some(order_id.to_string()),
                status: SettlementStatus::Captured,
                amount_minor: payment.amount_minor()?,
                method: Some("demo".to_string()),
                captured_at: Utc::now(),
            }
        } else {
            self.gateway.fetch_settlement(gateway_payment_id).await?
        };

        if let Some(settled_order) = settlement.order_id.as_deref() {
            if settled_order != order_id {
                return Err(FeesError::validation(format!(
                    "gateway payment {} belongs to order {}, not {}",
                    gateway_payment_id, settled_order, order_id
                )));
            }
        }

        if !settlement.status.is_settled() {
            self.fail(
                &payment,
                &format!("payment not captured (gateway status: {})", settlement.status),
            )
            .await?;
            return Err(FeesError::PaymentNotSettled {
                status: settlement.status.to_string(),
            });
        }

        let expected_minor = payment.amount_minor()?;
        if settlement.amount_minor != expected_minor {
            warn!(
                payment_id = %payment.id, expected_minor, actual_minor = settlement.amount_minor,
                "gateway amount does not match the order"
            );
            self.fail(&payment, "amount mismatch").await?;
            return Err(FeesError::AmountMismatch {
                expected_minor,
                actual_minor: settlement.amount_minor,
            });
        }

        let confirmation = self.confirmation_for(&payment, &settlement, request);
        let outcome = match self
            .payments
            .confirm_payment(&payment.id, &confirmation)
            .await
        {
            Ok(outcome) => outcome,
            Err(e @ FeesError::AlreadyPaid { .. }) => {
                // Another order for the same coverage confirmed first
                warn!(
                    payment_id = %payment.id, gateway_payment_id,
                    "captured payment duplicates confirmed coverage"
                );
                self.fail(&payment, "duplicate coverage").await?;
                return Err(e);
            }
            Err(e) => return Err(e),
        };

        match outcome {
            ConfirmOutcome::Confirmed(confirmed) => {
                info!(
                    payment_id = %confirmed.id,
                    student_id = %confirmed.student_id,
                    receipt_number = %confirmation.receipt_number,
                    "payment confirmed"
                );
                self.audit
                    .record(AuditEvent::PaymentConfirmed {
                        payment_id: confirmed.id,
                        student_id: confirmed.student_id.clone(),
                        gateway_payment_id: confirmation.gateway_payment_id.clone(),
                        receipt_number: confirmation.receipt_number.clone(),
                        valid_from: confirmation.valid_from,
                        valid_until: confirmation.valid_until,
                        demo: request.demo_flag,
                    })
                    .await;
                self.result_for(&confirmed).await
            }
            ConfirmOutcome::AlreadyConfirmed(current)
                if current.is_confirmed_with(gateway_payment_id) =>
            {
                self.replay(current).await
            }
            ConfirmOutcome::AlreadyConfirmed(current) | ConfirmOutcome::NotPending(current) => {
                Err(FeesError::PaymentFinalized {
                    id: current.id.to_string(),
                    status: current.status.to_string(),
                })
            }
        }
    }

    async fn locate(
        &self,
        order_id: &str,
        internal_payment_id: Option<PaymentId>,
    ) -> Result<Option<Payment>> {
        let Some(id) = internal_payment_id else {
            return self.payments.find_by_gateway_order(order_id).await;
        };

        let payment = self.payments.get_payment(&id).await?;
        if let Some(payment) = &payment {
            if payment.gateway_order_id != order_id {
                return Err(FeesError::validation(format!(
                    "payment {} does not belong to order {}",
                    id, order_id
                )));
            }
        }
        Ok(payment)
    }

    /// Validity runs from the capture date to the end of the paid scope; a
    /// capture after the scope ended is clamped so the window never inverts.
    fn confirmation_for(
        &self,
        payment: &Payment,
        settlement: &Settlement,
        request: &VerificationRequest,
    ) -> PaymentConfirmation {
        let window = self
            .calendar
            .scope_window(payment.academic_year, payment.scope);
        let valid_until = window.end;
        let valid_from = settlement.captured_at.date_naive().min(valid_until);
        let now = Utc::now();

        PaymentConfirmation {
            gateway_payment_id: settlement.payment_id.clone(),
            gateway_signature: (!request.demo_flag).then(|| request.signature.trim().to_string()),
            payment_method: settlement.method.clone(),
            paid_at: settlement.captured_at,
            valid_from,
            valid_until,
            receipt_number: receipt_number(&self.policy.receipt_prefix, payment),
            updated_at: now,
        }
    }

    async fn fail(&self, payment: &Payment, reason: &str) -> Result<()> {
        if self
            .payments
            .mark_failed(&payment.id, reason, Utc::now())
            .await?
        {
            info!(payment_id = %payment.id, reason, "payment marked failed");
            self.audit
                .record(AuditEvent::PaymentFailed {
                    payment_id: payment.id,
                    reason: reason.to_string(),
                })
                .await;
        } else {
            debug!(payment_id = %payment.id, status = %payment.status, "payment was not pending; left unchanged");
        }
        Ok(())
    }

    async fn replay(&self, payment: Payment) -> Result<VerificationResult> {
        debug!(payment_id = %payment.id, "replaying stored verification result");
        self.audit
            .record(AuditEvent::VerificationReplayed {
                payment_id: payment.id,
                gateway_payment_id: payment.gateway_payment_id.clone().unwrap_or_default(),
            })
            .await;
        self.result_for(&payment).await
    }

    async fn result_for(&self, payment: &Payment) -> Result<VerificationResult> {
        Ok(VerificationResult {
            success: true,
            payment: PaymentSummary::from(payment),
            receipt_data: self.receipt_for(payment).await?,
        })
    }

    /// Builds receipt data from a confirmed payment. Missing student or route
    /// records leave their fields blank rather than failing a settled payment.
    pub async fn receipt_for(&self, payment: &Payment) -> Result<ReceiptData> {
        let (Some(valid_from), Some(valid_until), Some(receipt_number), Some(paid_at)) = (
            payment.valid_from,
            payment.valid_until,
            payment.receipt_number.clone(),
            payment.paid_at,
        ) else {
            return Err(FeesError::Internal {
                message: format!("payment {} is missing confirmation details", payment.id),
            });
        };

        let student = self.students.get_student(&payment.student_id).await?;
        let route = self.routes.get_route(&payment.route_id).await?;
        if student.is_none() || route.is_none() {
            warn!(payment_id = %payment.id, "receipt built without student or route details");
        }

        Ok(ReceiptData {
            receipt_number,
            student_name: student.as_ref().map(|s| s.name.clone()).unwrap_or_default(),
            route_name: route.map(|r| r.name).unwrap_or_default(),
            stop_name: student
                .and_then(|s| s.boarding_stop)
                .unwrap_or_default(),
            amount: payment.amount_paid,
            academic_year: payment.academic_year,
            term: payment.scope.term(),
            full_year: payment.scope.is_full_year(),
            receipt_color: payment.scope.receipt_color(),
            valid_from,
            valid_until,
            payment_date: paid_at,
        })
    }
}
