use super::{PaymentRepository, PgRepos};
use crate::domain::payments::{
    ConfirmOutcome, Payment, PaymentConfirmation, PaymentScope, PaymentStatus,
};
use crate::domain::types::{AcademicYear, PaymentId, RouteId, StudentId, Term};
use crate::error::{FeesError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::Row;
use uuid::Uuid;

const PAYMENT_COLUMNS: &str = r#"
    id, student_id, route_id, academic_year, scope_kind, term, amount_paid, status,
    gateway_order_id, gateway_payment_id, gateway_signature, payment_method, paid_at,
    valid_from, valid_until, receipt_number, failure_reason, created_at, updated_at
"#;

const UNIQUE_VIOLATION: &str = "23505";
/// Partial unique index allowing one confirmed payment per student, year and scope
const CONFIRMED_SCOPE_INDEX: &str = "payments_one_confirmed_per_scope";

fn scope_columns(scope: PaymentScope) -> (&'static str, Option<i16>) {
    match scope {
        PaymentScope::Term { term } => ("term", Some(i16::from(term.number()))),
        PaymentScope::FullYear => ("full_year", None),
    }
}

fn scope_from_columns(kind: &str, term: Option<i16>) -> Result<PaymentScope> {
    match (kind, term) {
        ("full_year", None) => Ok(PaymentScope::FullYear),
        ("term", Some(number)) => {
            let number = u8::try_from(number).map_err(|_| FeesError::Internal {
                message: format!("stored term {} is out of range", number),
            })?;
            Ok(PaymentScope::Term {
                term: Term::from_number(number)?,
            })
        }
        (kind, term) => Err(FeesError::Internal {
            message: format!("inconsistent stored scope {} / {:?}", kind, term),
        }),
    }
}

fn payment_from_row(row: &PgRow) -> Result<Payment> {
    let id: Uuid = row.get("id");
    let academic_year: String = row.get("academic_year");
    let scope_kind: String = row.get("scope_kind");
    let status: String = row.get("status");

    Ok(Payment {
        id: PaymentId::from_uuid(id),
        student_id: StudentId::new(row.get::<String, _>("student_id")),
        route_id: RouteId::new(row.get::<String, _>("route_id")),
        academic_year: academic_year.parse()?,
        scope: scope_from_columns(&scope_kind, row.get("term"))?,
        amount_paid: row.get("amount_paid"),
        status: status.parse()?,
        gateway_order_id: row.get("gateway_order_id"),
        gateway_payment_id: row.get("gateway_payment_id"),
        gateway_signature: row.get("gateway_signature"),
        payment_method: row.get("payment_method"),
        paid_at: row.get("paid_at"),
        valid_from: row.get("valid_from"),
        valid_until: row.get("valid_until"),
        receipt_number: row.get("receipt_number"),
        failure_reason: row.get("failure_reason"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

/// Only a clash on the confirmed-scope index means the coverage is already
/// held; any other unique violation (receipt number, for one) is a fault.
fn is_confirmed_scope_violation(error: &sqlx::Error) -> bool {
    error
        .as_database_error()
        .map(|db| {
            db.code().as_deref() == Some(UNIQUE_VIOLATION)
                && db.constraint() == Some(CONFIRMED_SCOPE_INDEX)
        })
        .unwrap_or(false)
}

impl PgRepos {
    async fn find_confirmed_scope(
        &self,
        student_id: &StudentId,
        academic_year: AcademicYear,
        scope: PaymentScope,
        operation: &str,
    ) -> Result<Option<Payment>> {
        let (kind, term) = scope_columns(scope);
        let row = sqlx::query(&format!(
            r#"
            SELECT {}
            FROM payments
            WHERE student_id = $1
              AND academic_year = $2
              AND scope_kind = $3
              AND term IS NOT DISTINCT FROM $4
              AND status = 'confirmed'
            LIMIT 1
            "#,
            PAYMENT_COLUMNS
        ))
        .bind(student_id.as_str())
        .bind(academic_year.to_string())
        .bind(kind)
        .bind(term)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| FeesError::database(operation, e))?;

        row.as_ref().map(payment_from_row).transpose()
    }
}

#[async_trait]
impl PaymentRepository for PgRepos {
    async fn create_payment(&self, payment: &Payment) -> Result<()> {
        let (kind, term) = scope_columns(payment.scope);

        sqlx::query(
            r#"
            INSERT INTO payments
                (id, student_id, route_id, academic_year, scope_kind, term, amount_paid,
                 status, gateway_order_id, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(payment.id.as_uuid())
        .bind(payment.student_id.as_str())
        .bind(payment.route_id.as_str())
        .bind(payment.academic_year.to_string())
        .bind(kind)
        .bind(term)
        .bind(payment.amount_paid)
        .bind(payment.status.as_str())
        .bind(&payment.gateway_order_id)
        .bind(payment.created_at)
        .bind(payment.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| FeesError::database("create_payment", e))?;

        Ok(())
    }

    async fn get_payment(&self, id: &PaymentId) -> Result<Option<Payment>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM payments WHERE id = $1",
            PAYMENT_COLUMNS
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| FeesError::database("get_payment", e))?;

        row.as_ref().map(payment_from_row).transpose()
    }

    async fn find_by_gateway_order(&self, gateway_order_id: &str) -> Result<Option<Payment>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM payments WHERE gateway_order_id = $1",
            PAYMENT_COLUMNS
        ))
        .bind(gateway_order_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| FeesError::database("find_by_gateway_order", e))?;

        row.as_ref().map(payment_from_row).transpose()
    }

    async fn find_confirmed_full_year(
        &self,
        student_id: &StudentId,
        academic_year: AcademicYear,
    ) -> Result<Option<Payment>> {
        self.find_confirmed_scope(
            student_id,
            academic_year,
            PaymentScope::FullYear,
            "find_confirmed_full_year",
        )
        .await
    }

    async fn find_confirmed_term(
        &self,
        student_id: &StudentId,
        academic_year: AcademicYear,
        term: Term,
    ) -> Result<Option<Payment>> {
        self.find_confirmed_scope(
            student_id,
            academic_year,
            PaymentScope::Term { term },
            "find_confirmed_term",
        )
        .await
    }

    async fn list_for_student(&self, student_id: &StudentId) -> Result<Vec<Payment>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM payments WHERE student_id = $1 ORDER BY created_at DESC",
            PAYMENT_COLUMNS
        ))
        .bind(student_id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| FeesError::database("list_for_student", e))?;

        rows.iter().map(payment_from_row).collect()
    }

    async fn mark_failed(&self, id: &PaymentId, reason: &str, at: DateTime<Utc>) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE payments
            SET status = 'failed', failure_reason = $2, updated_at = $3
            WHERE id = $1 AND status = 'pending'
            "#,
        )
        .bind(id.as_uuid())
        .bind(reason)
        .bind(at)
        .execute(&self.pool)
        .await
        .map_err(|e| FeesError::database("mark_failed", e))?;

        Ok(result.rows_affected() == 1)
    }

    async fn confirm_payment(
        &self,
        id: &PaymentId,
        confirmation: &PaymentConfirmation,
    ) -> Result<ConfirmOutcome> {
        let updated = sqlx::query(&format!(
            r#"
            UPDATE payments
            SET status = 'confirmed',
                gateway_payment_id = $2,
                gateway_signature = $3,
                payment_method = $4,
                paid_at = $5,
                valid_from = $6,
                valid_until = $7,
                receipt_number = $8,
                failure_reason = NULL,
                updated_at = $9
            WHERE id = $1 AND status = 'pending'
            RETURNING {}
            "#,
            PAYMENT_COLUMNS
        ))
        .bind(id.as_uuid())
        .bind(&confirmation.gateway_payment_id)
        .bind(&confirmation.gateway_signature)
        .bind(&confirmation.payment_method)
        .bind(confirmation.paid_at)
        .bind(confirmation.valid_from)
        .bind(confirmation.valid_until)
        .bind(&confirmation.receipt_number)
        .bind(confirmation.updated_at)
        .fetch_optional(&self.pool)
        .await;

        let row = match updated {
            Ok(row) => row,
            Err(e) if is_confirmed_scope_violation(&e) => {
                let current = self
                    .get_payment(id)
                    .await?
                    .ok_or_else(|| FeesError::not_found("payment", id))?;
                return Err(FeesError::AlreadyPaid {
                    student_id: current.student_id.to_string(),
                    coverage: format!("{} {}", current.scope, current.academic_year),
                });
            }
            Err(e) => return Err(FeesError::database("confirm_payment", e)),
        };

        if let Some(row) = row {
            return Ok(ConfirmOutcome::Confirmed(payment_from_row(&row)?));
        }

        // Lost the race or the payment was never pending; classify what is stored
        let current = self
            .get_payment(id)
            .await?
            .ok_or_else(|| FeesError::not_found("payment", id))?;
        match current.status {
            PaymentStatus::Confirmed => Ok(ConfirmOutcome::AlreadyConfirmed(current)),
            _ => Ok(ConfirmOutcome::NotPending(current)),
        }
    }
}
