use crate::domain::types::{AcademicYear, PaymentId, ReceiptColor, RouteId, StudentId, Term};
use crate::error::{FeesError, Result};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Confirmed,
    Failed,
    Refunded,
}

impl PaymentStatus {
    pub fn can_transition_to(&self, next: PaymentStatus) -> bool {
        matches!(
            (self, next),
            (PaymentStatus::Pending, PaymentStatus::Confirmed)
                | (PaymentStatus::Pending, PaymentStatus::Failed)
                | (PaymentStatus::Confirmed, PaymentStatus::Refunded)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Confirmed => "confirmed",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Refunded => "refunded",
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = FeesError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(PaymentStatus::Pending),
            "confirmed" => Ok(PaymentStatus::Confirmed),
            "failed" => Ok(PaymentStatus::Failed),
            "refunded" => Ok(PaymentStatus::Refunded),
            other => Err(FeesError::validation(format!(
                "unknown payment status '{}'",
                other
            ))),
        }
    }
}

/// What a payment pays for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PaymentScope {
    Term { term: Term },
    FullYear,
}

impl PaymentScope {
    pub fn term(&self) -> Option<Term> {
        match self {
            PaymentScope::Term { term } => Some(*term),
            PaymentScope::FullYear => None,
        }
    }

    pub fn is_full_year(&self) -> bool {
        matches!(self, PaymentScope::FullYear)
    }

    pub fn receipt_color(&self) -> ReceiptColor {
        match self {
            PaymentScope::Term { term } => term.receipt_color(),
            PaymentScope::FullYear => ReceiptColor::Green,
        }
    }

    /// Short code used in receipt numbers
    pub fn code(&self) -> &'static str {
        match self {
            PaymentScope::Term { term: Term::First } => "T1",
            PaymentScope::Term { term: Term::Second } => "T2",
            PaymentScope::Term { term: Term::Third } => "T3",
            PaymentScope::FullYear => "FY",
        }
    }
}

impl fmt::Display for PaymentScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PaymentScope::Term { term } => write!(f, "{}", term),
            PaymentScope::FullYear => write!(f, "full year"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Payment {
    pub id: PaymentId,
    pub student_id: StudentId,
    pub route_id: RouteId,
    pub academic_year: AcademicYear,
    pub scope: PaymentScope,
    /// Major currency units
    pub amount_paid: i64,
    pub status: PaymentStatus,
    pub gateway_order_id: String,
    pub gateway_payment_id: Option<String>,
    pub gateway_signature: Option<String>,
    pub payment_method: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub valid_from: Option<NaiveDate>,
    pub valid_until: Option<NaiveDate>,
    pub receipt_number: Option<String>,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    pub fn new_pending(
        student_id: StudentId,
        route_id: RouteId,
        academic_year: AcademicYear,
        scope: PaymentScope,
        amount_paid: i64,
        gateway_order_id: String,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: PaymentId::new(),
            student_id,
            route_id,
            academic_year,
            scope,
            amount_paid,
            status: PaymentStatus::Pending,
            gateway_order_id,
            gateway_payment_id: None,
            gateway_signature: None,
            payment_method: None,
            paid_at: None,
            valid_from: None,
            valid_until: None,
            receipt_number: None,
            failure_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Amount the gateway must report, in minor units (paise)
    pub fn amount_minor(&self) -> Result<i64> {
        self.amount_paid
            .checked_mul(100)
            .ok_or_else(|| FeesError::Internal {
                message: format!("amount overflow for payment {}", self.id),
            })
    }

    pub fn is_confirmed(&self) -> bool {
        self.status == PaymentStatus::Confirmed
    }

    pub fn is_confirmed_with(&self, gateway_payment_id: &str) -> bool {
        self.is_confirmed() && self.gateway_payment_id.as_deref() == Some(gateway_payment_id)
    }

    /// Confirmed and `date` lies within the stored validity window
    pub fn covers_date(&self, date: NaiveDate) -> bool {
        match (self.status, self.valid_from, self.valid_until) {
            (PaymentStatus::Confirmed, Some(from), Some(until)) => from <= date && date <= until,
            _ => false,
        }
    }

    /// Applies a confirmation in memory, enforcing the state machine
    pub fn apply_confirmation(&mut self, confirmation: &PaymentConfirmation) -> Result<()> {
        if !self.status.can_transition_to(PaymentStatus::Confirmed) {
            return Err(FeesError::PaymentFinalized {
                id: self.id.to_string(),
                status: self.status.to_string(),
            });
        }
        if confirmation.valid_from > confirmation.valid_until {
            return Err(FeesError::Internal {
                message: format!("inverted validity window for payment {}", self.id),
            });
        }
        self.status = PaymentStatus::Confirmed;
        self.gateway_payment_id = Some(confirmation.gateway_payment_id.clone());
        self.gateway_signature = confirmation.gateway_signature.clone();
        self.payment_method = confirmation.payment_method.clone();
        self.paid_at = Some(confirmation.paid_at);
        self.valid_from = Some(confirmation.valid_from);
        self.valid_until = Some(confirmation.valid_until);
        self.receipt_number = Some(confirmation.receipt_number.clone());
        self.failure_reason = None;
        self.updated_at = confirmation.updated_at;
        Ok(())
    }
}

/// Everything written in the single confirming update
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentConfirmation {
    pub gateway_payment_id: String,
    pub gateway_signature: Option<String>,
    pub payment_method: Option<String>,
    pub paid_at: DateTime<Utc>,
    pub valid_from: NaiveDate,
    pub valid_until: NaiveDate,
    pub receipt_number: String,
    pub updated_at: DateTime<Utc>,
}

/// Result of the conditional confirm write
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmOutcome {
    Confirmed(Payment),
    /// Someone else confirmed first; compare gateway ids before trusting it
    AlreadyConfirmed(Payment),
    NotPending(Payment),
}

/// `{prefix}-{start year}-{scope code}-{payment uuid as 32 hex chars}`.
/// Stable per payment and unique because the payment id is.
pub fn receipt_number(prefix: &str, payment: &Payment) -> String {
    format!(
        "{}-{}-{}-{}",
        prefix,
        payment.academic_year.start_year(),
        payment.scope.code(),
        payment.id.as_uuid().simple().to_string().to_uppercase()
    )
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiptData {
    pub receipt_number: String,
    pub student_name: String,
    pub route_name: String,
    pub stop_name: String,
    pub amount: i64,
    pub academic_year: AcademicYear,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub term: Option<Term>,
    pub full_year: bool,
    pub receipt_color: ReceiptColor,
    pub valid_from: NaiveDate,
    pub valid_until: NaiveDate,
    pub payment_date: DateTime<Utc>,
}
