//! Payment gateway seam.
//!
//! The engine only ever asks the gateway two things: what happened to a
//! payment, and to open an order for an amount. Amounts on this side of the
//! seam are always minor units (paise).

pub mod http;
pub mod signature;

pub use http::HttpPaymentGateway;
pub use signature::GatewaySigner;

use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettlementStatus {
    Created,
    Authorized,
    Captured,
    Refunded,
    Failed,
    Other(String),
}

impl SettlementStatus {
    pub fn parse(status: &str) -> Self {
        match status {
            "created" => SettlementStatus::Created,
            "authorized" => SettlementStatus::Authorized,
            "captured" => SettlementStatus::Captured,
            "refunded" => SettlementStatus::Refunded,
            "failed" => SettlementStatus::Failed,
            other => SettlementStatus::Other(other.to_string()),
        }
    }

    /// Only captured funds count as paid
    pub fn is_settled(&self) -> bool {
        matches!(self, SettlementStatus::Captured)
    }
}

impl fmt::Display for SettlementStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SettlementStatus::Created => f.write_str("created"),
            SettlementStatus::Authorized => f.write_str("authorized"),
            SettlementStatus::Captured => f.write_str("captured"),
            SettlementStatus::Refunded => f.write_str("refunded"),
            SettlementStatus::Failed => f.write_str("failed"),
            SettlementStatus::Other(other) => f.write_str(other),
        }
    }
}

/// The gateway's view of a single payment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settlement {
    pub payment_id: String,
    pub order_id: Option<String>,
    pub status: SettlementStatus,
    pub amount_minor: i64,
    pub method: Option<String>,
    pub captured_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderRequest {
    pub amount_minor: i64,
    /// Our internal reference, echoed back by the gateway
    pub receipt: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayOrder {
    pub order_id: String,
    pub amount_minor: i64,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Errors with `GatewayUnavailable` when the gateway cannot answer
    async fn fetch_settlement(&self, gateway_payment_id: &str) -> Result<Settlement>;

    async fn create_order(&self, request: &OrderRequest) -> Result<GatewayOrder>;
}
