use super::{GatewayOrder, OrderRequest, PaymentGateway, Settlement, SettlementStatus};
use crate::config::FeesConfig;
use crate::error::{FeesError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

const CURRENCY: &str = "INR";

#[derive(Debug, Deserialize)]
struct PaymentEntity {
    id: String,
    #[serde(default)]
    order_id: Option<String>,
    status: String,
    amount: i64,
    #[serde(default)]
    method: Option<String>,
    /// Unix seconds
    created_at: i64,
}

#[derive(Debug, Serialize)]
struct CreateOrderBody<'a> {
    amount: i64,
    currency: &'a str,
    receipt: &'a str,
}

#[derive(Debug, Deserialize)]
struct OrderEntity {
    id: String,
    amount: i64,
}

/// Gateway client speaking the Razorpay-style REST API
pub struct HttpPaymentGateway {
    client: Client,
    base_url: String,
    key_id: String,
    key_secret: String,
}

impl HttpPaymentGateway {
    pub fn new(
        base_url: impl Into<String>,
        key_id: impl Into<String>,
        key_secret: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FeesError::Internal {
                message: format!("failed to build gateway client: {}", e),
            })?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            key_id: key_id.into(),
            key_secret: key_secret.into(),
        })
    }

    pub fn from_config(config: &FeesConfig) -> Result<Self> {
        Self::new(
            config.gateway.base_url.clone(),
            config.gateway.key_id.clone(),
            config.gateway.key_secret.clone(),
            config.gateway_timeout(),
        )
    }

    fn transport_error(operation: &str, error: reqwest::Error) -> FeesError {
        warn!(operation, "gateway request failed: {}", error);
        FeesError::GatewayUnavailable {
            message: format!("{}: {}", operation, error),
        }
    }

    async fn status_error(resource: &str, id: &str, response: reqwest::Response) -> FeesError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        warn!(resource, id, %status, "gateway returned an error: {}", body);

        match status {
            StatusCode::NOT_FOUND => FeesError::not_found(resource, id),
            StatusCode::TOO_MANY_REQUESTS => FeesError::GatewayUnavailable {
                message: format!("gateway rate limited ({})", status),
            },
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => FeesError::Internal {
                message: format!("gateway rejected our credentials ({})", status),
            },
            s if s.is_server_error() => FeesError::GatewayUnavailable {
                message: format!("gateway error ({})", status),
            },
            _ => FeesError::validation(format!("gateway rejected request ({}): {}", status, body)),
        }
    }
}

#[async_trait]
impl PaymentGateway for HttpPaymentGateway {
    async fn fetch_settlement(&self, gateway_payment_id: &str) -> Result<Settlement> {
        let url = format!("{}/payments/{}", self.base_url, gateway_payment_id);
        debug!(gateway_payment_id, "fetching payment from gateway");

        let response = self
            .client
            .get(&url)
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .send()
            .await
            .map_err(|e| Self::transport_error("fetch_settlement", e))?;

        if !response.status().is_success() {
            return Err(Self::status_error("gateway payment", gateway_payment_id, response).await);
        }

        let entity: PaymentEntity = response
            .json()
            .await
            .map_err(|e| Self::transport_error("fetch_settlement", e))?;

        let captured_at = DateTime::<Utc>::from_timestamp(entity.created_at, 0).ok_or_else(|| {
            FeesError::GatewayUnavailable {
                message: format!("gateway returned invalid timestamp {}", entity.created_at),
            }
        })?;

        Ok(Settlement {
            payment_id: entity.id,
            order_id: entity.order_id,
            status: SettlementStatus::parse(&entity.status),
            amount_minor: entity.amount,
            method: entity.method,
            captured_at,
        })
    }

    async fn create_order(&self, request: &OrderRequest) -> Result<GatewayOrder> {
        let url = format!("{}/orders", self.base_url);
        let body = CreateOrderBody {
            amount: request.amount_minor,
            currency: CURRENCY,
            receipt: &request.receipt,
        };

        let response = self
            .client
            .post(&url)
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .json(&body)
            .send()
            .await
            .map_err(|e| Self::transport_error("create_order", e))?;

        if !response.status().is_success() {
            return Err(Self::status_error("gateway order", &request.receipt, response).await);
        }

        let order: OrderEntity = response
            .json()
            .await
            .map_err(|e| Self::transport_error("create_order", e))?;

        debug!(order_id = %order.id, amount = order.amount, "gateway order created");
        Ok(GatewayOrder {
            order_id: order.id,
            amount_minor: order.amount,
        })
    }
}
