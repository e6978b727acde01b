use serde::Deserialize;
use thiserror::Error;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::config::PaymentConfig;

pub const EVENT_PAYMENT_SUCCEEDED: &str = "payment.succeeded";
pub const EVENT_PAYMENT_CANCELED: &str = "payment.canceled";

#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("payment provider request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("payment provider rejected the request: {0}")]
    Provider(String),
}

/// A payment created (or fetched) at the provider. `confirmation_url` is
/// where the customer completes the redirect confirmation flow.
#[derive(Debug, Clone, Deserialize)]
pub struct Payment {
    pub id: String,
    pub status: String,
    #[serde(default)]
    pub confirmation: Option<Confirmation>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Confirmation {
    pub confirmation_url: Option<String>,
}

impl Payment {
    pub fn confirmation_url(&self) -> Option<String> {
        self.confirmation
            .as_ref()
            .and_then(|c| c.confirmation_url.clone())
    }
}

/// Inbound webhook notification. Delivery is at-least-once; the handler
/// must tolerate duplicates.
#[derive(Debug, Deserialize, ToSchema)]
pub struct WebhookNotification {
    #[serde(rename = "type")]
    pub kind: String,
    pub event: String,
    pub object: WebhookObject,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct WebhookObject {
    pub id: String,
}

#[derive(Clone)]
pub struct PaymentClient {
    http: reqwest::Client,
    config: PaymentConfig,
}

impl PaymentClient {
    pub fn new(config: PaymentConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    /// Create a payment for an order. The order id doubles as the
    /// idempotence key, so a retried call cannot create a second payment
    /// for the same order.
    pub async fn create_payment(
        &self,
        order_id: Uuid,
        total_sum: i64,
    ) -> Result<Payment, PaymentError> {
        let body = serde_json::json!({
            "amount": { "value": total_sum.to_string(), "currency": "RUB" },
            "confirmation": {
                "type": "redirect",
                "return_url": format!("{}/{}", self.config.return_url, order_id),
            },
            "capture": true,
            "description": format!("Order #{order_id}"),
            "metadata": { "order_id": order_id },
        });

        let response = self
            .http
            .post(format!("{}/payments", self.config.api_url))
            .basic_auth(&self.config.shop_id, Some(&self.config.secret_key))
            .header("Idempotence-Key", order_id.to_string())
            .json(&body)
            .send()
            .await?;

        Self::parse_payment(response).await
    }

    pub async fn find_payment(&self, payment_id: &str) -> Result<Payment, PaymentError> {
        let response = self
            .http
            .get(format!("{}/payments/{payment_id}", self.config.api_url))
            .basic_auth(&self.config.shop_id, Some(&self.config.secret_key))
            .send()
            .await?;

        Self::parse_payment(response).await
    }

    pub async fn cancel_payment(&self, payment_id: &str) -> Result<Payment, PaymentError> {
        let response = self
            .http
            .post(format!(
                "{}/payments/{payment_id}/cancel",
                self.config.api_url
            ))
            .basic_auth(&self.config.shop_id, Some(&self.config.secret_key))
            .header("Idempotence-Key", Uuid::new_v4().to_string())
            .json(&serde_json::json!({}))
            .send()
            .await?;

        Self::parse_payment(response).await
    }

    async fn parse_payment(response: reqwest::Response) -> Result<Payment, PaymentError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(%status, body = %body, "payment provider error response");
            return Err(PaymentError::Provider(format!(
                "unexpected status {status}"
            )));
        }

        let payment = response.json::<Payment>().await?;
        Ok(payment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_webhook_notification() {
        let raw = serde_json::json!({
            "type": "notification",
            "event": "payment.succeeded",
            "object": { "id": "2d1e7f3a-000f-5000-8000-18db351245c7", "status": "succeeded" }
        });
        let parsed: WebhookNotification = serde_json::from_value(raw).unwrap();
        assert_eq!(parsed.kind, "notification");
        assert_eq!(parsed.event, EVENT_PAYMENT_SUCCEEDED);
        assert_eq!(parsed.object.id, "2d1e7f3a-000f-5000-8000-18db351245c7");
    }

    #[test]
    fn payment_confirmation_url_is_optional() {
        let raw = serde_json::json!({ "id": "p-1", "status": "pending" });
        let payment: Payment = serde_json::from_value(raw).unwrap();
        assert_eq!(payment.confirmation_url(), None);

        let raw = serde_json::json!({
            "id": "p-2",
            "status": "pending",
            "confirmation": { "type": "redirect", "confirmation_url": "https://pay.example/p-2" }
        });
        let payment: Payment = serde_json::from_value(raw).unwrap();
        assert_eq!(
            payment.confirmation_url().as_deref(),
            Some("https://pay.example/p-2")
        );
    }
}
