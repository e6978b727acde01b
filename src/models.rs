use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
    pub role: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Category {
    pub id: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Color {
    pub id: Uuid,
    pub name: String,
    /// Hex string, `#RRGGBB`.
    pub color: String,
}

/// A purchasable stock-keeping unit: category x color x size.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Garment {
    pub id: Uuid,
    pub category: Category,
    pub color: Color,
    pub size: String,
    pub count: i32,
    pub price: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Product {
    pub id: Uuid,
    pub name: String,
    pub price: i64,
    /// Path to the stitch file; set when the product needs an embroidery
    /// pass after payment.
    pub embroidery_file: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct Order {
    pub id: Uuid,
    pub user_id: Uuid,
    pub address: String,
    pub phone: String,
    pub status: String,
    pub payment_status: String,
    pub total_sum: i64,
    pub confirmation_url: Option<String>,
    pub tracking_code: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct OrderItem {
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_id: Uuid,
    pub garment_id: Uuid,
    pub quantity: i32,
    /// Per-unit price snapshot taken at order creation.
    pub price: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    WaitingPayment,
    Paid,
    InWork,
    Draft,
    InDelivery,
    Delivered,
    Canceled,
}

impl OrderStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::WaitingPayment => "waiting_payment",
            OrderStatus::Paid => "paid",
            OrderStatus::InWork => "in_work",
            OrderStatus::Draft => "draft",
            OrderStatus::InDelivery => "in_delivery",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Canceled => "canceled",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "waiting_payment" => Some(OrderStatus::WaitingPayment),
            "paid" => Some(OrderStatus::Paid),
            "in_work" => Some(OrderStatus::InWork),
            "draft" => Some(OrderStatus::Draft),
            "in_delivery" => Some(OrderStatus::InDelivery),
            "delivered" => Some(OrderStatus::Delivered),
            "canceled" => Some(OrderStatus::Canceled),
            _ => None,
        }
    }

    /// Position along the fulfilment pipeline, for forward-only staff moves.
    /// `waiting_payment` and `canceled` sit outside the pipeline: payment
    /// settlement and cancellation own those transitions.
    fn fulfilment_rank(self) -> Option<u8> {
        match self {
            OrderStatus::Paid => Some(1),
            OrderStatus::InWork => Some(2),
            OrderStatus::Draft => Some(3),
            OrderStatus::InDelivery => Some(4),
            OrderStatus::Delivered => Some(5),
            OrderStatus::WaitingPayment | OrderStatus::Canceled => None,
        }
    }

    /// Whether staff may move an order from `self` to `target`.
    pub fn can_advance_to(self, target: OrderStatus) -> bool {
        match (self.fulfilment_rank(), target.fulfilment_rank()) {
            (Some(from), Some(to)) => to > from,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Succeeded,
    Canceled,
}

impl PaymentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Succeeded => "succeeded",
            PaymentStatus::Canceled => "canceled",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(PaymentStatus::Pending),
            "succeeded" => Some(PaymentStatus::Succeeded),
            "canceled" => Some(PaymentStatus::Canceled),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_status_round_trips_through_strings() {
        for status in [
            OrderStatus::WaitingPayment,
            OrderStatus::Paid,
            OrderStatus::InWork,
            OrderStatus::Draft,
            OrderStatus::InDelivery,
            OrderStatus::Delivered,
            OrderStatus::Canceled,
        ] {
            assert_eq!(OrderStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(OrderStatus::parse("shipped"), None);
    }

    #[test]
    fn staff_moves_are_forward_only() {
        assert!(OrderStatus::Paid.can_advance_to(OrderStatus::InWork));
        assert!(OrderStatus::Paid.can_advance_to(OrderStatus::Delivered));
        assert!(OrderStatus::Draft.can_advance_to(OrderStatus::InDelivery));
        assert!(!OrderStatus::InWork.can_advance_to(OrderStatus::Paid));
        assert!(!OrderStatus::Delivered.can_advance_to(OrderStatus::Delivered));
    }

    #[test]
    fn settlement_states_are_off_limits_to_staff() {
        assert!(!OrderStatus::WaitingPayment.can_advance_to(OrderStatus::Paid));
        assert!(!OrderStatus::Paid.can_advance_to(OrderStatus::Canceled));
        assert!(!OrderStatus::Canceled.can_advance_to(OrderStatus::InWork));
        assert!(!OrderStatus::Paid.can_advance_to(OrderStatus::WaitingPayment));
    }
}
