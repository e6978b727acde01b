use chrono::Utc;
use sea_orm::ActiveValue::Set;
use sea_orm::sea_query::LockType;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QuerySelect, TransactionTrait,
};
use uuid::Uuid;

use crate::{
    audit::log_status_change,
    entity::{
        order_items::{Column as OrderItemCol, Entity as OrderItems},
        orders::{ActiveModel as OrderActive, Column as OrderCol, Entity as Orders},
        products::{Column as ProdCol, Entity as Products},
    },
    error::{AppError, AppResult},
    models::{OrderStatus, PaymentStatus},
    payments::{EVENT_PAYMENT_CANCELED, EVENT_PAYMENT_SUCCEEDED, WebhookNotification},
    response::ApiResponse,
    state::AppState,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentEvent {
    Succeeded,
    Canceled,
}

#[derive(Debug, PartialEq, Eq)]
pub enum EventOutcome {
    Applied(OrderStatus),
    /// The order already left `waiting_payment`; the delivery is a
    /// duplicate or arrived out of order and is acknowledged untouched.
    AlreadySettled,
}

pub async fn handle_webhook(
    state: &AppState,
    notification: WebhookNotification,
) -> AppResult<ApiResponse<serde_json::Value>> {
    if notification.kind != "notification" {
        return Err(AppError::BadRequest("Unexpected notification type".into()));
    }

    let event = match notification.event.as_str() {
        EVENT_PAYMENT_SUCCEEDED => PaymentEvent::Succeeded,
        EVENT_PAYMENT_CANCELED => PaymentEvent::Canceled,
        _ => return Err(AppError::BadRequest("Unknown event type".into())),
    };

    let outcome = apply_payment_event(state, &notification.object.id, event).await?;
    match outcome {
        EventOutcome::Applied(status) => {
            tracing::info!(
                payment_id = %notification.object.id,
                status = status.as_str(),
                "payment event applied"
            );
        }
        EventOutcome::AlreadySettled => {
            tracing::info!(
                payment_id = %notification.object.id,
                event = %notification.event,
                "payment event ignored, order already settled"
            );
        }
    }

    Ok(ApiResponse::message_only("Webhook processed"))
}

/// Reconcile one provider event against the order, first-writer-wins.
///
/// The transition runs under a `FOR UPDATE` lock on the order row and only
/// fires while the order is still `waiting_payment`. Once it has settled,
/// every later delivery for the same payment (a straight duplicate or the
/// opposite event arriving late) is a no-op, so redelivery is idempotent
/// and out-of-order delivery is harmless.
pub async fn apply_payment_event(
    state: &AppState,
    payment_id: &str,
    event: PaymentEvent,
) -> AppResult<EventOutcome> {
    let txn = state.orm.begin().await?;

    let order = Orders::find()
        .filter(OrderCol::PaymentId.eq(payment_id))
        .lock(LockType::Update)
        .one(&txn)
        .await?
        .ok_or(AppError::NotFound)?;

    if order.status != OrderStatus::WaitingPayment.as_str() {
        return Ok(EventOutcome::AlreadySettled);
    }

    let (status, payment_status) = match event {
        PaymentEvent::Succeeded => {
            let status = if order_needs_embroidery(&txn, order.id).await? {
                OrderStatus::InWork
            } else {
                OrderStatus::Paid
            };
            (status, PaymentStatus::Succeeded)
        }
        PaymentEvent::Canceled => (OrderStatus::Canceled, PaymentStatus::Canceled),
    };

    let order_id = order.id;
    let previous_status = order.status.clone();
    let mut active: OrderActive = order.into();
    active.status = Set(status.as_str().into());
    active.payment_status = Set(payment_status.as_str().into());
    active.updated_at = Set(Utc::now().into());
    active.update(&txn).await?;

    txn.commit().await?;

    log_status_change(
        &state.pool,
        None,
        order_id,
        &previous_status,
        status.as_str(),
    )
    .await;

    Ok(EventOutcome::Applied(status))
}

/// Paid orders whose products carry a stitch file go to the embroidery
/// bench first instead of straight to `paid`.
async fn order_needs_embroidery<C: sea_orm::ConnectionTrait>(
    conn: &C,
    order_id: Uuid,
) -> AppResult<bool> {
    let product_ids: Vec<Uuid> = OrderItems::find()
        .filter(OrderItemCol::OrderId.eq(order_id))
        .all(conn)
        .await?
        .into_iter()
        .map(|item| item.product_id)
        .collect();

    if product_ids.is_empty() {
        return Ok(false);
    }

    let products = Products::find()
        .filter(ProdCol::Id.is_in(product_ids))
        .all(conn)
        .await?;

    Ok(products.iter().any(|p| p.embroidery_file.is_some()))
}
