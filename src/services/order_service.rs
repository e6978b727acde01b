use std::collections::HashMap;

use chrono::Utc;
use sea_orm::ActiveValue::{NotSet, Set};
use sea_orm::sea_query::{Expr, LockType};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, TransactionTrait,
};
use uuid::Uuid;

use crate::{
    audit::{log_audit, log_status_change},
    dto::orders::{CheckoutAccepted, CreateOrderRequest, OrderList, OrderWithItems},
    entity::{
        cart_items::{Column as CartItemCol, Entity as CartItems},
        carts::{Column as CartCol, Entity as Carts},
        garments::{Column as GarmentCol, Entity as Garments, Model as GarmentModel},
        order_items::{
            ActiveModel as OrderItemActive, Column as OrderItemCol, Entity as OrderItems,
            Model as OrderItemModel,
        },
        orders::{
            ActiveModel as OrderActive, Column as OrderCol, Entity as Orders, Model as OrderModel,
        },
        products::{Column as ProdCol, Entity as Products, Model as ProductModel},
    },
    error::{AppError, AppResult, field_error, form_error},
    middleware::auth::AuthUser,
    models::{Order, OrderItem, OrderStatus, PaymentStatus},
    response::{ApiResponse, Meta},
    routes::params::{OrderListQuery, SortOrder},
    services::webhook_service::{self, PaymentEvent},
    state::AppState,
    tasks::TaskState,
};

pub async fn list_orders(
    state: &AppState,
    user: &AuthUser,
    query: OrderListQuery,
) -> AppResult<ApiResponse<OrderList>> {
    let (page, limit, offset) = query.pagination.normalize();
    let mut condition = Condition::all().add(OrderCol::UserId.eq(user.user_id));
    if let Some(status) = query.status.as_ref().filter(|s| !s.is_empty()) {
        condition = condition.add(OrderCol::Status.eq(status.clone()));
    }

    let sort_order = query.sort_order.unwrap_or(SortOrder::Desc);

    let mut finder = Orders::find().filter(condition);
    finder = match sort_order {
        SortOrder::Asc => finder.order_by_asc(OrderCol::CreatedAt),
        SortOrder::Desc => finder.order_by_desc(OrderCol::CreatedAt),
    };

    let total = finder.clone().count(&state.orm).await? as i64;

    let orders = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(order_from_entity)
        .collect();

    let meta = Meta::new(page, limit, total);
    Ok(ApiResponse::success(
        "Ok",
        OrderList { items: orders },
        Some(meta),
    ))
}

/// Kick off an asynchronous checkout. The per-user lock turns away a
/// double-submitted request before anything is queued; the guard rides
/// inside the spawned task and releases when it finishes, whatever the
/// outcome.
pub fn start_checkout(
    state: &AppState,
    user: &AuthUser,
    payload: CreateOrderRequest,
) -> AppResult<ApiResponse<CheckoutAccepted>> {
    let guard = state
        .checkout_locks
        .clone()
        .try_acquire(user.user_id)
        .ok_or_else(|| AppError::TooManyRequests("Checkout already in progress".into()))?;

    let task_id = state.tasks.start();
    let task_state = state.clone();
    let task_user = user.clone();

    tokio::spawn(async move {
        let _guard = guard;
        let outcome = create_order(&task_state, &task_user, payload).await;
        let final_state = match outcome {
            Ok(order_id) => TaskState::Completed { order_id },
            Err(AppError::Validation(errors)) => TaskState::Rejected { errors },
            Err(err) => {
                tracing::error!(error = %err, user_id = %task_user.user_id, "checkout task failed");
                TaskState::Failed {
                    message: err.to_string(),
                }
            }
        };
        task_state.tasks.finish(task_id, final_state);
    });

    Ok(ApiResponse::success(
        "Checkout queued",
        CheckoutAccepted { task_id },
        Some(Meta::empty()),
    ))
}

/// Build the order in one transaction: row-locked stock check, order and
/// item inserts with price snapshots, stock decrement, payment-intent
/// creation, cart consumption. Any failure before commit rolls the whole
/// thing back, so a provider outage never leaks a stock change.
pub async fn create_order(
    state: &AppState,
    user: &AuthUser,
    payload: CreateOrderRequest,
) -> AppResult<Uuid> {
    validate_checkout_fields(&payload)?;

    let txn = state.orm.begin().await?;

    let cart = Carts::find()
        .filter(CartCol::UserId.eq(user.user_id))
        .one(&txn)
        .await?
        .ok_or_else(|| AppError::Validation(form_error("Cart not found")))?;

    let items = CartItems::find()
        .filter(CartItemCol::CartId.eq(cart.id))
        .all(&txn)
        .await?;
    if items.is_empty() {
        return Err(AppError::Validation(form_error("Cart is empty")));
    }

    // The partial unique index is the backstop; checking here turns a
    // constraint violation into a proper validation error.
    let pending = Orders::find()
        .filter(OrderCol::UserId.eq(user.user_id))
        .filter(OrderCol::Status.eq(OrderStatus::WaitingPayment.as_str()))
        .lock(LockType::Update)
        .one(&txn)
        .await?;
    if pending.is_some() {
        return Err(AppError::Validation(form_error(
            "You already have an order awaiting payment",
        )));
    }

    let product_ids: Vec<Uuid> = items.iter().map(|i| i.product_id).collect();
    let garment_ids: Vec<Uuid> = items.iter().map(|i| i.garment_id).collect();

    let products: HashMap<Uuid, ProductModel> = Products::find()
        .filter(ProdCol::Id.is_in(product_ids))
        .all(&txn)
        .await?
        .into_iter()
        .map(|p| (p.id, p))
        .collect();

    let garments: HashMap<Uuid, GarmentModel> = Garments::find()
        .filter(GarmentCol::Id.is_in(garment_ids))
        .lock(LockType::Update)
        .all(&txn)
        .await?
        .into_iter()
        .map(|g| (g.id, g))
        .collect();

    for item in &items {
        let garment = garments.get(&item.garment_id).ok_or_else(|| {
            AppError::Internal(anyhow::anyhow!("cart item references missing garment"))
        })?;
        if garment.count < item.quantity {
            return Err(AppError::Validation(field_error(
                "count",
                "Insufficient stock",
            )));
        }
    }

    let order_id = Uuid::new_v4();
    let order = OrderActive {
        id: Set(order_id),
        user_id: Set(user.user_id),
        address: Set(payload.address),
        phone: Set(payload.phone),
        status: Set(OrderStatus::WaitingPayment.as_str().into()),
        payment_status: Set(PaymentStatus::Pending.as_str().into()),
        total_sum: Set(0),
        payment_id: Set(None),
        confirmation_url: Set(None),
        tracking_code: Set(None),
        created_at: NotSet,
        updated_at: NotSet,
    }
    .insert(&txn)
    .await?;

    let mut total_sum: i64 = 0;
    for item in &items {
        let product = products.get(&item.product_id).ok_or_else(|| {
            AppError::Internal(anyhow::anyhow!("cart item references missing product"))
        })?;
        let garment = &garments[&item.garment_id];
        let price = product.price + garment.price;
        total_sum += price * item.quantity as i64;

        OrderItemActive {
            id: Set(Uuid::new_v4()),
            order_id: Set(order.id),
            product_id: Set(item.product_id),
            garment_id: Set(item.garment_id),
            quantity: Set(item.quantity),
            price: Set(price),
        }
        .insert(&txn)
        .await?;

        Garments::update_many()
            .col_expr(
                GarmentCol::Count,
                Expr::col(GarmentCol::Count).sub(item.quantity),
            )
            .filter(GarmentCol::Id.eq(item.garment_id))
            .exec(&txn)
            .await?;
    }

    // Provider call happens inside the transaction window on purpose:
    // stock must not be committed without a payment to back it.
    let payment = state.payments.create_payment(order.id, total_sum).await?;
    let payment_status = PaymentStatus::parse(&payment.status).unwrap_or(PaymentStatus::Pending);

    let mut active: OrderActive = order.into();
    active.total_sum = Set(total_sum);
    active.payment_id = Set(Some(payment.id.clone()));
    active.confirmation_url = Set(payment.confirmation_url());
    active.payment_status = Set(payment_status.as_str().into());
    active.updated_at = Set(Utc::now().into());
    let order = active.update(&txn).await?;

    CartItems::delete_many()
        .filter(CartItemCol::CartId.eq(cart.id))
        .exec(&txn)
        .await?;

    txn.commit().await?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "order_create",
        Some("orders"),
        Some(serde_json::json!({ "order_id": order.id, "total_sum": total_sum })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(order.id)
}

pub async fn get_order(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<OrderWithItems>> {
    let order = find_user_order(state, user, id).await?;

    // A detail fetch doubles as a settlement probe while payment is open:
    // webhooks can be delayed or lost, the provider is the source of truth.
    // Best effort only; the stored state is served if the provider is down.
    let order = match refresh_payment_state(state, &order).await {
        Ok(Some(refreshed)) => refreshed,
        Ok(None) => order,
        Err(err) => {
            tracing::warn!(error = %err, order_id = %order.id, "payment status refresh failed");
            order
        }
    };

    let items = OrderItems::find()
        .filter(OrderItemCol::OrderId.eq(order.id))
        .all(&state.orm)
        .await?
        .into_iter()
        .map(order_item_from_entity)
        .collect();

    Ok(ApiResponse::success(
        "OK",
        OrderWithItems {
            order: order_from_entity(order),
            items,
        },
        Some(Meta::empty()),
    ))
}

/// Cancel a waiting-payment order: restock every item under a garment row
/// lock and flip both statuses. Orders never get deleted.
pub async fn cancel_order(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<serde_json::Value>> {
    let txn = state.orm.begin().await?;

    let order = Orders::find()
        .filter(
            Condition::all()
                .add(OrderCol::UserId.eq(user.user_id))
                .add(OrderCol::Id.eq(id)),
        )
        .lock(LockType::Update)
        .one(&txn)
        .await?
        .ok_or(AppError::NotFound)?;

    if order.status != OrderStatus::WaitingPayment.as_str() {
        return Err(AppError::BadRequest(
            "Order can only be canceled while awaiting payment".into(),
        ));
    }

    let items = OrderItems::find()
        .filter(OrderItemCol::OrderId.eq(order.id))
        .all(&txn)
        .await?;

    let garment_ids: Vec<Uuid> = items.iter().map(|i| i.garment_id).collect();
    if !garment_ids.is_empty() {
        Garments::find()
            .filter(GarmentCol::Id.is_in(garment_ids))
            .lock(LockType::Update)
            .all(&txn)
            .await?;
    }

    for item in &items {
        Garments::update_many()
            .col_expr(
                GarmentCol::Count,
                Expr::col(GarmentCol::Count).add(item.quantity),
            )
            .filter(GarmentCol::Id.eq(item.garment_id))
            .exec(&txn)
            .await?;
    }

    let previous_status = order.status.clone();
    let mut active: OrderActive = order.into();
    active.status = Set(OrderStatus::Canceled.as_str().into());
    active.payment_status = Set(PaymentStatus::Canceled.as_str().into());
    active.updated_at = Set(Utc::now().into());
    let order = active.update(&txn).await?;

    txn.commit().await?;

    log_status_change(
        &state.pool,
        Some(user.user_id),
        order.id,
        &previous_status,
        OrderStatus::Canceled.as_str(),
    )
    .await;

    Ok(ApiResponse::success(
        "Order canceled",
        serde_json::json!({}),
        Some(Meta::empty()),
    ))
}

fn validate_checkout_fields(payload: &CreateOrderRequest) -> AppResult<()> {
    let mut errors = crate::error::FieldErrors::new();
    if payload.address.trim().is_empty() {
        errors.insert("address".into(), "Address is required".into());
    }
    if !is_valid_phone(&payload.phone) {
        errors.insert("phone".into(), "Invalid phone number".into());
    }
    if errors.is_empty() {
        Ok(())
    } else {
        Err(AppError::Validation(errors))
    }
}

/// Russian mobile formats: `+7XXXXXXXXXX` or `8XXXXXXXXXX`, separators
/// allowed.
fn is_valid_phone(phone: &str) -> bool {
    let digits: String = phone.chars().filter(|c| c.is_ascii_digit()).collect();
    match digits.len() {
        11 => {
            (digits.starts_with('7') && phone.trim_start().starts_with("+7"))
                || digits.starts_with('8')
        }
        _ => false,
    }
}

async fn find_user_order(state: &AppState, user: &AuthUser, id: Uuid) -> AppResult<OrderModel> {
    Orders::find()
        .filter(
            Condition::all()
                .add(OrderCol::UserId.eq(user.user_id))
                .add(OrderCol::Id.eq(id)),
        )
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)
}

async fn refresh_payment_state(
    state: &AppState,
    order: &OrderModel,
) -> AppResult<Option<OrderModel>> {
    if order.status != OrderStatus::WaitingPayment.as_str() {
        return Ok(None);
    }
    let Some(payment_id) = order.payment_id.as_deref() else {
        return Ok(None);
    };

    let payment = state.payments.find_payment(payment_id).await?;
    let event = match PaymentStatus::parse(&payment.status) {
        Some(PaymentStatus::Succeeded) => PaymentEvent::Succeeded,
        Some(PaymentStatus::Canceled) => PaymentEvent::Canceled,
        _ => return Ok(None),
    };

    webhook_service::apply_payment_event(state, payment_id, event).await?;

    let refreshed = Orders::find_by_id(order.id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;
    Ok(Some(refreshed))
}

pub fn order_from_entity(model: OrderModel) -> Order {
    Order {
        id: model.id,
        user_id: model.user_id,
        address: model.address,
        phone: model.phone,
        status: model.status,
        payment_status: model.payment_status,
        total_sum: model.total_sum,
        confirmation_url: model.confirmation_url,
        tracking_code: model.tracking_code,
        created_at: model.created_at.with_timezone(&Utc),
        updated_at: model.updated_at.with_timezone(&Utc),
    }
}

pub fn order_item_from_entity(model: OrderItemModel) -> OrderItem {
    OrderItem {
        id: model.id,
        order_id: model.order_id,
        product_id: model.product_id,
        garment_id: model.garment_id,
        quantity: model.quantity,
        price: model.price,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_common_russian_phone_formats() {
        assert!(is_valid_phone("+7 912 345-67-89"));
        assert!(is_valid_phone("+79123456789"));
        assert!(is_valid_phone("89123456789"));
    }

    #[test]
    fn rejects_short_foreign_and_bare_numbers() {
        assert!(!is_valid_phone("12345"));
        assert!(!is_valid_phone("+1 202 555 0100"));
        // 7-prefixed but without the leading plus
        assert!(!is_valid_phone("79123456789"));
        assert!(!is_valid_phone(""));
    }
}
