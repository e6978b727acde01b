use chrono::Utc;
use sea_orm::ActiveValue::Set;
use sea_orm::sea_query::LockType;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, TransactionTrait,
};
use uuid::Uuid;

use crate::{
    audit::{log_audit, log_status_change},
    dto::catalog::GarmentList,
    dto::orders::{OrderList, OrderWithItems},
    entity::{
        garments::{
            ActiveModel as GarmentActive, Column as GarmentCol, Entity as Garments,
        },
        order_items::{Column as OrderItemCol, Entity as OrderItems},
        orders::{ActiveModel as OrderActive, Column as OrderCol, Entity as Orders},
    },
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ensure_staff},
    models::{Garment, Order, OrderStatus},
    response::{ApiResponse, Meta},
    routes::params::{OrderListQuery, SortOrder},
    routes::staff::{AdjustStockRequest, LowStockQuery, UpdateOrderStatusRequest},
    services::{
        catalog_service::garment_views,
        order_service::{order_from_entity, order_item_from_entity},
    },
    state::AppState,
};

pub async fn list_all_orders(
    state: &AppState,
    user: &AuthUser,
    query: OrderListQuery,
) -> AppResult<ApiResponse<OrderList>> {
    ensure_staff(user)?;
    let (page, limit, offset) = query.pagination.normalize();

    let mut condition = Condition::all();
    if let Some(status) = query.status.as_ref().filter(|s| !s.is_empty()) {
        condition = condition.add(OrderCol::Status.eq(status.clone()));
    }

    let mut finder = Orders::find().filter(condition);

    let sort_order = query.sort_order.unwrap_or(SortOrder::Desc);
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
        "Orders",
        OrderList { items: orders },
        Some(meta),
    ))
}

pub async fn get_order(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<OrderWithItems>> {
    ensure_staff(user)?;
    let order = Orders::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    let items = OrderItems::find()
        .filter(OrderItemCol::OrderId.eq(order.id))
        .all(&state.orm)
        .await?
        .into_iter()
        .map(order_item_from_entity)
        .collect();

    Ok(ApiResponse::success(
        "Order found",
        OrderWithItems {
            order: order_from_entity(order),
            items,
        },
        Some(Meta::empty()),
    ))
}

/// Move an order along the fulfilment pipeline. Settlement transitions
/// (payment, cancellation) are owned by the webhook and cancel endpoints
/// and are rejected here.
pub async fn update_order_status(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: UpdateOrderStatusRequest,
) -> AppResult<ApiResponse<Order>> {
    ensure_staff(user)?;

    let target = OrderStatus::parse(&payload.status)
        .ok_or_else(|| AppError::BadRequest("Unknown order status".into()))?;

    let txn = state.orm.begin().await?;

    let order = Orders::find_by_id(id)
        .lock(LockType::Update)
        .one(&txn)
        .await?
        .ok_or(AppError::NotFound)?;

    let current = OrderStatus::parse(&order.status)
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("stored order status is invalid")))?;

    if !current.can_advance_to(target) {
        return Err(AppError::BadRequest(format!(
            "Cannot move order from {} to {}",
            current.as_str(),
            target.as_str()
        )));
    }

    let previous_status = order.status.clone();
    let mut active: OrderActive = order.into();
    active.status = Set(target.as_str().into());
    if payload.tracking_code.is_some() {
        active.tracking_code = Set(payload.tracking_code);
    }
    active.updated_at = Set(Utc::now().into());
    let order = active.update(&txn).await?;

    txn.commit().await?;

    log_status_change(
        &state.pool,
        Some(user.user_id),
        order.id,
        &previous_status,
        target.as_str(),
    )
    .await;

    Ok(ApiResponse::success(
        "Order updated",
        order_from_entity(order),
        Some(Meta::empty()),
    ))
}

pub async fn list_low_stock(
    state: &AppState,
    user: &AuthUser,
    query: LowStockQuery,
) -> AppResult<ApiResponse<GarmentList>> {
    ensure_staff(user)?;
    let threshold = query.threshold.unwrap_or(5);

    let garments = Garments::find()
        .filter(GarmentCol::Count.lte(threshold))
        .order_by_asc(GarmentCol::Count)
        .all(&state.orm)
        .await?;

    let items = garment_views(&state.orm, garments).await?;

    Ok(ApiResponse::success(
        "Low stock",
        GarmentList { items },
        Some(Meta::empty()),
    ))
}

/// Manual stock correction, same row lock as the order paths so it cannot
/// race a checkout into a negative count.
pub async fn adjust_stock(
    state: &AppState,
    user: &AuthUser,
    garment_id: Uuid,
    payload: AdjustStockRequest,
) -> AppResult<ApiResponse<Garment>> {
    ensure_staff(user)?;
    if payload.delta == 0 {
        return Err(AppError::BadRequest("delta must not be 0".into()));
    }

    let txn = state.orm.begin().await?;
    let garment = Garments::find_by_id(garment_id)
        .lock(LockType::Update)
        .one(&txn)
        .await?
        .ok_or(AppError::NotFound)?;

    let new_count = garment.count + payload.delta;
    if new_count < 0 {
        return Err(AppError::BadRequest("stock cannot be negative".into()));
    }

    let mut active: GarmentActive = garment.into();
    active.count = Set(new_count);
    let updated = active.update(&txn).await?;

    txn.commit().await?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "stock_adjust",
        Some("garments"),
        Some(serde_json::json!({ "garment_id": updated.id, "delta": payload.delta })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    let mut views = garment_views(&state.orm, vec![updated]).await?;
    let garment = views
        .pop()
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("garment view missing")))?;

    Ok(ApiResponse::success(
        "Stock updated",
        garment,
        Some(Meta::empty()),
    ))
}
