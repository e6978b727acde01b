use std::collections::HashMap;

use sea_orm::ActiveValue::{NotSet, Set};
use sea_orm::sea_query::{Expr, LockType};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, TransactionTrait,
};
use uuid::Uuid;

use crate::{
    audit::log_audit,
    dto::cart::{AddToCartRequest, CartDto, CartItemDto, CartLineChange, UpdateCartItemRequest},
    entity::{
        cart_items::{
            ActiveModel as CartItemActive, Column as CartItemCol, Entity as CartItems,
            Model as CartItemModel,
        },
        carts::{ActiveModel as CartActive, Column as CartCol, Entity as Carts, Model as CartModel},
        garments::{Column as GarmentCol, Entity as Garments},
        product_garments::{Column as ProductGarmentCol, Entity as ProductGarments},
        products::{Column as ProdCol, Entity as Products, Model as ProductModel},
    },
    error::{AppError, AppResult, field_error, form_error},
    middleware::auth::AuthUser,
    response::{ApiResponse, Meta},
    services::{catalog_service::garment_views, product_service::product_from_entity},
    state::AppState,
};

pub async fn get_cart(state: &AppState, user: &AuthUser) -> AppResult<ApiResponse<CartDto>> {
    let cart = get_or_create_cart(&state.orm, user.user_id).await?;

    let items = CartItems::find()
        .filter(CartItemCol::CartId.eq(cart.id))
        .order_by_desc(CartItemCol::CreatedAt)
        .all(&state.orm)
        .await?;

    let product_ids: Vec<Uuid> = items.iter().map(|i| i.product_id).collect();
    let garment_ids: Vec<Uuid> = items.iter().map(|i| i.garment_id).collect();

    let products: HashMap<Uuid, ProductModel> = if product_ids.is_empty() {
        HashMap::new()
    } else {
        Products::find()
            .filter(ProdCol::Id.is_in(product_ids))
            .all(&state.orm)
            .await?
            .into_iter()
            .map(|p| (p.id, p))
            .collect()
    };

    let garments = if garment_ids.is_empty() {
        Vec::new()
    } else {
        Garments::find()
            .filter(GarmentCol::Id.is_in(garment_ids))
            .all(&state.orm)
            .await?
    };
    let garments: HashMap<Uuid, crate::models::Garment> = garment_views(&state.orm, garments)
        .await?
        .into_iter()
        .map(|g| (g.id, g))
        .collect();

    let mut lines = Vec::with_capacity(items.len());
    for item in items {
        let product = products.get(&item.product_id).cloned().ok_or_else(|| {
            AppError::Internal(anyhow::anyhow!("cart item references missing product"))
        })?;
        let garment = garments.get(&item.garment_id).cloned().ok_or_else(|| {
            AppError::Internal(anyhow::anyhow!("cart item references missing garment"))
        })?;
        let total_price = (product.price + garment.price) * item.quantity as i64;
        lines.push(CartItemDto {
            id: item.id,
            product: product_from_entity(product),
            garment,
            quantity: item.quantity,
            total_price,
        });
    }

    let data = CartDto {
        id: cart.id,
        items: lines,
    };
    Ok(ApiResponse::success("Cart", data, Some(Meta::empty())))
}

pub async fn add_to_cart(
    state: &AppState,
    user: &AuthUser,
    payload: AddToCartRequest,
) -> AppResult<ApiResponse<CartLineChange>> {
    let product = Products::find_by_id(payload.product_id)
        .one(&state.orm)
        .await?
        .ok_or_else(|| AppError::Validation(field_error("product_id", "Product not found")))?;

    let garment = Garments::find_by_id(payload.garment_id)
        .one(&state.orm)
        .await?
        .ok_or_else(|| AppError::Validation(field_error("garment_id", "Garment not found")))?;

    let link = ProductGarments::find()
        .filter(ProductGarmentCol::ProductId.eq(product.id))
        .filter(ProductGarmentCol::GarmentId.eq(garment.id))
        .one(&state.orm)
        .await?;
    if link.is_none() {
        return Err(AppError::Validation(form_error(
            "This garment is not available for this product",
        )));
    }

    let txn = state.orm.begin().await?;
    let cart = get_or_create_cart(&txn, user.user_id).await?;

    let existing = CartItems::find()
        .filter(CartItemCol::CartId.eq(cart.id))
        .filter(CartItemCol::ProductId.eq(product.id))
        .filter(CartItemCol::GarmentId.eq(garment.id))
        .lock(LockType::Update)
        .one(&txn)
        .await?;

    let quantity = match existing {
        Some(item) => {
            let quantity = item.quantity + 1;
            CartItems::update_many()
                .col_expr(
                    CartItemCol::Quantity,
                    Expr::col(CartItemCol::Quantity).add(1),
                )
                .filter(CartItemCol::Id.eq(item.id))
                .exec(&txn)
                .await?;
            quantity
        }
        None => {
            CartItemActive {
                id: Set(Uuid::new_v4()),
                cart_id: Set(cart.id),
                product_id: Set(product.id),
                garment_id: Set(garment.id),
                quantity: Set(1),
                created_at: NotSet,
            }
            .insert(&txn)
            .await?;
            1
        }
    };
    txn.commit().await?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "cart_add",
        Some("cart_items"),
        Some(serde_json::json!({
            "product_id": product.id,
            "garment_id": garment.id,
            "quantity": quantity,
        })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    let data = CartLineChange {
        quantity,
        total_price: (product.price + garment.price) * quantity as i64,
    };
    Ok(ApiResponse::success("Added to cart", data, None))
}

pub async fn update_cart_item(
    state: &AppState,
    user: &AuthUser,
    item_id: Uuid,
    payload: UpdateCartItemRequest,
) -> AppResult<ApiResponse<CartLineChange>> {
    if payload.quantity < 1 {
        return Err(AppError::Validation(field_error(
            "quantity",
            "Quantity must be at least 1",
        )));
    }

    let item = find_owned_item(state, user, item_id).await?;

    let garment = Garments::find_by_id(item.garment_id)
        .one(&state.orm)
        .await?
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("cart item references missing garment")))?;

    // Stock is not reserved by the cart; this is only a courtesy check
    // against the current count. Checkout revalidates under a row lock.
    if garment.count < payload.quantity {
        return Err(AppError::Validation(form_error("Insufficient stock")));
    }

    let product = Products::find_by_id(item.product_id)
        .one(&state.orm)
        .await?
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("cart item references missing product")))?;

    let mut active: CartItemActive = item.into();
    active.quantity = Set(payload.quantity);
    let item = active.update(&state.orm).await?;

    let data = CartLineChange {
        quantity: item.quantity,
        total_price: (product.price + garment.price) * item.quantity as i64,
    };
    Ok(ApiResponse::success("Quantity updated", data, None))
}

pub async fn remove_cart_item(
    state: &AppState,
    user: &AuthUser,
    item_id: Uuid,
) -> AppResult<ApiResponse<serde_json::Value>> {
    let item = find_owned_item(state, user, item_id).await?;

    CartItems::delete_by_id(item.id).exec(&state.orm).await?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "cart_remove",
        Some("cart_items"),
        Some(serde_json::json!({ "cart_item_id": item_id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Removed from cart",
        serde_json::json!({}),
        Some(Meta::empty()),
    ))
}

async fn find_owned_item(
    state: &AppState,
    user: &AuthUser,
    item_id: Uuid,
) -> AppResult<CartItemModel> {
    let cart = Carts::find()
        .filter(CartCol::UserId.eq(user.user_id))
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    CartItems::find_by_id(item_id)
        .filter(CartItemCol::CartId.eq(cart.id))
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)
}

pub async fn get_or_create_cart<C: ConnectionTrait>(
    conn: &C,
    user_id: Uuid,
) -> AppResult<CartModel> {
    let existing = Carts::find()
        .filter(CartCol::UserId.eq(user_id))
        .one(conn)
        .await?;
    if let Some(cart) = existing {
        return Ok(cart);
    }

    let cart = CartActive {
        id: Set(Uuid::new_v4()),
        user_id: Set(user_id),
    }
    .insert(conn)
    .await?;
    Ok(cart)
}
