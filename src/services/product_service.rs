use chrono::Utc;
use sea_orm::ActiveValue::{NotSet, Set};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, TransactionTrait,
};
use uuid::Uuid;

use crate::{
    audit::log_audit,
    dto::catalog::{CreateProductRequest, ProductDetail, ProductList, UpdateProductRequest},
    entity::{
        garments::{Column as GarmentCol, Entity as Garments},
        product_garments::{
            ActiveModel as ProductGarmentActive, Column as ProductGarmentCol,
            Entity as ProductGarments,
        },
        products::{
            ActiveModel as ProductActive, Column as ProdCol, Entity as Products,
            Model as ProductModel,
        },
    },
    error::{AppError, AppResult, field_error},
    middleware::auth::{AuthUser, ensure_staff},
    models::Product,
    response::{ApiResponse, Meta},
    routes::params::{ProductQuery, SortOrder},
    services::catalog_service::garment_views,
    state::AppState,
};

pub async fn list_products(
    state: &AppState,
    query: ProductQuery,
) -> AppResult<ApiResponse<ProductList>> {
    let (page, limit, offset) = query.pagination.normalize();

    let mut condition = Condition::all();
    if let Some(q) = query.q.as_ref().filter(|q| !q.is_empty()) {
        condition = condition.add(ProdCol::Name.contains(q.clone()));
    }
    if let Some(min) = query.min_price {
        condition = condition.add(ProdCol::Price.gte(min));
    }
    if let Some(max) = query.max_price {
        condition = condition.add(ProdCol::Price.lte(max));
    }

    let mut finder = Products::find().filter(condition);
    finder = match query.sort_order.unwrap_or(SortOrder::Desc) {
        SortOrder::Asc => finder.order_by_asc(ProdCol::CreatedAt),
        SortOrder::Desc => finder.order_by_desc(ProdCol::CreatedAt),
    };

    let total = finder.clone().count(&state.orm).await? as i64;

    let items = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(product_from_entity)
        .collect();

    let meta = Meta::new(page, limit, total);
    Ok(ApiResponse::success(
        "Products",
        ProductList { items },
        Some(meta),
    ))
}

pub async fn get_product(state: &AppState, id: Uuid) -> AppResult<ApiResponse<ProductDetail>> {
    let product = Products::find_by_id(id).one(&state.orm).await?;
    let product = match product {
        Some(p) => p,
        None => return Err(AppError::NotFound),
    };

    let garment_ids: Vec<Uuid> = ProductGarments::find()
        .filter(ProductGarmentCol::ProductId.eq(product.id))
        .all(&state.orm)
        .await?
        .into_iter()
        .map(|link| link.garment_id)
        .collect();

    let garments = if garment_ids.is_empty() {
        Vec::new()
    } else {
        let models = Garments::find()
            .filter(GarmentCol::Id.is_in(garment_ids))
            .all(&state.orm)
            .await?;
        garment_views(&state.orm, models).await?
    };

    let data = ProductDetail {
        product: product_from_entity(product),
        garments,
    };
    Ok(ApiResponse::success("Product", data, Some(Meta::empty())))
}

pub async fn create_product(
    state: &AppState,
    user: &AuthUser,
    payload: CreateProductRequest,
) -> AppResult<ApiResponse<Product>> {
    ensure_staff(user)?;

    if payload.name.trim().is_empty() {
        return Err(AppError::Validation(field_error("name", "Name is required")));
    }
    if payload.price < 0 {
        return Err(AppError::Validation(field_error(
            "price",
            "Price cannot be negative",
        )));
    }

    let txn = state.orm.begin().await?;

    let exists = Products::find()
        .filter(ProdCol::Name.eq(payload.name.clone()))
        .one(&txn)
        .await?;
    if exists.is_some() {
        return Err(AppError::Validation(field_error(
            "name",
            "A product with this name already exists",
        )));
    }

    check_garments_exist(&txn, &payload.garment_ids).await?;

    let product = ProductActive {
        id: Set(Uuid::new_v4()),
        name: Set(payload.name),
        price: Set(payload.price),
        embroidery_file: Set(payload.embroidery_file),
        created_at: NotSet,
    }
    .insert(&txn)
    .await?;

    link_garments(&txn, product.id, &payload.garment_ids).await?;

    txn.commit().await?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "product_create",
        Some("products"),
        Some(serde_json::json!({ "product_id": product.id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Product created",
        product_from_entity(product),
        Some(Meta::empty()),
    ))
}

pub async fn update_product(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: UpdateProductRequest,
) -> AppResult<ApiResponse<Product>> {
    ensure_staff(user)?;

    let txn = state.orm.begin().await?;

    let existing = Products::find_by_id(id).one(&txn).await?;
    let existing = match existing {
        Some(p) => p,
        None => return Err(AppError::NotFound),
    };

    let mut active: ProductActive = existing.into();
    if let Some(name) = payload.name {
        active.name = Set(name);
    }
    if let Some(price) = payload.price {
        if price < 0 {
            return Err(AppError::Validation(field_error(
                "price",
                "Price cannot be negative",
            )));
        }
        active.price = Set(price);
    }
    if payload.embroidery_file.is_some() {
        active.embroidery_file = Set(payload.embroidery_file);
    }
    let product = active.update(&txn).await?;

    if let Some(garment_ids) = payload.garment_ids {
        check_garments_exist(&txn, &garment_ids).await?;
        ProductGarments::delete_many()
            .filter(ProductGarmentCol::ProductId.eq(product.id))
            .exec(&txn)
            .await?;
        link_garments(&txn, product.id, &garment_ids).await?;
    }

    txn.commit().await?;

    Ok(ApiResponse::success(
        "Product updated",
        product_from_entity(product),
        Some(Meta::empty()),
    ))
}

async fn check_garments_exist<C: sea_orm::ConnectionTrait>(
    conn: &C,
    garment_ids: &[Uuid],
) -> AppResult<()> {
    if garment_ids.is_empty() {
        return Ok(());
    }
    let found = Garments::find()
        .filter(GarmentCol::Id.is_in(garment_ids.to_vec()))
        .count(conn)
        .await?;
    if found as usize != garment_ids.len() {
        return Err(AppError::Validation(field_error(
            "garment_ids",
            "One or more garments do not exist",
        )));
    }
    Ok(())
}

async fn link_garments<C: sea_orm::ConnectionTrait>(
    conn: &C,
    product_id: Uuid,
    garment_ids: &[Uuid],
) -> AppResult<()> {
    for garment_id in garment_ids {
        ProductGarmentActive {
            product_id: Set(product_id),
            garment_id: Set(*garment_id),
        }
        .insert(conn)
        .await?;
    }
    Ok(())
}

pub fn product_from_entity(model: ProductModel) -> Product {
    Product {
        id: model.id,
        name: model.name,
        price: model.price,
        embroidery_file: model.embroidery_file,
        created_at: model.created_at.with_timezone(&Utc),
    }
}
