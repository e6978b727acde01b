use std::collections::HashMap;

use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder};
use uuid::Uuid;

use crate::{
    dto::catalog::{CategoryList, ColorList, GarmentList},
    entity::{
        categories::{Column as CategoryCol, Entity as Categories, Model as CategoryModel},
        colors::{Column as ColorCol, Entity as Colors, Model as ColorModel},
        garments::{Column as GarmentCol, Entity as Garments, Model as GarmentModel},
    },
    error::{AppError, AppResult},
    models::{Category, Color, Garment},
    response::{ApiResponse, Meta},
    routes::params::GarmentQuery,
    state::AppState,
};

pub async fn list_categories(state: &AppState) -> AppResult<ApiResponse<CategoryList>> {
    let items = Categories::find()
        .order_by_asc(CategoryCol::Name)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(category_from_entity)
        .collect();

    Ok(ApiResponse::success(
        "Categories",
        CategoryList { items },
        Some(Meta::empty()),
    ))
}

pub async fn list_colors(state: &AppState) -> AppResult<ApiResponse<ColorList>> {
    let items = Colors::find()
        .order_by_asc(ColorCol::Name)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(color_from_entity)
        .collect();

    Ok(ApiResponse::success(
        "Colors",
        ColorList { items },
        Some(Meta::empty()),
    ))
}

pub async fn list_garments(
    state: &AppState,
    query: GarmentQuery,
) -> AppResult<ApiResponse<GarmentList>> {
    let mut finder = Garments::find();
    if let Some(category) = query.category {
        finder = finder.filter(GarmentCol::CategoryId.eq(category));
    }
    let garments = finder.all(&state.orm).await?;

    let items = garment_views(&state.orm, garments).await?;

    Ok(ApiResponse::success(
        "Garments",
        GarmentList { items },
        Some(Meta::empty()),
    ))
}

/// Compose garment view models. Categories and colors are small reference
/// tables, so they are fetched once per call rather than joined per row.
pub async fn garment_views<C: ConnectionTrait>(
    conn: &C,
    garments: Vec<GarmentModel>,
) -> AppResult<Vec<Garment>> {
    if garments.is_empty() {
        return Ok(Vec::new());
    }

    let categories: HashMap<Uuid, CategoryModel> = Categories::find()
        .all(conn)
        .await?
        .into_iter()
        .map(|c| (c.id, c))
        .collect();
    let colors: HashMap<Uuid, ColorModel> = Colors::find()
        .all(conn)
        .await?
        .into_iter()
        .map(|c| (c.id, c))
        .collect();

    garments
        .into_iter()
        .map(|garment| {
            let category = categories
                .get(&garment.category_id)
                .cloned()
                .ok_or_else(|| {
                    AppError::Internal(anyhow::anyhow!("garment references missing category"))
                })?;
            let color = colors.get(&garment.color_id).cloned().ok_or_else(|| {
                AppError::Internal(anyhow::anyhow!("garment references missing color"))
            })?;
            Ok(garment_from_parts(garment, category, color))
        })
        .collect()
}

pub fn garment_from_parts(
    garment: GarmentModel,
    category: CategoryModel,
    color: ColorModel,
) -> Garment {
    Garment {
        id: garment.id,
        category: category_from_entity(category),
        color: color_from_entity(color),
        size: garment.size,
        count: garment.count,
        price: garment.price,
    }
}

pub fn category_from_entity(model: CategoryModel) -> Category {
    Category {
        id: model.id,
        name: model.name,
    }
}

pub fn color_from_entity(model: ColorModel) -> Color {
    Color {
        id: model.id,
        name: model.name,
        color: model.color,
    }
}
