use axum::{
    Json, Router,
    extract::{Query, State},
    routing::get,
};

use crate::{
    dto::catalog::{CategoryList, ColorList, GarmentList},
    error::AppResult,
    response::ApiResponse,
    routes::params::GarmentQuery,
    services::catalog_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/categories", get(list_categories))
        .route("/colors", get(list_colors))
        .route("/garments", get(list_garments))
}

#[utoipa::path(
    get,
    path = "/api/catalog/categories",
    responses(
        (status = 200, description = "List categories", body = ApiResponse<CategoryList>)
    ),
    tag = "Catalog"
)]
pub async fn list_categories(
    State(state): State<AppState>,
) -> AppResult<Json<ApiResponse<CategoryList>>> {
    let resp = catalog_service::list_categories(&state).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/api/catalog/colors",
    responses(
        (status = 200, description = "List colors", body = ApiResponse<ColorList>)
    ),
    tag = "Catalog"
)]
pub async fn list_colors(State(state): State<AppState>) -> AppResult<Json<ApiResponse<ColorList>>> {
    let resp = catalog_service::list_colors(&state).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/api/catalog/garments",
    params(
        ("category" = Option<uuid::Uuid>, Query, description = "Filter by category id")
    ),
    responses(
        (status = 200, description = "List garments", body = ApiResponse<GarmentList>)
    ),
    tag = "Catalog"
)]
pub async fn list_garments(
    State(state): State<AppState>,
    Query(query): Query<GarmentQuery>,
) -> AppResult<Json<ApiResponse<GarmentList>>> {
    let resp = catalog_service::list_garments(&state, query).await?;
    Ok(Json(resp))
}
