use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::{Category, Color, Garment, Product};

#[derive(Debug, Serialize, ToSchema)]
#[serde(transparent)]
pub struct CategoryList {
    #[schema(value_type = Vec<Category>)]
    pub items: Vec<Category>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(transparent)]
pub struct ColorList {
    #[schema(value_type = Vec<Color>)]
    pub items: Vec<Color>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(transparent)]
pub struct GarmentList {
    #[schema(value_type = Vec<Garment>)]
    pub items: Vec<Garment>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ProductList {
    pub items: Vec<Product>,
}

/// Product detail: the catalog card plus the garments it can be made on.
#[derive(Debug, Serialize, ToSchema)]
pub struct ProductDetail {
    pub product: Product,
    pub garments: Vec<Garment>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateProductRequest {
    pub name: String,
    pub price: i64,
    pub embroidery_file: Option<String>,
    pub garment_ids: Vec<Uuid>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateProductRequest {
    pub name: Option<String>,
    pub price: Option<i64>,
    pub embroidery_file: Option<String>,
    pub garment_ids: Option<Vec<Uuid>>,
}
