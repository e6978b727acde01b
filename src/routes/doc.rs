use utoipa::{
    Modify, OpenApi,
    openapi::{
        self,
        OpenApi as OpenApiSpec,
        security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    },
};
use utoipa_scalar::{Scalar, Servable};

use crate::{
    dto::{
        cart::{AddToCartRequest, CartDto, CartItemDto, CartLineChange, UpdateCartItemRequest},
        catalog::{
            CategoryList, ColorList, CreateProductRequest, GarmentList, ProductDetail,
            ProductList, UpdateProductRequest,
        },
        orders::{CheckoutAccepted, CreateOrderRequest, OrderList, OrderWithItems},
    },
    models::{Category, Color, Garment, Order, OrderItem, Product, User},
    response::{ApiResponse, Meta},
    routes::{auth, cart, catalog, health, orders, params, products, staff, webhook},
};

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health_check,
        auth::login,
        auth::register,
        catalog::list_categories,
        catalog::list_colors,
        catalog::list_garments,
        products::list_products,
        products::get_product,
        products::create_product,
        products::update_product,
        cart::get_cart,
        cart::add_to_cart,
        cart::update_cart_item,
        cart::remove_cart_item,
        orders::list_orders,
        orders::checkout,
        orders::task_status,
        orders::get_order,
        orders::cancel_order,
        webhook::payment_webhook,
        staff::list_all_orders,
        staff::get_order_staff,
        staff::update_order_status,
        staff::list_low_stock,
        staff::adjust_stock
    ),
    components(
        schemas(
            User,
            Category,
            Color,
            Garment,
            Product,
            Order,
            OrderItem,
            CategoryList,
            ColorList,
            GarmentList,
            ProductList,
            ProductDetail,
            CreateProductRequest,
            UpdateProductRequest,
            AddToCartRequest,
            UpdateCartItemRequest,
            CartDto,
            CartItemDto,
            CartLineChange,
            CreateOrderRequest,
            CheckoutAccepted,
            OrderList,
            OrderWithItems,
            staff::UpdateOrderStatusRequest,
            staff::LowStockQuery,
            staff::AdjustStockRequest,
            params::Pagination,
            params::ProductQuery,
            params::OrderListQuery,
            Meta,
            ApiResponse<Product>,
            ApiResponse<ProductList>,
            ApiResponse<OrderWithItems>,
            ApiResponse<OrderList>,
            ApiResponse<CartDto>
        )
    ),
    security(
        ("bearer_auth" = [])
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Health check endpoint"),
        (name = "Auth", description = "Authentication endpoints"),
        (name = "Catalog", description = "Categories, colors and garments"),
        (name = "Products", description = "Product endpoints"),
        (name = "Cart", description = "Cart endpoints"),
        (name = "Orders", description = "Checkout and order lifecycle"),
        (name = "Payments", description = "Payment provider callbacks"),
        (name = "Staff", description = "Staff endpoints"),
    )
)]
pub struct ApiDoc;

pub fn scalar_docs() -> Scalar<OpenApiSpec> {
    Scalar::with_url("/docs", ApiDoc::openapi())
}
