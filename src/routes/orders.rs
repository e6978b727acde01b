use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
};
use uuid::Uuid;

use crate::{
    dto::orders::{CheckoutAccepted, CreateOrderRequest, OrderList, OrderWithItems},
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    response::{ApiResponse, Meta},
    routes::params::OrderListQuery,
    services::order_service,
    state::AppState,
    tasks::TaskState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_orders).post(checkout))
        .route("/tasks/{task_id}", get(task_status))
        .route("/{id}", get(get_order).delete(cancel_order))
}

#[utoipa::path(
    get,
    path = "/api/orders",
    params(
        ("page" = Option<i64>, Query, description = "Page number, default 1"),
        ("per_page" = Option<i64>, Query, description = "Items per page, default 20"),
        ("status" = Option<String>, Query, description = "Filter by status"),
        ("sort_order" = Option<String>, Query, description = "Sort order: asc, desc")
    ),
    responses(
        (status = 200, description = "List current user's orders", body = ApiResponse<OrderList>)
    ),
    security(("bearer_auth" = [])),
    tag = "Orders"
)]
pub async fn list_orders(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<OrderListQuery>,
) -> AppResult<Json<ApiResponse<OrderList>>> {
    let resp = order_service::list_orders(&state, &user, query).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/orders",
    request_body = CreateOrderRequest,
    responses(
        (status = 201, description = "Checkout queued; poll the task id", body = ApiResponse<CheckoutAccepted>),
        (status = 429, description = "A checkout is already in flight for this user"),
    ),
    security(("bearer_auth" = [])),
    tag = "Orders"
)]
pub async fn checkout(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<CreateOrderRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<CheckoutAccepted>>)> {
    let resp = order_service::start_checkout(&state, &user, payload)?;
    Ok((StatusCode::CREATED, Json(resp)))
}

#[utoipa::path(
    get,
    path = "/api/orders/tasks/{task_id}",
    params(
        ("task_id" = Uuid, Path, description = "Checkout task ID")
    ),
    responses(
        (status = 200, description = "Task still running", body = ApiResponse<serde_json::Value>),
        (status = 201, description = "Order created", body = ApiResponse<serde_json::Value>),
        (status = 400, description = "Checkout rejected with field errors"),
        (status = 404, description = "Unknown task id"),
        (status = 406, description = "Task failed"),
    ),
    security(("bearer_auth" = [])),
    tag = "Orders"
)]
pub async fn task_status(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(task_id): Path<Uuid>,
) -> AppResult<(StatusCode, Json<ApiResponse<serde_json::Value>>)> {
    let task = state.tasks.get(task_id).ok_or(AppError::NotFound)?;

    match task {
        TaskState::Running => Ok((
            StatusCode::OK,
            Json(ApiResponse::success(
                "Task is still running",
                serde_json::json!({}),
                Some(Meta::empty()),
            )),
        )),
        TaskState::Rejected { errors } => Err(AppError::Validation(errors)),
        TaskState::Failed { .. } => Ok((
            StatusCode::NOT_ACCEPTABLE,
            Json(ApiResponse::success(
                "Checkout failed",
                serde_json::json!({}),
                Some(Meta::empty()),
            )),
        )),
        TaskState::Completed { order_id } => Ok((
            StatusCode::CREATED,
            Json(ApiResponse::success(
                "Order created",
                serde_json::json!({ "order_id": order_id }),
                Some(Meta::empty()),
            )),
        )),
    }
}

#[utoipa::path(
    get,
    path = "/api/orders/{id}",
    params(
        ("id" = Uuid, Path, description = "Order ID")
    ),
    responses(
        (status = 200, description = "Order with items", body = ApiResponse<OrderWithItems>),
        (status = 404, description = "Not Found"),
    ),
    security(("bearer_auth" = [])),
    tag = "Orders"
)]
pub async fn get_order(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<OrderWithItems>>> {
    let resp = order_service::get_order(&state, &user, id).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    delete,
    path = "/api/orders/{id}",
    params(
        ("id" = Uuid, Path, description = "Order ID")
    ),
    responses(
        (status = 200, description = "Order canceled, stock restored", body = ApiResponse<serde_json::Value>),
        (status = 400, description = "Order is not awaiting payment"),
        (status = 404, description = "Not Found"),
    ),
    security(("bearer_auth" = [])),
    tag = "Orders"
)]
pub async fn cancel_order(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<serde_json::Value>>> {
    let resp = order_service::cancel_order(&state, &user, id).await?;
    Ok(Json(resp))
}
