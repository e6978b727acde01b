use axum::{Json, Router, extract::State, routing::post};

use crate::{
    error::AppResult,
    payments::WebhookNotification,
    response::ApiResponse,
    services::webhook_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new().route("/webhook", post(payment_webhook))
}

// No auth: the provider calls this endpoint. Unknown payment ids 404 and
// malformed payloads are rejected, so a spoofed call cannot move an order
// it cannot name.
#[utoipa::path(
    post,
    path = "/api/payments/webhook",
    responses(
        (status = 200, description = "Webhook processed (or acknowledged as a duplicate)", body = ApiResponse<serde_json::Value>),
        (status = 400, description = "Malformed payload or unknown event type"),
        (status = 404, description = "No order for this payment id"),
    ),
    tag = "Payments"
)]
pub async fn payment_webhook(
    State(state): State<AppState>,
    Json(notification): Json<WebhookNotification>,
) -> AppResult<Json<ApiResponse<serde_json::Value>>> {
    let resp = webhook_service::handle_webhook(&state, notification).await?;
    Ok(Json(resp))
}
