use serde_json::Value;
use uuid::Uuid;

use crate::{db::DbPool, error::AppResult};

pub async fn log_audit(
    pool: &DbPool,
    user_id: Option<Uuid>,
    action: &str,
    resource: Option<&str>,
    metadata: Option<Value>,
) -> AppResult<()> {
    let id = Uuid::new_v4();
    sqlx::query(
        r#"
        INSERT INTO audit_logs (id, user_id, action, resource, metadata)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(id)
    .bind(user_id)
    .bind(action)
    .bind(resource)
    .bind(metadata)
    .execute(pool)
    .await?;

    Ok(())
}

/// Order status changes get their own action so staff history screens can
/// filter on it. Best-effort like the rest of the audit trail.
pub async fn log_status_change(
    pool: &DbPool,
    actor: Option<Uuid>,
    order_id: Uuid,
    from: &str,
    to: &str,
) {
    if let Err(err) = log_audit(
        pool,
        actor,
        "order_status_change",
        Some("orders"),
        Some(serde_json::json!({ "order_id": order_id, "from": from, "to": to })),
    )
    .await
    {
        tracing::warn!(error = %err, %order_id, "status change audit failed");
    }
}
