use atrio_core::models::AuditEntry;
use sqlx::{PgExecutor, PgPool};
use uuid::Uuid;

/// Append one audit entry. Generic over the executor so mutations can write
/// it inside their own transaction.
pub async fn record<'e, E: PgExecutor<'e>>(
    executor: E,
    actor: &str,
    action: &str,
    resource: &str,
    resource_id: &str,
    meta: serde_json::Value,
) -> Result<Uuid, sqlx::Error> {
    let row: (Uuid,) = sqlx::query_as(
        r#"
        INSERT INTO audit_log (actor, action, resource, resource_id, meta)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING id
        "#,
    )
    .bind(actor)
    .bind(action)
    .bind(resource)
    .bind(resource_id)
    .bind(meta)
    .fetch_one(executor)
    .await?;
    Ok(row.0)
}

/// Best-effort variant for trails that must not fail the main operation
/// (relay attempt logging). Failures are logged and swallowed.
pub async fn record_best_effort(
    pool: &PgPool,
    actor: &str,
    action: &str,
    resource: &str,
    resource_id: &str,
    meta: serde_json::Value,
) {
    if let Err(e) = record(pool, actor, action, resource, resource_id, meta).await {
        tracing::warn!(action, resource_id, error = %e, "Failed to write audit entry");
    }
}

pub async fn recent(pool: &PgPool, limit: i64) -> Result<Vec<AuditEntry>, sqlx::Error> {
    sqlx::query_as::<_, AuditEntry>(
        r#"
        SELECT id, actor, action, resource, resource_id, meta, created_at
        FROM audit_log
        ORDER BY created_at DESC, id DESC
        LIMIT $1
        "#,
    )
    .bind(limit)
    .fetch_all(pool)
    .await
}
